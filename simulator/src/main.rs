use anyhow::Context;
use clap::Parser;
use generator::profile::build_frames;
use gui_bridge::bridge::GuiBridge;
use gui_bridge::model::VisualizationModel;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use trakcore::model::Session;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Simulated motor-board session driver and reviewer")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Re-score a recorded session (JSON) instead of simulating one
    #[arg(long)]
    session: Option<PathBuf>,
    #[arg(long, default_value_t = 10)]
    trials: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value = "SIM-01")]
    subject: String,
    /// Keep the review bridge alive for plotting clients
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long, default_value = "127.0.0.1:9000")]
    bind: SocketAddr,
    /// Append end-of-trial messages to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

fn load_session(path: &Path) -> anyhow::Result<Session> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading session {}", path.display()))?;
    let session: Session = serde_json::from_str(&contents)
        .with_context(|| format!("parsing session {}", path.display()))?;
    session
        .validate()
        .with_context(|| format!("validating session {}", path.display()))?;
    Ok(session)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.trials, args.seed)
    };
    let runner = Runner::new(workflow_config.clone());

    let (session, result) = if let Some(path) = &args.session {
        let mut session = load_session(path)?;
        let result = runner.review(&mut session, &workflow_config.overrides)?;
        (session, result)
    } else {
        let stage = workflow_config.to_stage()?;
        let frames = build_frames(&workflow_config.generator, &stage)?;
        let session = Session::new(args.subject.as_str(), 0.0, stage)
            .context("creating simulated session")?;
        runner.run_live(session, &frames)?
    };

    for message in &result.messages {
        println!("{}", message);
    }
    println!(
        "Session {} -> trials {}, hits {}, misses {}, unscorable {}",
        session.subject(),
        result.summary.total,
        result.summary.hits,
        result.summary.misses,
        result.summary.unscorable
    );

    if let Some(report_path) = &args.report {
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(report_path)
            .with_context(|| format!("opening report {}", report_path.display()))?;
        for message in result.messages.iter().chain(&result.summary.messages) {
            writeln!(file, "{}", message)?;
        }
    }

    if args.serve {
        let model = VisualizationModel::from_review(&session, &result);
        let gui_bridge = GuiBridge::new(Arc::new(runner), session);
        gui_bridge.publish(model);
        let addr = gui_bridge.spawn(args.bind)?;
        gui_bridge.publish_status(&format!(
            "review bridge on http://{} (Ctrl+C to stop)...",
            addr
        ));
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for signal handling")?;
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}
