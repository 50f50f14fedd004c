use crate::generator::template::half_sine;
use anyhow::{bail, Context};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use trakcore::model::parameter::{HIT_THRESHOLD, INITIATION_THRESHOLD};
use trakcore::model::{Stage, StreamKind};

/// Configuration for a simulated motor board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub trials: usize,
    pub seed: u64,
    /// Quiet time before each pull.
    pub idle_seconds: f64,
    pub pull_seconds: f64,
    /// Uniform jitter added to every device sample.
    pub noise: f64,
    pub baseline: f64,
    /// Share of pulls whose peak clears the hit threshold.
    pub hit_fraction: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            trials: 10,
            seed: 0,
            idle_seconds: 3.0,
            pull_seconds: 0.6,
            noise: 1.0,
            baseline: 0.0,
            hit_fraction: 0.7,
        }
    }
}

impl GeneratorConfig {
    fn samples(&self, seconds: f64, rate: f64) -> usize {
        (seconds * rate).round().max(0.0) as usize
    }
}

/// Builds raw frames, one per time step, one value per stage stream.
///
/// Each pull is preceded by idle noise; trailing idle time lets the last
/// trial run to the end of its hit window.
pub fn build_frames(config: &GeneratorConfig, stage: &Stage) -> anyhow::Result<Vec<Vec<f64>>> {
    let threshold = stage
        .parameter_value(HIT_THRESHOLD)
        .context("generator needs the stage hit threshold")?;
    let initiation = stage
        .parameter(INITIATION_THRESHOLD)
        .map_or(0.0, |p| p.current);
    if threshold <= initiation || threshold <= 0.0 {
        bail!(
            "hit threshold {} must be positive and above initiation threshold {}",
            threshold,
            initiation
        );
    }
    if !(0.0..=1.0).contains(&config.hit_fraction) {
        bail!("hit fraction {} outside [0, 1]", config.hit_fraction);
    }

    let rate = stage.sampling_rate_hz;
    let idle = config.samples(config.idle_seconds, rate);
    let pull = config.samples(config.pull_seconds, rate).max(1);
    let tail = stage.expected_trial_samples();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut device = Vec::with_capacity(config.trials * (idle + pull) + tail);
    for _ in 0..config.trials {
        for _ in 0..idle {
            device.push(config.baseline + jitter(&mut rng, config.noise));
        }
        let peak = if rng.gen_bool(config.hit_fraction) {
            rng.gen_range(threshold * 1.1..threshold * 1.8)
        } else {
            let span = threshold - initiation;
            rng.gen_range(initiation + span * 0.3..initiation + span * 0.9)
        };
        for force in half_sine(pull, peak) {
            device.push(config.baseline + force + jitter(&mut rng, config.noise));
        }
    }
    for _ in 0..tail {
        device.push(config.baseline + jitter(&mut rng, config.noise));
    }

    let period_ms = stage.sample_period_ms();
    let frames: Vec<Vec<f64>> = device
        .into_iter()
        .enumerate()
        .map(|(step, value)| {
            stage
                .streams
                .iter()
                .map(|kind| match kind {
                    StreamKind::Timestamp => step as f64 * period_ms,
                    StreamKind::DeviceValue => value,
                    _ => 0.0,
                })
                .collect::<Vec<f64>>()
        })
        .collect();
    Ok(frames)
}

fn jitter(rng: &mut StdRng, noise: f64) -> f64 {
    if noise > 0.0 {
        rng.gen_range(-noise..noise)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::WorkflowConfig;

    #[test]
    fn generator_builds_expected_frame_count() {
        let cfg = WorkflowConfig::from_args(4, 3);
        let stage = cfg.to_stage().unwrap();
        let frames = build_frames(&cfg.generator, &stage).unwrap();
        assert_eq!(frames.len(), 4 * (300 + 60) + 301);
        assert!(frames.iter().all(|frame| frame.len() == 2));
        assert_eq!(frames[10][0], 100.0);
    }

    #[test]
    fn generator_is_reproducible_per_seed() {
        let cfg = WorkflowConfig::from_args(2, 42);
        let stage = cfg.to_stage().unwrap();
        let first = build_frames(&cfg.generator, &stage).unwrap();
        let second = build_frames(&cfg.generator, &stage).unwrap();
        assert_eq!(first, second);

        let other = WorkflowConfig::from_args(2, 43);
        assert_ne!(first, build_frames(&other.generator, &stage).unwrap());
    }

    #[test]
    fn idle_noise_stays_below_initiation() {
        let cfg = WorkflowConfig::from_args(1, 7);
        let stage = cfg.to_stage().unwrap();
        let frames = build_frames(&cfg.generator, &stage).unwrap();
        assert!(frames[..300].iter().all(|frame| frame[1].abs() <= 1.0));
    }

    #[test]
    fn generator_rejects_inverted_thresholds() {
        let cfg = WorkflowConfig {
            hit_threshold: 5.0,
            ..WorkflowConfig::default()
        };
        let stage = cfg.to_stage().unwrap();
        assert!(build_frames(&cfg.generator, &stage).is_err());
    }
}
