use crate::gui_bridge::model::VisualizationModel;
use crate::workflow::runner::Runner;
use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{mpsc, Arc, PoisonError, RwLock},
    thread,
};
use tokio::runtime::Builder;
use trakcore::model::Session;
use warp::{http::StatusCode, Filter};

/// Bridge that serves the latest review model and re-scores on request.
pub struct GuiBridge {
    state: Arc<RwLock<VisualizationModel>>,
    session: Arc<RwLock<Session>>,
    runner: Arc<Runner>,
}

impl GuiBridge {
    pub fn new(runner: Arc<Runner>, session: Session) -> Self {
        Self {
            state: Arc::new(RwLock::new(VisualizationModel::default())),
            session: Arc::new(RwLock::new(session)),
            runner,
        }
    }

    /// `GET /session` and `POST /rescore`.
    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let state = self.state.clone();
        let state_filter = warp::any().map(move || state.clone());
        let session = self.session.clone();
        let session_filter = warp::any().map(move || session.clone());
        let runner = self.runner.clone();
        let runner_filter = warp::any().map(move || runner.clone());

        let get_route = warp::path("session")
            .and(warp::path::end())
            .and(warp::get())
            .and(state_filter.clone())
            .map(|state: Arc<RwLock<VisualizationModel>>| {
                let guard = state.read().unwrap_or_else(PoisonError::into_inner);
                warp::reply::json(&*guard)
            });

        let rescore_route = warp::path("rescore")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::json())
            .and(state_filter)
            .and(session_filter)
            .and(runner_filter)
            .map(
                |overrides: BTreeMap<String, f64>,
                 state: Arc<RwLock<VisualizationModel>>,
                 session: Arc<RwLock<Session>>,
                 runner: Arc<Runner>| {
                    let mut session = session.write().unwrap_or_else(PoisonError::into_inner);
                    match runner.review(&mut session, &overrides) {
                        Ok(result) => {
                            let model = VisualizationModel::from_review(&session, &result);
                            *state.write().unwrap_or_else(PoisonError::into_inner) = model;
                            warp::reply::with_status(
                                warp::reply::json(&json!({
                                    "status": "ok",
                                    "hits": result.summary.hits,
                                    "misses": result.summary.misses,
                                })),
                                StatusCode::OK,
                            )
                        }
                        Err(err) => {
                            log::warn!("rescore rejected: {:#}", err);
                            warp::reply::with_status(
                                warp::reply::json(&json!({
                                    "status": "error",
                                    "message": format!("{:#}", err),
                                })),
                                StatusCode::BAD_REQUEST,
                            )
                        }
                    }
                },
            );

        get_route.or(rescore_route)
    }

    /// Serves the routes on a background thread; returns the bound address.
    pub fn spawn(&self, bind: SocketAddr) -> Result<SocketAddr> {
        let routes = self.routes();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    let _ = tx.send(Err(err.to_string()));
                    return;
                }
            };
            runtime.block_on(async move {
                match warp::serve(routes).try_bind_ephemeral(bind) {
                    Ok((addr, server)) => {
                        let _ = tx.send(Ok(addr));
                        server.await;
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err.to_string()));
                    }
                }
            });
        });

        rx.recv()
            .context("review bridge thread exited before binding")?
            .map_err(|err| anyhow!("binding review bridge on {}: {}", bind, err))
    }

    pub fn publish(&self, model: VisualizationModel) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        log::info!(
            "[bridge] {} trials published for {}",
            model.outcomes.len(),
            model.subject
        );
        *guard = model;
    }

    pub fn publish_status(&self, message: &str) {
        log::info!("[bridge] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> VisualizationModel {
        self.state.read().unwrap().clone()
    }
}
