use crate::gui_bridge::model::VisualizationModel;
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, PoisonError, RwLock,
    },
    thread,
};
use tokio::runtime::Builder;
use warp::{Filter, Rejection, Reply};

pub fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

type SharedModel = Arc<RwLock<VisualizationModel>>;

fn read_model(state: &SharedModel) -> VisualizationModel {
    state.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Read-only HTTP view of the running simulation plus a stop switch.
#[derive(Clone)]
pub struct GuiBridge {
    state: SharedModel,
    stop: Arc<AtomicBool>,
}

impl Default for GuiBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl GuiBridge {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(VisualizationModel::default())),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone + Send + Sync + 'static {
        let state = self.state.clone();
        let state_filter = warp::any().map(move || state.clone());
        let stop = self.stop.clone();

        let model_route = warp::path("model")
            .and(warp::get())
            .and(state_filter.clone())
            .map(|state: SharedModel| warp::reply::json(&read_model(&state)));

        let snapshot_route = warp::path("snapshot")
            .and(warp::get())
            .and(state_filter.clone())
            .map(|state: SharedModel| warp::reply::json(&read_model(&state).snapshot));

        let tracks_route = warp::path("tracks")
            .and(warp::get())
            .and(state_filter.clone())
            .map(|state: SharedModel| warp::reply::json(&read_model(&state).tracks));

        let metrics_route = warp::path("metrics")
            .and(warp::get())
            .and(state_filter)
            .map(|state: SharedModel| warp::reply::json(&read_model(&state).performance));

        let stop_route = warp::path("stop").and(warp::post()).map(move || {
            stop.store(true, Ordering::SeqCst);
            log::info!("stop requested over HTTP");
            warp::reply::json(&json!({ "status": "stopping" }))
        });

        model_route
            .or(snapshot_route)
            .or(tracks_route)
            .or(metrics_route)
            .or(stop_route)
    }

    /// Serves `routes()` from a background thread with its own runtime.
    pub fn serve(&self, addr: SocketAddr) -> thread::JoinHandle<()> {
        let routes = self.routes();
        thread::spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    log::error!("failed to build bridge runtime: {}", err);
                    return;
                }
            };
            log::info!("bridge listening on {}", addr);
            runtime.block_on(async move {
                warp::serve(routes).run(addr).await;
            });
        })
    }

    pub fn publish(&self, model: VisualizationModel) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        log::debug!(
            "[GUI] tick {} entities {} tracks {}",
            model.snapshot.tick,
            model.snapshot.targets.len() + model.snapshot.missiles.len(),
            model.tracks.len()
        );
        *guard = model;
    }

    pub fn publish_status(&self, message: &str) {
        log::info!("[GUI] {}", message);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn model(&self) -> VisualizationModel {
        read_model(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::ScenarioConfig;
    use crate::workflow::runner::Runner;
    use std::ops::ControlFlow;

    #[test]
    fn runner_publishes_every_tick() {
        let bridge = GuiBridge::new();
        let runner = Runner::new(ScenarioConfig::demo().with_overrides(Some(4), None, Some(2)));
        let report = runner
            .run_with(|_, snapshot, tracks| {
                bridge.publish(VisualizationModel::from_tick(snapshot, tracks));
                ControlFlow::Continue(())
            })
            .unwrap();
        let model = bridge.model();
        assert_eq!(model.snapshot.tick, report.ticks);
        assert_eq!(model.tracks.len(), report.tracks.len());
    }

    #[tokio::test]
    async fn routes_expose_model_and_stop() {
        let bridge = GuiBridge::new();
        let routes = bridge.routes();

        let response = warp::test::request()
            .method("GET")
            .path("/snapshot")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["tick"], 0);
        assert_eq!(body["status"], "idle");

        let response = warp::test::request()
            .method("GET")
            .path("/tracks")
            .reply(&routes)
            .await;
        assert_eq!(response.body().as_ref(), b"[]");

        assert!(!bridge.stop_requested());
        let response = warp::test::request()
            .method("POST")
            .path("/stop")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 200);
        assert!(bridge.stop_requested());

        let response = warp::test::request()
            .method("GET")
            .path("/unknown")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 404);
    }
}
