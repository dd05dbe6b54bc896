use crate::bridge::model::BridgeModel;
use anyhow::{anyhow, Result};
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
    thread,
};
use tokio::runtime::Builder;
use warp::Filter;

/// Serves the most recent workflow results as JSON on `GET /products`.
pub struct ProductBridge {
    state: Arc<RwLock<BridgeModel>>,
}

impl ProductBridge {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(BridgeModel::default())),
        }
    }

    /// Starts the HTTP endpoint on a background thread.
    pub fn start(&self, addr: SocketAddr) -> Result<()> {
        let state = self.state.clone();
        let state_filter = warp::any().map(move || state.clone());
        let route = warp::path("products")
            .and(warp::get())
            .and(state_filter)
            .map(|state: Arc<RwLock<BridgeModel>>| match state.read() {
                Ok(model) => warp::reply::json(&*model),
                Err(_) => warp::reply::json(&serde_json::json!({"status": "unavailable"})),
            });

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| anyhow!("building bridge runtime: {}", err))?;
        thread::spawn(move || {
            runtime.block_on(async move {
                warp::serve(route).run(addr).await;
            });
        });
        log::info!("product bridge listening on http://{}/products", addr);
        Ok(())
    }

    pub fn publish(&self, model: &BridgeModel) -> Result<()> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| anyhow!("bridge state lock poisoned"))?;
        *guard = model.clone();
        println!(
            "[BRIDGE] tasks: {}, calibrations: {}, measurements: {}",
            guard.tasks.len(),
            guard.calibrations.len(),
            guard.measurements.len()
        );
        Ok(())
    }

    pub fn publish_status(&self, message: &str) {
        println!("[BRIDGE] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> BridgeModel {
        self.state.read().unwrap().clone()
    }
}

impl Default for ProductBridge {
    fn default() -> Self {
        Self::new()
    }
}
