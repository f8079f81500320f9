//! Listener bootstrap: binds one `tiny_http::Server` and runs a small
//! fixed pool of OS threads pulling requests off it concurrently — the
//! ambient `std::thread` equivalent of the teacher's lack of an async
//! runtime (see SPEC_FULL.md §5).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, info};

use crate::handler::handle;
use crate::state::ProxyState;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("could not bind {0}: {1}")]
    Bind(String, String),
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub worker_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "localhost".to_string(),
            port: 8888,
            worker_threads: 8,
        }
    }
}

/// Bind and serve forever. Blocks the calling thread; spawns
/// `worker_threads - 1` additional threads pulling from the same
/// `tiny_http::Server`, which is safe to call `recv`/`incoming_requests`
/// from multiple threads concurrently.
pub fn run(config: ServerConfig, state: ProxyState) -> Result<(), ProxyError> {
    let address = format!("{}:{}", config.host, config.port);
    let server = Arc::new(
        tiny_http::Server::http(&address).map_err(|e| ProxyError::Bind(address.clone(), e.to_string()))?,
    );
    let state = Arc::new(state);

    info!(address, workers = config.worker_threads, "cleanflux proxy listening");

    let worker_count = config.worker_threads.max(1);
    let mut workers = Vec::with_capacity(worker_count - 1);
    for _ in 1..worker_count {
        let server = Arc::clone(&server);
        let state = Arc::clone(&state);
        workers.push(std::thread::spawn(move || worker_loop(server, state)));
    }
    worker_loop(server, state);

    for worker in workers {
        let _ = worker.join();
    }
    Ok(())
}

fn worker_loop(server: Arc<tiny_http::Server>, state: Arc<ProxyState>) {
    for request in server.incoming_requests() {
        let now_ns = now_nanos();
        handle(request, &state, now_ns);
    }
    error!("request stream ended, worker exiting");
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
