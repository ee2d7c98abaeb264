#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::config::Config;
use crate::counters::{CounterMode, CounterStore};
use crate::error::ServeError;
use crate::rate_limit::{RateLimiter, DEFAULT_WINDOW};
use crate::resource::ListingRenderer;

mod handler;
mod metrics;
mod request;
mod response;

pub use handler::ConnectionHandler;
pub use metrics::{ConnectionStats, StatsSnapshot};
pub use request::{read_request, RequestLine, MAX_REQUEST_BYTES};
pub use response::Response;

const LISTEN_BACKLOG: i32 = 128;

/// Shared state handed to every connection worker. The counter store and
/// the limiter are locked independently; cloning is cheap.
#[derive(Clone)]
pub struct ServerState {
    pub counters: Arc<CounterStore>,
    pub limiter: Arc<RateLimiter>,
    pub stats: Arc<ConnectionStats>,
}

impl ServerState {
    pub fn from_config(config: &Config) -> Self {
        let mode = if config.unsafe_counters {
            CounterMode::Naive
        } else {
            CounterMode::Locked
        };
        Self {
            counters: Arc::new(CounterStore::new(mode)),
            limiter: Arc::new(RateLimiter::new(config.max_rate, DEFAULT_WINDOW)),
            stats: Arc::new(ConnectionStats::default()),
        }
    }
}

/// Bind the listener and serve until the shutdown signal flips.
pub async fn run(
    config: Arc<Config>,
    state: ServerState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServeError> {
    let listener = bind_listener(config.listen).map_err(ServeError::Bind)?;
    info!(addr = ?config.listen, root = %config.root_dir.display(), "listener bound");

    let renderer = Arc::new(ListingRenderer::from_static_dir(&config.static_dir)?);
    let handler = ConnectionHandler::new(config, state, renderer);
    handler.run(listener, &mut shutdown).await;
    Ok(())
}

/// SO_REUSEADDR and a fixed backlog, then hand the socket to tokio.
fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    TcpListener::from_std(socket.into())
}
