#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::RequestError;
use crate::rate_limit::Admission;
use crate::resource::{self, ListingRenderer, Resolved};
use crate::server::request::{read_request, RequestLine};
use crate::server::response::Response;
use crate::server::ServerState;

pub struct ConnectionHandler {
    config: Arc<Config>,
    state: ServerState,
    renderer: Arc<ListingRenderer>,
}

impl ConnectionHandler {
    pub fn new(config: Arc<Config>, state: ServerState, renderer: Arc<ListingRenderer>) -> Self {
        Self {
            config,
            state,
            renderer,
        }
    }

    pub async fn run(&self, listener: TcpListener, shutdown: &mut watch::Receiver<bool>) {
        loop {
            let accept_fut = listener.accept();
            let result = tokio::select! {
                res = accept_fut => res,
                res = shutdown.changed() => {
                    if res.is_ok() {
                        info!("shutdown signal received, stopping accept loop");
                        break;
                    } else {
                        // sender dropped; treat as no shutdown signal
                        continue;
                    }
                }
            };
            let (client, addr) = match result {
                Ok(pair) => pair,
                Err(e) => {
                    let snapshot = self.state.stats.snapshot();
                    warn!(error = %e, active = snapshot.active, total = snapshot.total, "failed to accept connection");
                    continue;
                }
            };
            self.state.stats.connection_opened();
            let snapshot = self.state.stats.snapshot();
            debug!(%addr, active = snapshot.active, total = snapshot.total, "accepted connection");

            let cfg = self.config.clone();
            let state = self.state.clone();
            let renderer = self.renderer.clone();
            tokio::spawn(handle_conn(cfg, state, renderer, client, addr));
        }
    }
}

async fn handle_conn(
    config: Arc<Config>,
    state: ServerState,
    renderer: Arc<ListingRenderer>,
    mut client: TcpStream,
    addr: SocketAddr,
) {
    if let Err(err) = serve_request(&config, &state, &renderer, &mut client, addr).await {
        match Response::for_error(&err) {
            Some(resp) => {
                if matches!(err, RequestError::RateLimited) {
                    state.stats.record_denied();
                } else if resp.status().is_server_error() {
                    state.stats.record_error();
                    warn!(%addr, error = %err, "request failed");
                } else {
                    debug!(%addr, error = %err, status = resp.status().as_u16(), "request rejected");
                }
                if let Err(e) = client.write_all(&resp.into_bytes()).await {
                    debug!(%addr, error = %e, "failed to write error response");
                }
            }
            None => {
                state.stats.record_error();
                debug!(%addr, error = %err, "connection ended before a response");
            }
        }
    }

    // Attempt graceful shutdown
    let _ = client.shutdown().await;
    state.stats.connection_closed();
    let snapshot = state.stats.snapshot();
    debug!(%addr, active = snapshot.active, total = snapshot.total, "connection closed");
}

/// One request per connection: read, admit, count, resolve, respond.
async fn serve_request(
    config: &Config,
    state: &ServerState,
    renderer: &ListingRenderer,
    client: &mut TcpStream,
    addr: SocketAddr,
) -> Result<(), RequestError> {
    let read_timeout = Duration::from_millis(config.read_timeout_ms);
    let Some(raw) = read_request(client, read_timeout).await? else {
        debug!(%addr, "no request before idle timeout, closing");
        return Ok(());
    };

    let line = RequestLine::parse(&raw)?;

    match state.limiter.admit(addr.ip()) {
        Admission::Allowed { remaining } => {
            debug!(client = %addr.ip(), remaining, "rate limit check passed");
        }
        Admission::Limited { retry_after } => {
            info!(
                client = %addr.ip(),
                rate = state.limiter.max_rate(),
                retry_after_ms = retry_after.as_millis() as u64,
                path = %line.path,
                "rate limit exceeded, denying request"
            );
            return Err(RequestError::RateLimited);
        }
    }

    if config.simulate_work {
        sleep(Duration::from_millis(config.simulate_delay_ms)).await;
    }

    let (path, is_download) = resource::split_query(&line.path);
    let key = resource::normalize_key(path);
    state.counters.increment(key).await;

    info!(client = %addr, method = %line.method, path, "request");

    let resolved = resource::resolve(
        path,
        is_download,
        &config.root_dir,
        &config.static_dir,
        &state.counters,
    )
    .await?;

    let response = match resolved {
        Resolved::Directory(entries) => Response::html(StatusCode::OK, renderer.render(&entries)?),
        Resolved::Page { content_type, body } => Response::new(StatusCode::OK, content_type, body),
        Resolved::Download { filename, body } => Response::attachment(filename, body),
    };
    client
        .write_all(&response.into_bytes())
        .await
        .map_err(RequestError::Transport)?;
    Ok(())
}
