//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::routes::{self, FullBody};
use crate::services::Services;
use crate::types::RegistryError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub services: Services,
    /// Verifies bearer tokens into callers
    pub jwt: JwtValidator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, services: Services, jwt: JwtValidator) -> Self {
        Self {
            args,
            services,
            jwt,
            started_at: Instant::now(),
        }
    }
}

/// Run the HTTP server until ctrl-c
pub async fn run(state: Arc<AppState>) -> Result<(), RegistryError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Land registry listening on {} (backend: {})",
        state.args.listen,
        state.services.backend_name()
    );
    if state.args.dev_mode {
        warn!("Development mode enabled - tokens are signed with a public secret");
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handle_request(state, addr, req).await }
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            debug!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {:?}", e);
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                return Ok(());
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<FullBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    if method == Method::OPTIONS {
        return Ok(routes::preflight_response());
    }

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health" | "/healthz") => routes::health_check(state),
        (_, p) if under(p, "/parcels") => {
            routes::handle_parcels_request(state, req, &path).await
        }
        (_, p) if under(p, "/transfers") => {
            routes::handle_transfers_request(state, req, &path).await
        }
        _ => routes::route_not_found(&path),
    };

    debug!("[{}] {} {} -> {}", addr, method, path, response.status());
    Ok(response)
}

/// `/parcels` and `/parcels/...`, but not `/parcelsfoo`
fn under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .map(|rest| rest.is_empty() || rest.starts_with('/'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_matching() {
        assert!(under("/parcels", "/parcels"));
        assert!(under("/parcels/P1/verify", "/parcels"));
        assert!(!under("/parcelsx", "/parcels"));
        assert!(!under("/transfers", "/parcels"));
    }
}
