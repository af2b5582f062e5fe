//! HTTP entry point. Loads configuration from the environment, wires up
//! the shared application state, and serves the routes in `pifs::api2`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::Server;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8008";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = pifs_config::Config::from_env()?;
    let bind_addr: SocketAddr = std::env::var("PIFS_BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
        .parse()?;

    let state = Arc::new(pifs::AppState::connect(config).await?);

    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(pifs::api2::route(state, req).await) }
            }))
        }
    });

    log::info!("pifs-server listening on {bind_addr}");
    Server::bind(&bind_addr).serve(make_svc).await?;
    Ok(())
}
