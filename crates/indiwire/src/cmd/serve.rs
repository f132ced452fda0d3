use indiwire_router::{Router, ServerConfig, TcpServer, UpstreamProxy};
use tracing::info;

use crate::cmd::ServeArgs;
use crate::exit::{router_error, CliResult, SUCCESS};

pub async fn run(args: ServeArgs) -> CliResult<i32> {
    let router = Router::new();
    let config = ServerConfig {
        listen: args.listen,
        ..ServerConfig::default()
    };
    let server = TcpServer::bind(router.clone(), config)
        .await
        .map_err(|err| router_error("bind failed", err))?;

    // Kept alive for the lifetime of the server.
    let mut proxies = Vec::with_capacity(args.upstream.len());
    for addr in &args.upstream {
        let proxy = UpstreamProxy::connect(&router, addr)
            .await
            .map_err(|err| router_error(&format!("upstream {addr} failed"), err))?;
        proxies.push(proxy);
    }

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|err| router_error("server failed", err))?;

    info!(clients = router.client_count(), upstreams = proxies.len(), "stopped");
    Ok(SUCCESS)
}
