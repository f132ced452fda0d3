use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};

use indiwire_client::DEFAULT_PORT;
use indiwire_message::DecoderConfig;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::connection::serve_tcp_client;
use crate::error::{Result, RouterError};
use crate::router::Router;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Default: `0.0.0.0:7624`.
    pub listen: SocketAddr,
    pub decoder: DecoderConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            decoder: DecoderConfig::default(),
        }
    }
}

/// Accepts INDI clients over TCP and attaches each one to a router.
pub struct TcpServer {
    listener: TcpListener,
    router: Router,
    config: ServerConfig,
}

impl TcpServer {
    /// Bind the listening socket.
    pub async fn bind(router: Router, config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| RouterError::Bind {
                addr: config.listen,
                source,
            })?;
        Ok(Self {
            listener,
            router,
            config,
        })
    }

    /// Actual bound address, useful when binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves. Connections already
    /// being served keep running.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(addr = %self.local_addr()?, "listening for clients");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("listener shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let router = self.router.clone();
                            let decoder = self.config.decoder.clone();
                            tokio::spawn(async move {
                                let _ = serve_tcp_client(router, stream, decoder).await;
                            });
                        }
                        Err(err) => warn!(error = %err, "accept failed"),
                    }
                }
            }
        }
    }
}
