//! Chaining to another INDI server.

use futures_util::SinkExt;
use indiwire_message::{DecoderConfig, GetProperties, IndiCodec, Message};
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tracing::{info, warn};

use crate::connection::{read_into_router, write_mailbox};
use crate::error::Result;
use crate::router::{DeviceFilter, Mailbox, PeerId, Router};

/// A driver endpoint standing in for every device of a remote server.
///
/// Client messages routed to it are forwarded upstream; whatever the remote
/// server sends back is dispatched to local clients. Dropping the proxy
/// closes the upstream connection and unregisters it.
pub struct UpstreamProxy {
    id: PeerId,
    addr: String,
    router: Router,
    reader: Option<JoinHandle<()>>,
    writer: JoinHandle<()>,
}

impl UpstreamProxy {
    pub async fn connect(router: &Router, addr: &str) -> Result<Self> {
        Self::connect_with_config(router, addr, DecoderConfig::default()).await
    }

    /// Connect, request every definition upstream and start relaying.
    pub async fn connect_with_config(
        router: &Router,
        addr: &str,
        decoder: DecoderConfig,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        let mut frames = FramedWrite::new(writer, IndiCodec::new());
        frames
            .send(Message::GetProperties(GetProperties::all()))
            .await?;
        let writer = frames.into_inner();

        let (id, mailbox) = router.register_driver(format!("upstream {addr}"), DeviceFilter::All);
        info!(peer = %id, upstream = addr, "upstream connected");

        let writer = tokio::spawn(forward_upstream(router.clone(), id, mailbox, writer));
        let reader = {
            let router = router.clone();
            let addr = addr.to_string();
            tokio::spawn(async move {
                match read_into_router(&router, id, reader, decoder, Message::from_device).await {
                    Ok(()) => info!(peer = %id, upstream = %addr, "upstream closed"),
                    Err(err) => warn!(peer = %id, upstream = %addr, error = %err, "upstream failed"),
                }
                router.unregister(id);
            })
        };

        Ok(Self {
            id,
            addr: addr.to_string(),
            router: router.clone(),
            reader: Some(reader),
            writer,
        })
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Wait until the upstream server closes the connection.
    pub async fn closed(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
    }
}

/// Relay routed client messages upstream. A failed write unregisters the
/// proxy.
async fn forward_upstream<W>(router: Router, id: PeerId, mailbox: Mailbox, writer: W)
where
    W: AsyncWrite + Unpin,
{
    if let Err(err) = write_mailbox(id, mailbox, writer).await {
        warn!(peer = %id, error = %err, "upstream write failed");
        router.unregister(id);
    }
}

impl Drop for UpstreamProxy {
    fn drop(&mut self) {
        if let Some(reader) = &self.reader {
            reader.abort();
        }
        self.writer.abort();
        self.router.unregister(self.id);
    }
}
