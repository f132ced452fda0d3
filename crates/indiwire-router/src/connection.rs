//! Per-connection workers: a reader feeding the router and a writer
//! draining the endpoint's mailbox.

use futures_util::{SinkExt, StreamExt};
use indiwire_message::{DecoderConfig, IndiCodec, Message};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::router::{Mailbox, PeerId, Router};

/// Serve one client connection until it closes.
///
/// The client is registered for the lifetime of the call and unregistered
/// however it ends.
pub async fn serve_client<R, W>(
    router: Router,
    name: &str,
    reader: R,
    writer: W,
    decoder: DecoderConfig,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (id, mailbox) = router.register_client(name);
    let writer = tokio::spawn(write_mailbox(id, mailbox, writer));

    let result = read_into_router(&router, id, reader, decoder, Message::from_client).await;

    router.unregister(id);
    writer.abort();
    result
}

/// Serve an accepted TCP client.
pub async fn serve_tcp_client(router: Router, stream: TcpStream, decoder: DecoderConfig) -> Result<()> {
    let name = match stream.peer_addr() {
        Ok(addr) => addr.to_string(),
        Err(_) => "unknown".to_string(),
    };
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    info!(client = %name, "client connected");
    let result = serve_client(router, &name, reader, writer, decoder).await;
    match &result {
        Ok(()) => info!(client = %name, "client disconnected"),
        Err(err) => warn!(client = %name, error = %err, "client connection failed"),
    }
    result
}

/// Encode every message from `mailbox` onto `writer` until the mailbox
/// closes or a write fails.
pub(crate) async fn write_mailbox<W>(id: PeerId, mut mailbox: Mailbox, writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frames = FramedWrite::new(writer, IndiCodec::new());
    while let Some(msg) = mailbox.recv().await {
        if let Err(err) = frames.send(msg).await {
            warn!(peer = %id, error = %err, "write failed");
            return Err(err.into());
        }
    }
    debug!(peer = %id, "mailbox closed");
    Ok(())
}

/// Decode messages from `reader` and dispatch those `admit` accepts on
/// behalf of `id`. Returns at end of stream.
pub(crate) async fn read_into_router<R>(
    router: &Router,
    id: PeerId,
    reader: R,
    decoder: DecoderConfig,
    admit: fn(&Message) -> bool,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, IndiCodec::with_config(decoder));
    while let Some(item) = frames.next().await {
        let msg = item?;
        if !admit(&msg) {
            warn!(peer = %id, tag = msg.tag_name(), "message in wrong direction dropped");
            continue;
        }
        debug!(peer = %id, tag = msg.tag_name(), device = ?msg.device(), vector = ?msg.name(), "inbound");
        router.dispatch(msg, id);
    }
    Ok(())
}
