//! TCP connections to an INDI server.
//!
//! Each connection runs a reader task (bytes → [`IndiCodec`] →
//! [`Client::process_message`]) and a writer task draining the client's
//! outbound channel. With [`ClientConfig::blob_connection`] a second socket
//! carries BLOB payloads only.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use indiwire_message::sink::channel;
use indiwire_message::{DecoderConfig, IndiCodec, Message, MessageSink};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::Result;

/// Default INDI server port.
pub const DEFAULT_PORT: u16 = 7624;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Open a second connection that receives BLOBs only.
    pub blob_connection: bool,
    pub decoder: DecoderConfig,
}

/// A running client and the tasks serving its connections.
///
/// Dropping the connection stops the tasks.
pub struct Connection {
    client: Client,
    tasks: Vec<JoinHandle<()>>,
    closed: watch::Receiver<bool>,
}

/// Connect with default configuration and request every definition.
pub async fn connect(addr: &str) -> Result<Connection> {
    connect_with_config(addr, ClientConfig::default()).await
}

/// Connect with explicit configuration and request every definition.
pub async fn connect_with_config(addr: &str, config: ClientConfig) -> Result<Connection> {
    let control = TcpStream::connect(addr).await?;
    control.set_nodelay(true)?;
    let blob = if config.blob_connection {
        Some(TcpStream::connect(addr).await?)
    } else {
        None
    };
    info!(addr, blob_connection = blob.is_some(), "connected to server");

    let (closed_tx, closed) = watch::channel(false);
    let closed_tx = Arc::new(closed_tx);
    let mut tasks = Vec::new();

    let (control_read, control_write) = control.into_split();
    let (control_sink, writer) = spawn_writer(control_write);
    tasks.push(writer);

    let client = match blob {
        Some(blob) => {
            let (blob_read, blob_write) = blob.into_split();
            let (blob_sink, writer) = spawn_writer(blob_write);
            tasks.push(writer);
            let client = Client::with_blob_sink(control_sink, blob_sink);
            tasks.push(spawn_reader(
                blob_read,
                client.clone(),
                config.decoder.clone(),
                true,
                Arc::clone(&closed_tx),
            ));
            client
        }
        None => Client::new(control_sink),
    };
    tasks.push(spawn_reader(
        control_read,
        client.clone(),
        config.decoder,
        false,
        closed_tx,
    ));

    client.handshake(None, None);
    Ok(Connection {
        client,
        tasks,
        closed,
    })
}

impl Connection {
    /// Serve a client over an arbitrary byte stream pair. No handshake is
    /// sent; call [`Client::handshake`] when ready.
    pub fn from_io<R, W>(reader: R, writer: W, config: &ClientConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (closed_tx, closed) = watch::channel(false);
        let (sink, writer) = spawn_writer(writer);
        let client = Client::new(sink);
        let reader = spawn_reader(
            reader,
            client.clone(),
            config.decoder.clone(),
            false,
            Arc::new(closed_tx),
        );
        Self {
            client,
            tasks: vec![writer, reader],
            closed,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// True once the server side of any connection went away.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Wait until the server closes the connection.
    pub async fn closed(&mut self) {
        let _ = self.closed.wait_for(|closed| *closed).await;
    }

    /// Stop every connection task.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn spawn_writer<W>(writer: W) -> (MessageSink, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let task = tokio::spawn(async move {
        let mut frames = FramedWrite::new(writer, IndiCodec::new());
        while let Some(msg) = rx.recv().await {
            if let Err(err) = frames.send(msg).await {
                warn!(error = %err, "write to server failed");
                break;
            }
        }
        debug!("writer stopped");
    });
    (channel(tx), task)
}

fn spawn_reader<R>(
    reader: R,
    client: Client,
    decoder: DecoderConfig,
    blob_only: bool,
    closed: Arc<watch::Sender<bool>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut frames = FramedRead::new(reader, IndiCodec::with_config(decoder));
        while let Some(item) = frames.next().await {
            match item {
                Ok(msg) if blob_only && !msg.is_blob() => {
                    debug!(tag = msg.tag_name(), "non-BLOB message on BLOB connection skipped");
                }
                Ok(msg) => client.process_message(&msg),
                Err(err) => {
                    warn!(error = %err, "read from server failed");
                    break;
                }
            }
        }
        info!(blob_only, "server closed connection");
        closed.send_replace(true);
    })
}
