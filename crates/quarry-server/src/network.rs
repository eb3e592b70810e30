use anyhow::Result;
use quarry_protocol_core::{ByteSink, Protocol, Recognizer, StatusSource, VersionRegistry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

/// Commands from protocol code to the connection's writer task.
enum SinkCommand {
    Data(Vec<u8>),
    Close,
}

/// Channel-backed byte sink handed to the recognizer (and, through it, to
/// whichever decoder gets selected). Sends never block; the writer task
/// drains the queue onto the socket.
struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkCommand>,
}

impl ByteSink for ChannelSink {
    fn send_raw(&self, data: &[u8]) -> Result<()> {
        self.tx
            .send(SinkCommand::Data(data.to_vec()))
            .map_err(|_| anyhow::anyhow!("connection writer is gone"))
    }

    fn close(&self) {
        let _ = self.tx.send(SinkCommand::Close);
    }
}

/// Handle one client connection: pump socket bytes into the recognizer,
/// drain queued protocol output back onto the socket. All per-connection
/// protocol state lives in the recognizer; this function is just plumbing.
pub async fn handle_connection(
    stream: TcpStream,
    registry: Arc<VersionRegistry>,
    status: Arc<dyn StatusSource>,
    online: Arc<AtomicUsize>,
) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());
    let (mut read_half, mut write_half) = stream.into_split();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = Arc::new(ChannelSink { tx });
    let mut recognizer = Recognizer::new(sink, registry, status);

    // Writer task: serialize queued bytes, shut the socket down on Close.
    let writer_peer = peer.clone();
    let writer = tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                SinkCommand::Data(bytes) => {
                    if let Err(e) = write_half.write_all(&bytes).await {
                        debug!("Writer error for {}: {}", writer_peer, e);
                        break;
                    }
                }
                SinkCommand::Close => {
                    let _ = write_half.shutdown().await;
                    break;
                }
            }
        }
    });

    let mut counted = false;
    let mut tmp = [0u8; 4096];
    loop {
        match read_half.read(&mut tmp).await {
            Ok(0) => {
                debug!("Connection {} closed by peer", peer);
                break;
            }
            Ok(n) => {
                if let Err(e) = recognizer.data_received(&tmp[..n]) {
                    debug!("Connection {} ended: {}", peer, e);
                    break;
                }
                if !counted && recognizer.is_bound() {
                    online.fetch_add(1, Ordering::Relaxed);
                    counted = true;
                }
                if recognizer.is_closed() {
                    // Ping answered or client kicked; the writer flushes
                    // the queued reply before shutting the socket down.
                    break;
                }
            }
            Err(e) => {
                debug!("Read error for {}: {}", peer, e);
                break;
            }
        }
    }

    if counted {
        online.fetch_sub(1, Ordering::Relaxed);
    }
    // Dropping the recognizer drops the sink handles; the writer task sees
    // the channel close and exits once everything queued is on the wire.
    drop(recognizer);
    let _ = writer.await;
}
