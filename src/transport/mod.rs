//! TCP transport layer for GhostBus.
//!
//! Newline-delimited JSON. Each request line carries an `op` tag and gets one
//! response line. `{"op":"subscribe"}` switches the connection into streaming
//! mode: from then on every line is a classified event in the
//! `{"type":"bus.update","data":{...}}` shape.
//!
//! The socket writer for a subscriber is decoupled from `publish`: a bridge
//! thread per streaming connection drains the hub subscription into a small
//! tokio channel, and the connection task writes from that channel.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::error::{GhostError, HubError};
use crate::hub::{Subscription, SubscriptionId};
use crate::pipeline::{IngestPipeline, SnapshotReader};
use crate::vehicle::{ClassifiedEvent, PositionUpdate, VehiclePosition};

// ----------------------------------------------------------------------------
// Limits
// ----------------------------------------------------------------------------

/// Maximum size of one request line.
pub const MAX_REQUEST_LINE_BYTES: usize = 64 * 1024;

/// Events buffered between the hub bridge and the socket writer.
const BRIDGE_CAPACITY: usize = 64;

/// How often an idle bridge checks whether its connection is gone.
const BRIDGE_POLL: Duration = Duration::from_millis(250);

/// A request line.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Health,
    List,
    Get { id: String },
    Ingest { update: PositionUpdate },
    Subscribe,
}

/// Machine-readable error category.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    Validation,
    LineTooLong,
    Internal,
}

/// A response line.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Health {
        ok: bool,
        vehicles: usize,
        subscribers: usize,
    },
    List {
        buses: Vec<VehiclePosition>,
    },
    Bus {
        bus: VehiclePosition,
    },
    NotFound {
        id: String,
    },
    Ingested {
        event: ClassifiedEvent,
    },
    Subscribed {
        subscription_id: SubscriptionId,
    },
    Error {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
}

impl Response {
    fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
            field: None,
        }
    }
}

impl From<GhostError> for Response {
    fn from(err: GhostError) -> Self {
        match err {
            GhostError::Validation(v) => Self::Error {
                code: ErrorCode::Validation,
                field: Some(v.field().to_string()),
                message: v.to_string(),
            },
            other => Self::error(ErrorCode::Internal, other.to_string()),
        }
    }
}

/// Answers one non-streaming request.
#[must_use]
pub fn handle_request(pipeline: &IngestPipeline, request: Request) -> Response {
    match request {
        Request::Health => match pipeline.registry().len() {
            Ok(vehicles) => Response::Health {
                ok: true,
                vehicles,
                subscribers: pipeline.hub().subscriber_count(),
            },
            Err(err) => GhostError::from(err).into(),
        },
        Request::List => match pipeline.list_current() {
            Ok(buses) => Response::List { buses },
            Err(err) => err.into(),
        },
        Request::Get { id } => match pipeline.get_current(&id) {
            Ok(Some(bus)) => Response::Bus { bus },
            Ok(None) => Response::NotFound { id },
            Err(err) => err.into(),
        },
        Request::Ingest { update } => match pipeline.ingest(&update) {
            Ok(event) => Response::Ingested { event },
            Err(err) => err.into(),
        },
        Request::Subscribe => Response::error(ErrorCode::BadRequest, "subscribe must be handled by the connection"),
    }
}

async fn write_json_line<W, T>(writer: &mut W, value: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut bytes = serde_json::to_vec(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await
}

/// TCP server exposing a pipeline.
#[derive(Debug, Clone)]
pub struct TcpServer {
    pipeline: Arc<IngestPipeline>,
}

impl TcpServer {
    /// Creates a server over `pipeline`.
    #[must_use]
    pub fn new(pipeline: Arc<IngestPipeline>) -> Self {
        Self { pipeline }
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Only listener-level failures are returned; per-connection errors are
    /// logged and end that connection alone.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, "ghostbus transport listening");

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let pipeline = Arc::clone(&self.pipeline);
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(pipeline, stream, peer).await {
                                tracing::debug!(%peer, error = %err, "connection ended with error");
                            }
                        });
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "accept failed");
                    }
                },
            }
        }

        tracing::info!("ghostbus transport stopped");
        Ok(())
    }
}

async fn handle_connection(pipeline: Arc<IngestPipeline>, stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
    let (read_half, writer) = stream.into_split();
    serve_lines(pipeline, BufReader::new(read_half), writer, peer).await
}

/// Strips the line terminator and surrounding whitespace.
fn trim_line(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(line.len());
    let end = line.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &line[start..end]
}

/// Length of `line` without its `\n` or `\r\n` terminator.
fn content_len(line: &[u8]) -> usize {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line).len()
}

async fn serve_lines<R, W>(pipeline: Arc<IngestPipeline>, mut reader: R, mut writer: W, peer: SocketAddr) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line: Vec<u8> = Vec::new();
    tracing::debug!(%peer, "connection opened");

    loop {
        line.clear();
        // Room for the content plus a CRLF terminator.
        let limit = (MAX_REQUEST_LINE_BYTES + 2) as u64;
        let n = (&mut reader).take(limit).read_until(b'\n', &mut line).await?;
        if n == 0 {
            return Ok(());
        }
        if content_len(&line) > MAX_REQUEST_LINE_BYTES {
            let resp = Response::error(ErrorCode::LineTooLong, format!("request exceeds {MAX_REQUEST_LINE_BYTES} bytes"));
            write_json_line(&mut writer, &resp).await?;
            return Ok(());
        }

        let trimmed = trim_line(&line);
        if trimmed.is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_slice(trimmed) {
            Ok(req) => req,
            Err(err) => {
                let resp = Response::error(ErrorCode::BadRequest, format!("invalid request: {err}"));
                write_json_line(&mut writer, &resp).await?;
                continue;
            }
        };

        if request == Request::Subscribe {
            return stream_events(&pipeline, reader, writer, peer).await;
        }

        let resp = handle_request(&pipeline, request);
        write_json_line(&mut writer, &resp).await?;
    }
}

/// Moves hub events for one subscription onto the connection's channel.
///
/// Runs on its own thread for the life of the connection. Exits once the
/// subscription is removed from the hub or the channel is closed.
fn run_bridge(subscription: Subscription, tx: mpsc::Sender<ClassifiedEvent>) {
    loop {
        match subscription.recv_timeout(BRIDGE_POLL) {
            Ok(event) => {
                if tx.blocking_send(event).is_err() {
                    subscription.fail("transport closed");
                    break;
                }
            }
            Err(HubError::Timeout { .. }) => {
                if tx.is_closed() {
                    subscription.unsubscribe();
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

async fn stream_events<R, W>(pipeline: &IngestPipeline, mut reader: R, mut writer: W, peer: SocketAddr) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let subscription = pipeline.subscribe();
    let subscription_id = subscription.id();

    let (tx, mut rx) = mpsc::channel::<ClassifiedEvent>(BRIDGE_CAPACITY);
    thread::Builder::new()
        .name(format!("ghostbus-bridge-{peer}"))
        .spawn(move || run_bridge(subscription, tx))?;

    let result = match write_json_line(&mut writer, &Response::Subscribed { subscription_id }).await {
        Ok(()) => {
            tracing::debug!(%peer, subscription = %subscription_id, "streaming events");
            let mut scratch = [0u8; 1024];
            loop {
                tokio::select! {
                    next = rx.recv() => match next {
                        Some(event) => {
                            if let Err(err) = write_json_line(&mut writer, &event).await {
                                break Err(err);
                            }
                        }
                        None => break Ok(()),
                    },
                    read = reader.read(&mut scratch) => match read {
                        // Client hung up; anything else it sends is ignored.
                        Ok(0) => break Ok(()),
                        Ok(_) => {}
                        Err(err) => break Err(err),
                    },
                }
            }
        }
        Err(err) => Err(err),
    };

    // Release the hub slot now; the bridge thread sees the disconnect and exits.
    pipeline.hub().unsubscribe(subscription_id);
    tracing::debug!(%peer, subscription = %subscription_id, "stream closed");
    result
}
