//! Transport-neutral view of one WebSocket leg.
//!
//! A [`Leg`] is the read half of a socket exposed as a stream of
//! [`InboundFrame`]s, plus a [`LegSender`] feeding a dedicated writer task.
//! Sessions only ever see this shape, so the same translation code drives the
//! inbound axum socket, the outbound tungstenite socket, and in-memory
//! channels in tests.

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, trace, warn};

use crate::errors::BridgeError;

/// Outbound queue depth per leg. Sized for audio bursts.
pub const LEG_CHANNEL_CAPACITY: usize = 1024;

/// A frame read from a leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// JSON text frame
    Text(String),
    /// Binary frame (length only; neither protocol uses binary frames)
    Binary(usize),
    /// Ping/pong or raw frames handled by the transport itself
    Control,
    /// Peer sent a close frame
    Close,
}

/// A frame queued for a leg's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// Stream of frames read from a leg.
pub type InboundStream = BoxStream<'static, Result<InboundFrame, BridgeError>>;

/// Cloneable, non-blocking handle for writing to a leg.
///
/// Sends never wait on the peer: a full queue drops the frame. Closing is
/// idempotent and every send after the first close is a no-op.
#[derive(Debug, Clone)]
pub struct LegSender {
    leg: &'static str,
    tx: mpsc::Sender<OutboundFrame>,
    closed: Arc<AtomicBool>,
}

impl LegSender {
    pub fn new(leg: &'static str, tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            leg,
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    /// Serialize `message` and queue it. Returns whether it was queued.
    pub fn send_json<T: Serialize>(&self, message: &T) -> bool {
        if self.is_closed() {
            trace!(leg = self.leg, "Leg closed, dropping outbound frame");
            return false;
        }

        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                error!(leg = self.leg, "Failed to serialize outbound frame: {}", e);
                return false;
            }
        };

        match self.tx.try_send(OutboundFrame::Text(json)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(leg = self.leg, "Outbound queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(leg = self.leg, "Writer gone, dropping frame");
                false
            }
        }
    }

    /// Close the leg. Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        // If the queue is full the writer still closes once every sender is dropped.
        let _ = self.tx.try_send(OutboundFrame::Close);
        true
    }
}

/// One side of a bridge session.
pub struct Leg {
    pub inbound: InboundStream,
    pub outbound: LegSender,
}

impl Leg {
    /// Assemble a leg from an existing frame stream and writer queue.
    pub fn from_parts(
        leg: &'static str,
        inbound: InboundStream,
        tx: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        Self {
            inbound,
            outbound: LegSender::new(leg, tx),
        }
    }

    /// Wrap an accepted axum WebSocket.
    pub fn from_axum(leg: &'static str, socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        let (tx, rx) = mpsc::channel(LEG_CHANNEL_CAPACITY);

        tokio::spawn(write_frames(leg, sink, rx, |json| {
            AxumMessage::Text(json.into())
        }));

        let inbound = stream
            .map(move |msg| match msg {
                Ok(AxumMessage::Text(text)) => Ok(InboundFrame::Text(text.as_str().to_owned())),
                Ok(AxumMessage::Binary(data)) => Ok(InboundFrame::Binary(data.len())),
                Ok(AxumMessage::Ping(_)) | Ok(AxumMessage::Pong(_)) => Ok(InboundFrame::Control),
                Ok(AxumMessage::Close(_)) => Ok(InboundFrame::Close),
                Err(e) => Err(BridgeError::transport(leg, e)),
            })
            .boxed();

        Self::from_parts(leg, inbound, tx)
    }

    /// Wrap a client WebSocket dialled with tokio-tungstenite.
    pub fn from_tungstenite<S>(leg: &'static str, socket: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = socket.split();
        let (tx, rx) = mpsc::channel(LEG_CHANNEL_CAPACITY);

        tokio::spawn(write_frames(leg, sink, rx, |json| {
            WsMessage::Text(json.into())
        }));

        Self::from_parts(leg, tungstenite_frames(leg, stream), tx)
    }
}

fn tungstenite_frames<St>(leg: &'static str, stream: St) -> InboundStream
where
    St: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Send + 'static,
{
    stream
        .map(move |msg| match msg {
            Ok(WsMessage::Text(text)) => Ok(InboundFrame::Text(text.as_str().to_owned())),
            Ok(WsMessage::Binary(data)) => Ok(InboundFrame::Binary(data.len())),
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {
                Ok(InboundFrame::Control)
            }
            Ok(WsMessage::Close(_)) => Ok(InboundFrame::Close),
            Err(e) => Err(BridgeError::transport(leg, e)),
        })
        .boxed()
}

/// Writer task: drains the queue into the socket until a close is requested,
/// every sender is dropped, or the socket fails.
async fn write_frames<S, M, E>(
    leg: &'static str,
    mut sink: S,
    mut rx: mpsc::Receiver<OutboundFrame>,
    text: fn(String) -> M,
) where
    S: Sink<M, Error = E> + Unpin,
    E: Display,
{
    while let Some(frame) = rx.recv().await {
        match frame {
            OutboundFrame::Text(json) => {
                if let Err(e) = sink.send(text(json)).await {
                    warn!(leg, "Failed to write WebSocket frame: {}", e);
                    return;
                }
            }
            OutboundFrame::Close => break,
        }
    }

    if let Err(e) = sink.close().await {
        debug!(leg, "WebSocket close handshake failed: {}", e);
    }
    debug!(leg, "Writer task finished");
}
