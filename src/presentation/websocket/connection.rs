//! Socket connection loops.
//!
//! Each connection runs a read loop in the upgrade task and a write loop in
//! a spawned task. They share only the outbound queue (owned by the hub) and
//! a close signal, and whichever exits first brings the other down.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, timeout_at, Instant, MissedTickBehavior};

use super::dispatch::{ConnectionContext, Dispatch, Dispatcher};
use super::hub::{ConnectionId, Frame, Hub};
use super::messages::ControlFrame;
use crate::config::WebSocketSettings;

/// Per-connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Outbound queue capacity, in frames
    pub send_buffer_size: usize,
    /// Largest inbound message accepted, in bytes
    pub max_message_size: usize,
    /// Silence allowed between pongs before the peer is presumed dead
    pub read_deadline: Duration,
    pub write_deadline: Duration,
    pub ping_interval: Duration,
}

impl From<&WebSocketSettings> for ConnectionConfig {
    fn from(settings: &WebSocketSettings) -> Self {
        Self {
            send_buffer_size: settings.send_buffer_size,
            max_message_size: settings.max_message_size,
            read_deadline: settings.read_deadline(),
            write_deadline: settings.write_deadline(),
            ping_interval: settings.ping_interval(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum WriteError {
    #[error("write deadline exceeded")]
    Deadline,
    #[error(transparent)]
    Socket(#[from] axum::Error),
}

/// Drive one upgraded socket until either side closes.
pub async fn run_connection(
    socket: WebSocket,
    hub: Arc<Hub>,
    dispatcher: Dispatcher,
    ctx: ConnectionContext,
    config: ConnectionConfig,
) {
    let id = ctx.connection_id;
    let outbound = hub.register(id, &ctx.user_id, &ctx.chat_id, config.send_buffer_size);
    let guard = hub.guard(id);

    match ControlFrame::established(&ctx.chat_id, &ctx.user_id).encode() {
        Ok(greeting) => {
            hub.send_to(id, Frame::from(greeting));
        }
        Err(e) => tracing::error!(connection_id = %id, error = %e, "Failed to encode greeting"),
    }

    let (sink, stream) = socket.split();
    let (writer_done, writer_closed) = oneshot::channel();
    let writer = tokio::spawn(write_loop(sink, outbound, config, id, writer_done));

    read_loop(stream, &hub, &dispatcher, &ctx, &config, writer_closed).await;

    // Unregistering drops the queue sender, which ends the write loop
    drop(guard);
    if let Err(e) = writer.await {
        tracing::error!(connection_id = %id, error = %e, "Write loop panicked");
    }

    tracing::info!(
        connection_id = %id,
        user_id = %ctx.user_id,
        chat_id = %ctx.chat_id,
        "Connection closed"
    );
}

/// Read frames in order and dispatch each before reading the next.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    hub: &Hub,
    dispatcher: &Dispatcher,
    ctx: &ConnectionContext,
    config: &ConnectionConfig,
    mut writer_closed: oneshot::Receiver<()>,
) {
    let id = ctx.connection_id;
    let mut deadline = Instant::now() + config.read_deadline;

    loop {
        let next = tokio::select! {
            _ = &mut writer_closed => {
                tracing::debug!(connection_id = %id, "Write loop exited, stopping reads");
                return;
            }
            next = timeout_at(deadline, stream.next()) => next,
        };

        let message = match next {
            Err(_) => {
                tracing::info!(connection_id = %id, "Read deadline expired");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                tracing::debug!(connection_id = %id, error = %e, "Read failed");
                return;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                handle_frame(hub, dispatcher, ctx, text.as_str().as_bytes()).await;
            }
            Message::Binary(bytes) => {
                handle_frame(hub, dispatcher, ctx, &bytes).await;
            }
            Message::Pong(_) => {
                deadline = Instant::now() + config.read_deadline;
            }
            // Pings are answered by the socket itself
            Message::Ping(_) => {}
            Message::Close(frame) => {
                tracing::debug!(connection_id = %id, close = ?frame, "Peer closed");
                return;
            }
        }
    }
}

async fn handle_frame(hub: &Hub, dispatcher: &Dispatcher, ctx: &ConnectionContext, raw: &[u8]) {
    match dispatcher.dispatch(raw, ctx).await {
        Dispatch::Broadcast(frame) => {
            hub.broadcast(&ctx.chat_id, Frame::from(frame));
        }
        Dispatch::Reply(frame) => {
            if !hub.send_to(ctx.connection_id, Frame::from(frame)) {
                tracing::debug!(connection_id = %ctx.connection_id, "Reply not queued");
            }
        }
    }
}

/// Drain the outbound queue and keep the peer alive with pings.
///
/// `_done` is dropped on exit, which wakes the read loop.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Frame>,
    config: ConnectionConfig,
    id: ConnectionId,
    _done: oneshot::Sender<()>,
) {
    let mut ping = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    // Unregistered: say goodbye and stop
                    let _ = timeout(config.write_deadline, sink.send(Message::Close(None))).await;
                    break;
                };
                match write_batch(&mut sink, &mut outbound, frame, &config).await {
                    Ok(count) => tracing::trace!(connection_id = %id, count, "Flushed frames"),
                    Err(e) => {
                        tracing::debug!(connection_id = %id, error = %e, "Write failed");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                let sent = timeout(config.write_deadline, sink.send(Message::Ping(Bytes::new()))).await;
                if !matches!(sent, Ok(Ok(()))) {
                    tracing::debug!(connection_id = %id, "Ping failed");
                    break;
                }
            }
        }
    }

    let _ = timeout(config.write_deadline, sink.close()).await;
}

/// Feed `first` plus everything already queued, then flush once.
async fn write_batch(
    sink: &mut SplitSink<WebSocket, Message>,
    outbound: &mut mpsc::Receiver<Frame>,
    first: Frame,
    config: &ConnectionConfig,
) -> Result<usize, WriteError> {
    let write = async {
        sink.feed(text_message(&first)).await?;
        let mut count = 1;
        while count < config.send_buffer_size {
            let Ok(frame) = outbound.try_recv() else {
                break;
            };
            sink.feed(text_message(&frame)).await?;
            count += 1;
        }
        sink.flush().await?;
        Ok::<_, WriteError>(count)
    };

    timeout(config.write_deadline, write)
        .await
        .map_err(|_| WriteError::Deadline)?
}

fn text_message(frame: &Frame) -> Message {
    Message::Text(frame.to_string().into())
}
