//! WebSocket transport to a running engine.
//!
//! Commands travel as [`ClientFrame::Invoke`] frames tagged with a request id;
//! the engine answers each with a reply or failure frame carrying the same id,
//! and interleaves push events that are handed to the [`EventBus`] in arrival
//! order.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::{
    error::EngineError,
    protocol::{ClientFrame, CommandReply, EngineCommand, EngineFrame},
};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{events::EventBus, gateway::CommandGateway};

type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<CommandReply, EngineError>>>>>;

/// Normalizes an engine address to a WebSocket URL.
pub fn engine_ws_url(engine_url: &str) -> Result<Url> {
    let ws_url = if engine_url.starts_with("https://") {
        engine_url.replacen("https://", "wss://", 1)
    } else if engine_url.starts_with("http://") {
        engine_url.replacen("http://", "ws://", 1)
    } else if engine_url.starts_with("ws://") || engine_url.starts_with("wss://") {
        engine_url.to_string()
    } else {
        return Err(anyhow!(
            "engine_url must start with ws://, wss://, http:// or https://"
        ));
    };
    Url::parse(&ws_url).with_context(|| format!("invalid engine url: {engine_url}"))
}

pub struct WsEngineConnection {
    next_id: AtomicU64,
    outbound: mpsc::UnboundedSender<ClientFrame>,
    pending: PendingReplies,
    closed: Arc<AtomicBool>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WsEngineConnection {
    /// Connects to the engine and starts routing its frames. Push events are
    /// dispatched to `bus`.
    pub async fn connect(engine_url: &str, bus: Arc<EventBus>) -> Result<Arc<Self>> {
        let url = engine_ws_url(engine_url)?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket: {url}"))?;
        info!(url = %url, "connected to engine");
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let writer_closed = Arc::clone(&closed);
        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(err) => {
                        error!(error = %err, "failed to encode client frame");
                        continue;
                    }
                };
                if let Err(err) = ws_writer.send(Message::Text(text)).await {
                    warn!(error = %err, "engine websocket write failed");
                    writer_closed.store(true, Ordering::SeqCst);
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        let reader_pending = Arc::clone(&pending);
        let reader_closed = Arc::clone(&closed);
        let reader = tokio::spawn(async move {
            while let Some(message) = ws_reader.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<EngineFrame>(&text) {
                        Ok(frame) => route_frame(frame, &reader_pending, &bus).await,
                        Err(err) => warn!(error = %err, "dropping undecodable engine frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "engine websocket read failed");
                        break;
                    }
                }
            }
            reader_closed.store(true, Ordering::SeqCst);
            fail_pending(&reader_pending, "engine connection closed").await;
            info!("engine connection closed");
        });

        Ok(Arc::new(Self {
            next_id: AtomicU64::new(1),
            outbound,
            pending,
            closed,
            tasks: std::sync::Mutex::new(vec![reader, writer]),
        }))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stops both socket tasks and fails every outstanding request.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for task in tasks {
            task.abort();
        }
        fail_pending(&self.pending, "engine connection closed").await;
    }
}

impl Drop for WsEngineConnection {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

async fn route_frame(frame: EngineFrame, pending: &PendingReplies, bus: &EventBus) {
    match frame {
        EngineFrame::Reply { id, reply } => resolve(pending, id, Ok(reply)).await,
        EngineFrame::Failure { id, error } => resolve(pending, id, Err(error.into())).await,
        EngineFrame::Event(event) => {
            let delivered = bus.dispatch(&event).await;
            debug!(event = %event.name(), delivered, "engine event dispatched");
        }
    }
}

async fn resolve(pending: &PendingReplies, id: u64, result: Result<CommandReply, EngineError>) {
    match pending.lock().await.remove(&id) {
        Some(sender) => {
            let _ = sender.send(result);
        }
        None => warn!(request = id, "reply for unknown request id"),
    }
}

async fn fail_pending(pending: &PendingReplies, reason: &str) {
    let waiting = std::mem::take(&mut *pending.lock().await);
    for (_, sender) in waiting {
        let _ = sender.send(Err(EngineError::Transport(reason.to_string())));
    }
}

#[async_trait]
impl CommandGateway for WsEngineConnection {
    async fn invoke(&self, command: EngineCommand) -> Result<CommandReply, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Transport("engine connection closed".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.outbound.send(ClientFrame::Invoke { id, command }).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(EngineError::Transport("engine connection closed".into()));
        }

        rx.await
            .map_err(|_| EngineError::Transport("engine connection dropped the request".into()))?
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
