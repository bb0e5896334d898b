//! Per-process inbox listener and outbox routing.
//!
//! Each process owns exactly one [`IpcManager`]. Reception creates its own
//! inbox up front and one channel per kitchen; kitchens open their inbox and
//! the reception inbox when they connect. A single listener task drains the
//! inbox, decodes envelopes, and dispatches to the handler registered for
//! each message kind. Handler faults are logged and never stop the listener.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::codec::{CodecError, Message, MessageError, MessageKind};
use crate::transport::{MessageQueue, QueueError, MAX_MESSAGES, MAX_MESSAGE_SIZE};
use crate::MAX_PIZZAS_PER_KITCHEN_MULTIPLIER;

/// Name of the reception process inbox.
pub const RECEPTION_INBOX: &str = "reception_inbox";

/// Sender id used by reception; kitchen ids start at 1.
pub const RECEPTION_ID: u32 = 0;

/// How long the listener sleeps when its inbox is empty. Bounds worst-case
/// shutdown latency.
const LISTEN_IDLE: Duration = Duration::from_millis(100);

/// Inbox name for a kitchen.
#[must_use]
pub fn kitchen_inbox_name(kitchen_id: u32) -> String {
    format!("kitchen_{kitchen_id}_inbox")
}

/// Which side of the reception/kitchen split a manager serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The single parent process distributing orders.
    Reception,
    /// A kitchen child process.
    Kitchen,
}

/// IPC routing failures.
#[derive(Debug, Error)]
pub enum IpcError {
    /// A kitchen called a reception-only operation.
    #[error("only reception can manage kitchen channels")]
    NotReception,

    /// Reception called a kitchen-only operation.
    #[error("reception does not connect to itself")]
    NotKitchen,

    /// A kitchen tried to send before connecting.
    #[error("not connected to reception")]
    NotConnected,

    /// No channel exists for the addressed kitchen.
    #[error("no channel for kitchen {0}")]
    UnknownKitchen(u32),

    /// The manager has no inbox to listen on yet.
    #[error("no inbox to listen on")]
    NoInbox,

    /// Transport failure.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Envelope failure.
    #[error(transparent)]
    Message(#[from] MessageError),

    /// Payload failure inside a handler.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A registered message handler. Runs on the listener task; errors are
/// logged and dropped.
pub type Handler = Box<dyn Fn(&Message) -> Result<(), IpcError> + Send + Sync>;

/// Inbox listener plus outbox routing for one process.
pub struct IpcManager {
    id: u32,
    role: Role,
    cooks_count: u32,
    connected: AtomicBool,
    listening: Arc<AtomicBool>,
    inbox: Mutex<Option<Arc<MessageQueue>>>,
    kitchen_queues: Mutex<HashMap<u32, MessageQueue>>,
    reception_outbox: Mutex<Option<MessageQueue>>,
    handlers: Arc<Mutex<HashMap<MessageKind, Handler>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl IpcManager {
    /// Build a manager for the given role.
    ///
    /// The reception manager creates its inbox immediately; a kitchen manager
    /// opens nothing until [`IpcManager::connect_to_reception`].
    ///
    /// # Errors
    ///
    /// Fails when the reception inbox cannot be created.
    pub fn new(id: u32, role: Role, cooks_count: u32) -> Result<Self, IpcError> {
        let inbox = match role {
            Role::Reception => Some(Arc::new(MessageQueue::create(
                RECEPTION_INBOX,
                inbox_capacity(cooks_count),
                MAX_MESSAGE_SIZE,
            )?)),
            Role::Kitchen => None,
        };

        Ok(Self {
            id,
            role,
            cooks_count,
            connected: AtomicBool::new(false),
            listening: Arc::new(AtomicBool::new(false)),
            inbox: Mutex::new(inbox),
            kitchen_queues: Mutex::new(HashMap::new()),
            reception_outbox: Mutex::new(None),
            handlers: Arc::new(Mutex::new(HashMap::new())),
            listener: Mutex::new(None),
        })
    }

    /// This process's id on the wire.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Create the inbox channel for a new kitchen. Reception only.
    ///
    /// # Errors
    ///
    /// Fails for non-reception callers or when the queue cannot be created.
    pub fn create_kitchen_channel(&self, kitchen_id: u32) -> Result<(), IpcError> {
        self.require_reception()?;
        let queue = MessageQueue::create(
            &kitchen_inbox_name(kitchen_id),
            inbox_capacity(self.cooks_count),
            MAX_MESSAGE_SIZE,
        )?;
        self.kitchen_queues.lock().unwrap().insert(kitchen_id, queue);
        Ok(())
    }

    /// Drop a kitchen's channel, unlinking its queue name. Reception only.
    ///
    /// # Errors
    ///
    /// Fails for non-reception callers.
    pub fn remove_kitchen_channel(&self, kitchen_id: u32) -> Result<(), IpcError> {
        self.require_reception()?;
        self.kitchen_queues.lock().unwrap().remove(&kitchen_id);
        Ok(())
    }

    /// Send a message to one kitchen. Reception only.
    ///
    /// # Errors
    ///
    /// Fails for non-reception callers, unknown kitchens, or transport
    /// errors (a full queue included).
    pub fn send_to_kitchen(&self, kitchen_id: u32, message: &Message) -> Result<(), IpcError> {
        self.require_reception()?;
        let queues = self.kitchen_queues.lock().unwrap();
        let queue = queues
            .get(&kitchen_id)
            .ok_or(IpcError::UnknownKitchen(kitchen_id))?;
        queue.send(message.serialize().as_bytes(), 0)?;
        Ok(())
    }

    /// Send a message to every kitchen, logging per-kitchen failures.
    /// Reception only.
    ///
    /// # Errors
    ///
    /// Fails for non-reception callers; individual send failures only log.
    pub fn broadcast_to_kitchens(&self, message: &Message) -> Result<(), IpcError> {
        self.require_reception()?;
        let payload = message.serialize();
        for (kitchen_id, queue) in self.kitchen_queues.lock().unwrap().iter() {
            if let Err(e) = queue.send(payload.as_bytes(), 0) {
                error!("failed to send message to kitchen {kitchen_id}: {e}");
            }
        }
        Ok(())
    }

    /// Open this kitchen's inbox and the reception inbox. Kitchen only.
    ///
    /// Reception must already have created both queues.
    ///
    /// # Errors
    ///
    /// Fails for reception callers or when either queue cannot be opened.
    pub fn connect_to_reception(&self) -> Result<(), IpcError> {
        if self.role != Role::Kitchen {
            return Err(IpcError::NotKitchen);
        }

        let inbox = MessageQueue::open(&kitchen_inbox_name(self.id))?;
        let outbox = MessageQueue::open(RECEPTION_INBOX)?;

        *self.inbox.lock().unwrap() = Some(Arc::new(inbox));
        *self.reception_outbox.lock().unwrap() = Some(outbox);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Send a message to reception. Kitchen only; requires a prior connect.
    ///
    /// # Errors
    ///
    /// Fails for reception callers, before connecting, or on transport
    /// errors.
    pub fn send_to_reception(&self, message: &Message) -> Result<(), IpcError> {
        if self.role != Role::Kitchen {
            return Err(IpcError::NotKitchen);
        }
        if !self.connected.load(Ordering::Acquire) {
            return Err(IpcError::NotConnected);
        }
        let outbox = self.reception_outbox.lock().unwrap();
        let outbox = outbox.as_ref().ok_or(IpcError::NotConnected)?;
        outbox.send(message.serialize().as_bytes(), 0)?;
        Ok(())
    }

    /// Whether this kitchen manager has connected to reception.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Register the handler for one message kind, replacing any previous one.
    pub fn set_handler(&self, kind: MessageKind, handler: Handler) {
        self.handlers.lock().unwrap().insert(kind, handler);
    }

    /// Spawn the listener task. A second call while listening is a no-op.
    ///
    /// # Errors
    ///
    /// Fails when there is no inbox yet (a kitchen that has not connected).
    pub fn start_listening(&self) -> Result<(), IpcError> {
        if self.listening.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let inbox = match self.inbox.lock().unwrap().as_ref() {
            Some(inbox) => Arc::clone(inbox),
            None => {
                self.listening.store(false, Ordering::Release);
                return Err(IpcError::NoInbox);
            }
        };
        let handlers = Arc::clone(&self.handlers);
        let listening = Arc::clone(&self.listening);
        let handle = tokio::spawn(listen_loop(inbox, handlers, listening));
        *self.listener.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Stop the listener and wait for it to exit. Idempotent.
    pub async fn stop_listening(&self) {
        self.listening.store(false, Ordering::Release);
        let handle = self.listener.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Whether the listener task is running.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    fn require_reception(&self) -> Result<(), IpcError> {
        if self.role == Role::Reception {
            Ok(())
        } else {
            Err(IpcError::NotReception)
        }
    }
}

impl Drop for IpcManager {
    fn drop(&mut self) {
        // The listener task holds its own Arc to the inbox and exits within
        // one idle interval once the flag clears, releasing the queue handle.
        self.listening.store(false, Ordering::Release);
    }
}

fn inbox_capacity(cooks_count: u32) -> usize {
    ((cooks_count * MAX_PIZZAS_PER_KITCHEN_MULTIPLIER) as usize).clamp(1, MAX_MESSAGES)
}

async fn listen_loop(
    inbox: Arc<MessageQueue>,
    handlers: Arc<Mutex<HashMap<MessageKind, Handler>>>,
    listening: Arc<AtomicBool>,
) {
    while listening.load(Ordering::Acquire) {
        match inbox.receive() {
            Ok(Some(raw)) => dispatch(&raw, &handlers),
            Ok(None) => tokio::time::sleep(LISTEN_IDLE).await,
            Err(e) => {
                if listening.load(Ordering::Acquire) {
                    error!("error receiving message: {e}");
                }
                tokio::time::sleep(LISTEN_IDLE).await;
            }
        }
    }
}

fn dispatch(raw: &[u8], handlers: &Mutex<HashMap<MessageKind, Handler>>) {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(_) => {
            warn!("dropping message: {}", MessageError::InvalidUtf8);
            return;
        }
    };
    let message = match Message::deserialize(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("dropping message: {e}");
            return;
        }
    };

    let handlers = handlers.lock().unwrap();
    match handlers.get(&message.kind) {
        Some(handler) => {
            if let Err(e) = handler(&message) {
                error!("error processing {:?} message: {e}", message.kind);
            }
        }
        None => debug!("no handler for {:?} message, dropping", message.kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kitchen_cannot_use_reception_operations() {
        let manager = IpcManager::new(7, Role::Kitchen, 2).unwrap();
        assert!(matches!(
            manager.create_kitchen_channel(1),
            Err(IpcError::NotReception)
        ));
        assert!(matches!(
            manager.remove_kitchen_channel(1),
            Err(IpcError::NotReception)
        ));
        let message = Message::new(MessageKind::Shutdown, RECEPTION_ID, String::new());
        assert!(matches!(
            manager.send_to_kitchen(1, &message),
            Err(IpcError::NotReception)
        ));
        assert!(matches!(
            manager.broadcast_to_kitchens(&message),
            Err(IpcError::NotReception)
        ));
    }

    #[test]
    fn kitchen_must_connect_before_sending() {
        let manager = IpcManager::new(8, Role::Kitchen, 2).unwrap();
        let message = Message::new(MessageKind::Heartbeat, 8, String::new());
        assert!(matches!(
            manager.send_to_reception(&message),
            Err(IpcError::NotConnected)
        ));
        assert!(!manager.is_connected());
    }

    #[test]
    fn listening_requires_an_inbox() {
        let manager = IpcManager::new(9, Role::Kitchen, 2).unwrap();
        assert!(matches!(
            manager.start_listening(),
            Err(IpcError::NoInbox)
        ));
        assert!(!manager.is_listening());
    }

    #[test]
    fn inbox_capacity_scales_with_cooks_and_clamps() {
        assert_eq!(inbox_capacity(3), 6);
        assert_eq!(inbox_capacity(200), MAX_MESSAGES);
    }
}
