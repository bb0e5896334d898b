//! Host-local named bounded queues over POSIX message queues.
//!
//! Each endpoint is identified by an ASCII name; the process that creates a
//! queue owns its OS-level name and unlinks it on close. Send and receive are
//! non-blocking; [`MessageQueue::timed_receive`] polls with a deadline.

use std::ffi::CString;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::mqueue::{mq_close, mq_getattr, mq_open, mq_receive, mq_send, mq_unlink, MQ_OFlag, MqAttr, MqdT};
use nix::sys::stat::Mode;
use thiserror::Error;

/// Default queue depth.
pub const MAX_MESSAGES: usize = 100;

/// Default per-message size limit in bytes.
pub const MAX_MESSAGE_SIZE: usize = 8192;

/// Poll interval for [`MessageQueue::timed_receive`].
const RECEIVE_POLL: Duration = Duration::from_millis(10);

/// Queue transport failures.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue has no room for another message.
    #[error("queue is full")]
    Full,

    /// The message does not fit the queue's message size limit.
    #[error("message of {size} bytes exceeds the {max}-byte limit")]
    TooLarge {
        /// Offending message size.
        size: usize,
        /// The queue's per-message limit.
        max: usize,
    },

    /// The handle was already closed.
    #[error("queue is not open")]
    NotOpen,

    /// Queue names must be non-empty ASCII without slashes.
    #[error("invalid queue name: {0:?}")]
    InvalidName(String),

    /// Any other OS-level failure.
    #[error("queue operation failed: {0}")]
    Os(#[source] Errno),
}

/// A named bounded queue endpoint.
///
/// The handle is move-only; dropping it closes the descriptor, and the
/// creator additionally unlinks the name so the queue disappears from the
/// host once its owner is gone.
#[derive(Debug)]
pub struct MessageQueue {
    name: CString,
    descriptor: Option<MqdT>,
    is_creator: bool,
    max_msg_size: usize,
}

impl MessageQueue {
    /// Create a queue, replacing any stale queue of the same name.
    ///
    /// # Errors
    ///
    /// Fails when the name is invalid or the OS rejects the creation.
    pub fn create(name: &str, capacity: usize, max_msg_size: usize) -> Result<Self, QueueError> {
        let queue_name = Self::os_name(name)?;

        // A leftover queue from a crashed run would otherwise survive with
        // old messages in it.
        let _ = mq_unlink(queue_name.as_c_str());

        let attr = MqAttr::new(0, capacity as _, max_msg_size as _, 0);
        let flags = MQ_OFlag::O_CREAT | MQ_OFlag::O_RDWR | MQ_OFlag::O_NONBLOCK;
        let descriptor = mq_open(
            queue_name.as_c_str(),
            flags,
            Mode::from_bits_truncate(0o644),
            Some(&attr),
        )
        .map_err(QueueError::Os)?;

        Ok(Self {
            name: queue_name,
            descriptor: Some(descriptor),
            is_creator: true,
            max_msg_size,
        })
    }

    /// Attach to an existing queue in non-blocking mode.
    ///
    /// # Errors
    ///
    /// Fails when the name is invalid or no such queue exists.
    pub fn open(name: &str) -> Result<Self, QueueError> {
        let queue_name = Self::os_name(name)?;
        let flags = MQ_OFlag::O_RDWR | MQ_OFlag::O_NONBLOCK;
        let descriptor = mq_open(queue_name.as_c_str(), flags, Mode::empty(), None)
            .map_err(QueueError::Os)?;
        let attr = mq_getattr(&descriptor).map_err(QueueError::Os)?;

        Ok(Self {
            name: queue_name,
            descriptor: Some(descriptor),
            is_creator: false,
            max_msg_size: attr.msgsize() as usize,
        })
    }

    fn os_name(name: &str) -> Result<CString, QueueError> {
        if name.is_empty() || !name.is_ascii() || name.contains('/') {
            return Err(QueueError::InvalidName(name.to_string()));
        }
        CString::new(format!("/{name}")).map_err(|_| QueueError::InvalidName(name.to_string()))
    }

    fn descriptor(&self) -> Result<&MqdT, QueueError> {
        self.descriptor.as_ref().ok_or(QueueError::NotOpen)
    }

    /// Enqueue a message without blocking.
    ///
    /// Priorities above 0 are accepted but unused by current callers.
    ///
    /// # Errors
    ///
    /// [`QueueError::Full`] when the queue has no room,
    /// [`QueueError::TooLarge`] when the message exceeds the size limit.
    pub fn send(&self, payload: &[u8], priority: u32) -> Result<(), QueueError> {
        let descriptor = self.descriptor()?;
        if payload.len() >= self.max_msg_size {
            return Err(QueueError::TooLarge {
                size: payload.len(),
                max: self.max_msg_size,
            });
        }
        mq_send(descriptor, payload, priority).map_err(|errno| match errno {
            Errno::EAGAIN => QueueError::Full,
            Errno::EMSGSIZE => QueueError::TooLarge {
                size: payload.len(),
                max: self.max_msg_size,
            },
            other => QueueError::Os(other),
        })
    }

    /// Dequeue the next message, or `None` when the queue is empty.
    ///
    /// # Errors
    ///
    /// Fails on OS-level errors other than an empty queue.
    pub fn receive(&self) -> Result<Option<Vec<u8>>, QueueError> {
        let descriptor = self.descriptor()?;
        let mut buffer = vec![0u8; self.max_msg_size];
        let mut priority = 0u32;
        match mq_receive(descriptor, &mut buffer, &mut priority) {
            Ok(read) => {
                buffer.truncate(read);
                Ok(Some(buffer))
            }
            Err(Errno::EAGAIN) => Ok(None),
            Err(errno) => Err(QueueError::Os(errno)),
        }
    }

    /// Dequeue the next message, waiting up to `timeout` for one to arrive.
    ///
    /// Blocks the calling thread, polling the queue every few milliseconds;
    /// async callers should drive [`MessageQueue::receive`] with their own
    /// pacing instead.
    ///
    /// # Errors
    ///
    /// Fails on OS-level errors other than an empty queue.
    pub fn timed_receive(&self, timeout: Duration) -> Result<Option<Vec<u8>>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.receive()? {
                return Ok(Some(message));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(RECEIVE_POLL.min(deadline - now));
        }
    }

    /// Release the handle. The creator also unlinks the queue name.
    ///
    /// Idempotent; also runs on drop.
    pub fn close(&mut self) {
        if let Some(descriptor) = self.descriptor.take() {
            let _ = mq_close(descriptor);
            if self.is_creator {
                let _ = mq_unlink(self.name.as_c_str());
            }
        }
    }

    /// Whether the handle is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.descriptor.is_some()
    }

    /// The queue's per-message size limit.
    #[must_use]
    pub fn max_msg_size(&self) -> usize {
        self.max_msg_size
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        self.close();
    }
}
