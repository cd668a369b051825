//! Event callback system for the sync client
//!
//! Events are generated from any task (mutation handlers, the dispatcher, the
//! reconciler) and queued. Callbacks only run when `process_events()` is
//! called, and only on the thread that registered them, so UI code never sees
//! a callback from a runtime worker thread.

use crate::errors::{ClientError, ClientResult};
use almanac_core::models::TaskId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TrySendError};
use std::sync::Mutex;
use std::thread::{self, ThreadId};

/// Events waiting for `process_events()` beyond this are dropped.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    ImportCompleted,
    SyncStarted,
    SyncCompleted,
    SyncError,
    ConnectionLost,
    ConnectionRestored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A task was added locally
    TaskCreated { id: TaskId, text: String },
    /// A task was edited or toggled locally
    TaskUpdated { id: TaskId, text: String },
    /// A task was deleted locally
    TaskDeleted { id: TaskId },
    /// A bulk import finished
    ImportCompleted { imported: usize, skipped: usize },
    /// A reconcile against the remote started
    SyncStarted,
    /// A reconcile finished; `task_count` is the size of the merged list
    SyncCompleted { task_count: usize },
    /// A remote operation failed; the work stays queued
    SyncError { message: String },
    ConnectionLost,
    ConnectionRestored,
}

impl SyncEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            SyncEvent::TaskCreated { .. } => EventType::TaskCreated,
            SyncEvent::TaskUpdated { .. } => EventType::TaskUpdated,
            SyncEvent::TaskDeleted { .. } => EventType::TaskDeleted,
            SyncEvent::ImportCompleted { .. } => EventType::ImportCompleted,
            SyncEvent::SyncStarted => EventType::SyncStarted,
            SyncEvent::SyncCompleted { .. } => EventType::SyncCompleted,
            SyncEvent::SyncError { .. } => EventType::SyncError,
            SyncEvent::ConnectionLost => EventType::ConnectionLost,
            SyncEvent::ConnectionRestored => EventType::ConnectionRestored,
        }
    }
}

struct CallbackEntry {
    callback: Box<dyn Fn(SyncEvent) + Send>,
    event_filter: Option<EventType>,
}

pub struct EventDispatcher {
    callbacks: Mutex<Vec<CallbackEntry>>,
    event_queue: Mutex<mpsc::Receiver<SyncEvent>>,
    event_sender: mpsc::SyncSender<SyncEvent>,
    callback_thread_id: Mutex<Option<ThreadId>>,
    listening: AtomicBool,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::sync_channel(EVENT_QUEUE_CAPACITY);
        Self {
            callbacks: Mutex::new(Vec::new()),
            event_queue: Mutex::new(receiver),
            event_sender: sender,
            callback_thread_id: Mutex::new(None),
            listening: AtomicBool::new(false),
        }
    }

    fn ensure_callback_thread(&self) -> ClientResult<()> {
        let mut thread_id = self
            .callback_thread_id
            .lock()
            .map_err(|_| ClientError::LockError("thread ID".into()))?;
        if thread_id.is_none() {
            *thread_id = Some(thread::current().id());
            tracing::info!(
                "Event callbacks will be processed on thread: {:?}",
                thread::current().id()
            );
        }
        Ok(())
    }

    pub fn register_callback<F>(&self, callback: F) -> ClientResult<()>
    where
        F: Fn(SyncEvent) + Send + 'static,
    {
        self.register(Box::new(callback), None)
    }

    /// Register a callback that only receives events of `event_filter`.
    pub fn register_callback_filtered<F>(&self, callback: F, event_filter: EventType) -> ClientResult<()>
    where
        F: Fn(SyncEvent) + Send + 'static,
    {
        self.register(Box::new(callback), Some(event_filter))
    }

    fn register(
        &self,
        callback: Box<dyn Fn(SyncEvent) + Send>,
        event_filter: Option<EventType>,
    ) -> ClientResult<()> {
        self.ensure_callback_thread()?;
        self.callbacks
            .lock()
            .map_err(|_| ClientError::LockError("callbacks".into()))?
            .push(CallbackEntry {
                callback,
                event_filter,
            });
        self.listening.store(true, Ordering::Release);
        Ok(())
    }

    /// Queue an event. Never blocks and never fails the caller.
    ///
    /// Events are discarded while no callback is registered, and once
    /// [`EVENT_QUEUE_CAPACITY`] events are waiting for `process_events`.
    pub fn emit(&self, event: SyncEvent) {
        if !self.listening.load(Ordering::Acquire) {
            return;
        }
        match self.event_sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!("Event queue full, dropping {:?}", event.event_type());
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("Event queue closed, dropping event");
            }
        }
    }

    pub fn emit_task_created(&self, id: &TaskId, text: &str) {
        self.emit(SyncEvent::TaskCreated {
            id: id.clone(),
            text: text.to_string(),
        });
    }

    pub fn emit_task_updated(&self, id: &TaskId, text: &str) {
        self.emit(SyncEvent::TaskUpdated {
            id: id.clone(),
            text: text.to_string(),
        });
    }

    pub fn emit_task_deleted(&self, id: &TaskId) {
        self.emit(SyncEvent::TaskDeleted { id: id.clone() });
    }

    pub fn emit_sync_error(&self, message: &str) {
        self.emit(SyncEvent::SyncError {
            message: message.to_string(),
        });
    }

    /// Deliver all queued events. Must be called on the registration thread.
    pub fn process_events(&self) -> ClientResult<usize> {
        {
            let thread_id = self
                .callback_thread_id
                .lock()
                .map_err(|_| ClientError::LockError("thread ID".into()))?;
            match *thread_id {
                Some(expected) if expected != thread::current().id() => {
                    return Err(ClientError::ThreadSafetyViolation);
                }
                Some(_) => {}
                None => return Err(ClientError::NoCallbacksRegistered),
            }
        }

        let callbacks = self
            .callbacks
            .lock()
            .map_err(|_| ClientError::LockError("callbacks".into()))?;
        let receiver = self
            .event_queue
            .lock()
            .map_err(|_| ClientError::LockError("event queue".into()))?;

        let mut processed = 0;
        while let Ok(event) = receiver.try_recv() {
            let event_type = event.event_type();
            for entry in callbacks.iter() {
                if entry.event_filter.is_some_and(|filter| filter != event_type) {
                    continue;
                }
                (entry.callback)(event.clone());
            }
            processed += 1;
        }
        Ok(processed)
    }
}
