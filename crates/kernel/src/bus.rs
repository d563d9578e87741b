//! Deferred message bus.
//!
//! `MessageQueue::post` only enqueues. Handlers run when the scheduler drains
//! the queue at the end of a step. Dispatch is keyed on the exact runtime
//! type of the message; there is no subtype matching.

use std::any::{Any, TypeId, type_name};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use stride_common::CallbackError;

use crate::frame::Frame;

/// A posted message: an owned payload tagged with its concrete type.
pub struct Message {
    type_id: TypeId,
    type_name: &'static str,
    payload: Box<dyn Any>,
}

impl Message {
    pub fn new<M: 'static>(payload: M) -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            type_name: type_name::<M>(),
            payload: Box::new(payload),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<M: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<M>()
    }

    pub fn downcast_ref<M: 'static>(&self) -> Option<&M> {
        self.payload.downcast_ref::<M>()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// FIFO of messages waiting for the next drain point.
#[derive(Debug, Default)]
pub struct MessageQueue {
    pending: VecDeque<Message>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post<M: 'static>(&mut self, message: M) {
        self.push(Message::new(message));
    }

    pub fn push(&mut self, message: Message) {
        tracing::trace!(message = message.type_name(), "posted");
        self.pending.push_back(message);
    }

    pub fn pop(&mut self) -> Option<Message> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Discard everything queued. Returns how many messages were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

type Handler = Box<dyn FnMut(&dyn Any, &mut Frame<'_>) -> Result<(), CallbackError>>;

/// Handlers grouped by message type, each list in registration order.
#[derive(Default)]
pub struct Handlers {
    by_type: HashMap<TypeId, Vec<Handler>>,
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("types", &self.by_type.len())
            .field("handlers", &self.by_type.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for messages whose concrete type is `M`.
    pub fn on<M: 'static>(
        &mut self,
        mut handler: impl FnMut(&M, &mut Frame<'_>) -> Result<(), CallbackError> + 'static,
    ) {
        let erased: Handler = Box::new(move |payload: &dyn Any, frame: &mut Frame<'_>| {
            match payload.downcast_ref::<M>() {
                Some(message) => handler(message, frame),
                None => Ok(()),
            }
        });
        self.by_type.entry(TypeId::of::<M>()).or_default().push(erased);
    }

    /// Number of handlers registered for `M`.
    pub fn count<M: 'static>(&self) -> usize {
        self.by_type.get(&TypeId::of::<M>()).map_or(0, Vec::len)
    }

    /// Run every handler registered for the message's type, in registration
    /// order. Stops at the first failing handler. Returns how many handlers
    /// ran.
    pub fn dispatch(&mut self, message: &Message, frame: &mut Frame<'_>) -> Result<usize, CallbackError> {
        let Some(handlers) = self.by_type.get_mut(&message.type_id) else {
            return Ok(0);
        };
        for handler in handlers.iter_mut() {
            handler(&*message.payload, frame)?;
        }
        Ok(handlers.len())
    }
}
