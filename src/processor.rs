//! Deferred Event Dispatch
//!
//! The stack lifecycle controller must return from bring-up before profile
//! negotiation runs, so the stack-up event travels through a FIFO queue
//! consumed by a single worker task. This module provides the queue-backed
//! [`EventDispatcher`] implementation and the worker loop that routes queued
//! events to the negotiation and security handlers.
//!
//! # Usage
//!
//! ```rust,no_run
//! use sinklet::processor::{EventQueue, QueueDispatcher};
//!
//! static EVENTS: EventQueue = EventQueue::new();
//!
//! let dispatcher = QueueDispatcher::new(&EVENTS);
//! // Hand `dispatcher` to the lifecycle controller and spawn
//! // `event_processor` (or call `run`) on the executor.
//! ```

use crate::constants::MAX_PENDING_EVENTS;
use crate::lifecycle::{
    EventDispatcher, HostStack, LifecycleController, ProtocolController, StageError,
};
use crate::negotiation::{AudioSinkProfile, GapOps, NegotiationHandler, RemoteControl};
use crate::security::SecurityHandler;
use crate::{SinkEvent, StackError};
use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, Ordering};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

/// The deferred stack-event queue
pub type EventQueue = Channel<CriticalSectionRawMutex, SinkEvent, MAX_PENDING_EVENTS>;

/// Queue-backed event-dispatch worker handle
///
/// Posting is single-producer-safe and non-blocking; delivery order is
/// FIFO with one consumer. Posts made while the dispatcher is stopped are
/// rejected, and shutting down drops everything still queued.
pub struct QueueDispatcher<'d> {
    queue: &'d EventQueue,
    running: AtomicBool,
}

impl<'d> QueueDispatcher<'d> {
    /// Create a stopped dispatcher over `queue`
    #[must_use]
    pub fn new(queue: &'d EventQueue) -> Self {
        Self {
            queue,
            running: AtomicBool::new(false),
        }
    }

    /// Whether the dispatcher currently accepts posts
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl EventDispatcher for QueueDispatcher<'_> {
    fn start(&self) -> Result<(), StackError> {
        if self.running.swap(true, Ordering::AcqRel) {
            Err(StackError::InvalidState)
        } else {
            Ok(())
        }
    }

    fn shutdown(&self) -> Result<(), StackError> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Err(StackError::InvalidState);
        }
        let mut dropped = 0usize;
        while self.queue.try_receive().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!("dispatcher shutdown dropped {} queued event(s)", dropped);
        }
        Ok(())
    }

    fn post(&self, event: SinkEvent) -> Result<(), StackError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(StackError::InvalidState);
        }
        self.queue.try_send(event).map_err(|_| StackError::NoMemory)
    }
}

/// Route one queued event to the handler that owns it
pub fn dispatch_event<G1, G2, R, S>(
    event: SinkEvent,
    negotiation: &mut NegotiationHandler<'_, G1, R, S>,
    security: &SecurityHandler<'_, G2>,
) where
    G1: GapOps,
    G2: GapOps,
    R: RemoteControl,
    S: AudioSinkProfile,
{
    match event {
        SinkEvent::Security(ref security_event) => security.handle_event(security_event),
        ref other => negotiation.handle_event(other),
    }
}

/// Worker loop consuming the stack-event queue
///
/// Spawn this as its own task. Events are delivered in FIFO order, one at
/// a time, so the negotiation handler observes the stack-up event strictly
/// after [`LifecycleController::bring_up`] has returned to its caller.
pub async fn event_processor<G1, G2, R, S>(
    queue: &EventQueue,
    negotiation: &mut NegotiationHandler<'_, G1, R, S>,
    security: &SecurityHandler<'_, G2>,
) -> !
where
    G1: GapOps,
    G2: GapOps,
    R: RemoteControl,
    S: AudioSinkProfile,
{
    loop {
        let event = queue.receive().await;
        debug!("dispatching stack event: {:?}", event);
        dispatch_event(event, negotiation, security);
    }
}

/// Bring the stack up, then process events until torn down externally
///
/// Convenience wrapper over [`LifecycleController::bring_up`] followed by
/// [`event_processor`].
///
/// # Errors
/// Returns the bring-up stage error without entering the event loop.
pub async fn run<C, H, D, R, S, G1, G2>(
    queue: &EventQueue,
    controller: &mut LifecycleController<'_, C, H, D, R, S, G1>,
    negotiation: &mut NegotiationHandler<'_, G1, R, S>,
    security: &SecurityHandler<'_, G2>,
) -> Result<Infallible, StageError>
where
    C: ProtocolController,
    H: HostStack,
    D: EventDispatcher,
    R: RemoteControl,
    S: AudioSinkProfile,
    G1: GapOps,
    G2: GapOps,
{
    controller.bring_up()?;
    event_processor(queue, negotiation, security).await
}
