#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod address;
pub mod constants;
pub mod lifecycle;
pub mod negotiation;
pub mod output;
pub mod processor;
pub mod security;

pub use address::PeerAddress;

use crate::security::SecurityEvent;

/// Error code surfaced by an underlying stack or driver call.
///
/// Collaborator traits map their native error codes onto this set; the
/// lifecycle controller carries it as the cause inside stage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackError {
    /// The layer is not in a state that permits the call
    InvalidState,
    /// The layer could not allocate required memory
    NoMemory,
    /// The operation is not supported by this stack build
    NotSupported,
    /// Invalid parameter provided (e.g., malformed address)
    InvalidParameter,
    /// The underlying call timed out
    Timeout,
    /// Unspecified failure reported by the layer
    Failed,
}

/// Events delivered through the deferred stack-event queue.
///
/// The lifecycle controller posts [`SinkEvent::StackUp`] exactly once per
/// successful bring-up; the platform's GAP layer posts
/// [`SinkEvent::Security`] events once its callbacks are registered during
/// negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SinkEvent {
    /// The wireless stack finished bring-up and negotiation may start
    StackUp,
    /// Authentication / pairing event raised by the protocol layer
    Security(SecurityEvent),
}
