//! `sinklet` Constants
//!
//! This module contains the constants used throughout the `sinklet` library:
//! event-queue sizing, default identity values, and the audio-output
//! parameters the default descriptor is built from.

/// Capacity of the deferred stack-event queue
pub const MAX_PENDING_EVENTS: usize = 8;

/// Maximum device display-name length in bytes
pub const MAX_DEVICE_NAME_LENGTH: usize = 32;

/// Default device display name advertised during negotiation
pub const DEFAULT_DEVICE_NAME: &str = "SINKLET_SPEAKER";

/// AVRCP notification event id for absolute-volume changes
pub const AVRC_EVENT_VOLUME_CHANGED: u8 = 0x0D;

/// Default output sample rate in Hz
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 44_100;

/// Default output sample width in bits
pub const DEFAULT_BITS_PER_SAMPLE: u8 = 32;

/// Default number of DMA buffer descriptors for the output peripheral
pub const DEFAULT_BUFFER_COUNT: u8 = 6;

/// Default length of each DMA buffer descriptor in frames
pub const DEFAULT_BUFFER_FRAMES: u16 = 60;

/// Default bit-clock pin for external DAC routing
pub const DEFAULT_BCK_PIN: u8 = 25;

/// Default word-select (LR clock) pin for external DAC routing
pub const DEFAULT_WS_PIN: u8 = 26;

/// Default data-out pin for external DAC routing
pub const DEFAULT_DATA_OUT_PIN: u8 = 27;

/// Maximum number of tear-down stage errors collected in one report
pub const MAX_SHUTDOWN_ERRORS: usize = 8;
