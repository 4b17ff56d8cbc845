//! Peripheral Output Configurator
//!
//! Builds the hardware configuration descriptor for the digital audio output
//! (sample format, channel layout, DMA buffering) and commits it to the
//! output driver exactly once, before the wireless stack can start
//! delivering decoded PCM.
//!
//! ## Output routing
//!
//! The output path is selected at construction time through [`OutputMode`]:
//! either an external DAC wired to a set of I2S pins, or the chip's
//! internal DAC. Routing happens as part of [`OutputConfigurator::commit`],
//! right after the driver is installed with the descriptor.
//!
//! ## Commit-once contract
//!
//! Re-installing the driver without an intervening uninstall is undefined on
//! the underlying peripheral, so a second `commit` on the same configurator
//! is rejected with [`ConfigError::AlreadyInstalled`]. A successful commit
//! yields an [`OutputHandle`], which the negotiation handler requires before
//! it will register the audio data-delivery callback. That makes the
//! "output committed before audio can flow" ordering a structural property
//! rather than a runtime convention.

use crate::StackError;
use crate::constants::{
    DEFAULT_BCK_PIN, DEFAULT_BITS_PER_SAMPLE, DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_FRAMES,
    DEFAULT_DATA_OUT_PIN, DEFAULT_SAMPLE_RATE_HZ, DEFAULT_WS_PIN,
};

/// Speaker channel layout of the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelLayout {
    /// Single channel
    Mono,
    /// Two channels, right/left interleaved
    Stereo,
}

/// I2S pin routing for an external DAC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinAssignment {
    /// Bit-clock pin
    pub bck: u8,
    /// Word-select (LR clock) pin
    pub ws: u8,
    /// Serial data output pin
    pub data_out: u8,
}

impl Default for PinAssignment {
    fn default() -> Self {
        Self {
            bck: DEFAULT_BCK_PIN,
            ws: DEFAULT_WS_PIN,
            data_out: DEFAULT_DATA_OUT_PIN,
        }
    }
}

/// Which internal DAC channels to enable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DacChannels {
    /// Left channel only
    Left,
    /// Right channel only
    Right,
    /// Both channels
    Both,
}

/// Output routing mode, resolved once when the descriptor is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputMode {
    /// Route the stream to an external DAC over the given I2S pins
    ExternalPins(PinAssignment),
    /// Route the stream to the chip's internal DAC
    InternalDac(DacChannels),
}

/// Immutable hardware configuration descriptor for the audio output
///
/// Constructed once, handed to the driver at commit time, never mutated
/// afterwards. The defaults mirror a 44.1 kHz stereo sink feeding an
/// external amplifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputConfig {
    /// Sample rate in Hz
    pub sample_rate_hz: u32,
    /// Sample width in bits
    pub bits_per_sample: u8,
    /// Channel layout
    pub channel_layout: ChannelLayout,
    /// Number of DMA buffer descriptors
    pub buffer_count: u8,
    /// Length of each DMA buffer descriptor in frames
    pub buffer_frames: u16,
    /// Output routing mode
    pub mode: OutputMode,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            bits_per_sample: DEFAULT_BITS_PER_SAMPLE,
            channel_layout: ChannelLayout::Stereo,
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            mode: OutputMode::ExternalPins(PinAssignment::default()),
        }
    }
}

/// Errors raised while committing the output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The driver is already installed; re-commit without uninstall is rejected
    AlreadyInstalled,
    /// The driver rejected the hardware descriptor
    Install(StackError),
    /// Pin or DAC routing failed after the driver was installed
    Routing(StackError),
}

/// Digital audio output driver, injected by the platform
pub trait OutputDriver {
    /// Install the output driver with the given descriptor
    ///
    /// # Errors
    /// Returns the driver's error code if the descriptor is rejected.
    fn install(&self, config: &OutputConfig) -> Result<(), StackError>;

    /// Route the output signals to the given external-DAC pins
    ///
    /// # Errors
    /// Returns the driver's error code if the pins cannot be assigned.
    fn set_pins(&self, pins: &PinAssignment) -> Result<(), StackError>;

    /// Enable the internal DAC on the given channels
    ///
    /// # Errors
    /// Returns the driver's error code if the internal DAC is unavailable.
    fn set_internal_dac_mode(&self, channels: DacChannels) -> Result<(), StackError>;
}

/// Proof that the output path has been committed
///
/// Only [`OutputConfigurator::commit`] can produce one. Holding it entitles
/// the negotiation handler to register the audio data-delivery callback.
#[derive(Debug)]
pub struct OutputHandle {
    config: OutputConfig,
}

impl OutputHandle {
    /// The descriptor the output path was committed with
    #[must_use]
    pub fn config(&self) -> &OutputConfig {
        &self.config
    }
}

/// Commits the output descriptor to the driver, exactly once
pub struct OutputConfigurator<'d, D: OutputDriver> {
    driver: &'d D,
    installed: bool,
}

impl<'d, D: OutputDriver> OutputConfigurator<'d, D> {
    /// Create a configurator over the platform's output driver
    #[must_use]
    pub fn new(driver: &'d D) -> Self {
        Self {
            driver,
            installed: false,
        }
    }

    /// Install the driver with `config` and route the output path
    ///
    /// A hardware-configuration failure is fatal to the audio path: it is
    /// reported to the caller and no retry is attempted.
    ///
    /// # Errors
    /// * [`ConfigError::AlreadyInstalled`] on a second commit
    /// * [`ConfigError::Install`] if the driver rejects the descriptor
    /// * [`ConfigError::Routing`] if pin/DAC assignment fails
    pub fn commit(&mut self, config: OutputConfig) -> Result<OutputHandle, ConfigError> {
        if self.installed {
            return Err(ConfigError::AlreadyInstalled);
        }

        self.driver.install(&config).map_err(|cause| {
            error!("output driver install failed: {:?}", cause);
            ConfigError::Install(cause)
        })?;
        self.installed = true;

        let routing = match config.mode {
            OutputMode::ExternalPins(ref pins) => self.driver.set_pins(pins),
            OutputMode::InternalDac(channels) => self.driver.set_internal_dac_mode(channels),
        };
        routing.map_err(|cause| {
            error!("output routing failed: {:?}", cause);
            ConfigError::Routing(cause)
        })?;

        info!(
            "output path committed: {} Hz, {} bit",
            config.sample_rate_hz, config.bits_per_sample
        );
        Ok(OutputHandle { config })
    }
}
