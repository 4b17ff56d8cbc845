//! Profile Negotiation Event Handler
//!
//! A single-event state machine that runs once the stack lifecycle
//! controller has finished bring-up and posted the deferred stack-up event.
//! It completes everything that has to happen before a source device can
//! connect and stream:
//!
//! 1. set the device display name
//! 2. register the security/pairing callbacks with GAP
//! 3. initialize and register the remote-control controller role
//! 4. initialize and register the remote-control target role and advertise
//!    volume-change notification support
//! 5. register the audio-profile sink callbacks (events, then data
//!    delivery) and initialize the sink
//! 6. arm discoverable + connectable mode
//!
//! The machine starts in [`NegotiationState::Idle`], reaches
//! [`NegotiationState::Ready`] on success, and never returns to `Idle`
//! within a single bring-up. Unexpected events are logged and ignored.
//!
//! Constructing the handler consumes an [`OutputHandle`], so the audio
//! data-delivery callback can only ever be registered after the output
//! peripheral has been committed.

use crate::constants::{AVRC_EVENT_VOLUME_CHANGED, DEFAULT_DEVICE_NAME, MAX_DEVICE_NAME_LENGTH};
use crate::output::OutputHandle;
use crate::security::SecurityPolicy;
use crate::{PeerAddress, SinkEvent, StackError};
use heapless::String;

/// GAP-layer operations, injected by the platform
pub trait GapOps {
    /// Set the local device display name
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn set_device_name(&self, name: &str) -> Result<(), StackError>;

    /// Register the security/pairing event callbacks
    ///
    /// Once registered, the platform delivers [`crate::security::SecurityEvent`]s
    /// through the stack-event queue.
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn register_security_callbacks(&self) -> Result<(), StackError>;

    /// Set connectable / discoverable scan mode
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn set_scan_mode(&self, connectable: bool, discoverable: bool) -> Result<(), StackError>;

    /// Apply secure-simple-pairing parameters
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn set_security_parameters(&self, policy: &SecurityPolicy) -> Result<(), StackError>;

    /// Reply to a numeric-comparison confirmation request
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn confirm_pairing(&self, peer: PeerAddress, accept: bool) -> Result<(), StackError>;
}

/// Remote-control (AVRCP) controller and target roles, injected by the platform
pub trait RemoteControl {
    /// Initialize the controller role
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn controller_init(&self) -> Result<(), StackError>;

    /// Deinitialize the controller role
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn controller_deinit(&self) -> Result<(), StackError>;

    /// Register the controller-role event callbacks
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn controller_register_callbacks(&self) -> Result<(), StackError>;

    /// Initialize the target role
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn target_init(&self) -> Result<(), StackError>;

    /// Deinitialize the target role
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn target_deinit(&self) -> Result<(), StackError>;

    /// Register the target-role event callbacks
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn target_register_callbacks(&self) -> Result<(), StackError>;

    /// Advertise the target role's supported notification events
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn target_set_notification_capabilities(
        &self,
        capabilities: NotificationCapabilities,
    ) -> Result<(), StackError>;
}

/// Audio-profile (A2DP) sink operations, injected by the platform
pub trait AudioSinkProfile {
    /// Initialize the sink profile
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn init(&self) -> Result<(), StackError>;

    /// Deinitialize the sink profile
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn deinit(&self) -> Result<(), StackError>;

    /// Register the sink's profile-event callbacks
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn register_event_callbacks(&self) -> Result<(), StackError>;

    /// Register the decoded-PCM data-delivery callback
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn register_data_callback(&self) -> Result<(), StackError>;
}

/// Bitmask of AVRCP notification events the target role advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NotificationCapabilities(u16);

impl NotificationCapabilities {
    /// Absolute-volume change notifications
    pub const VOLUME_CHANGE: Self = Self(1 << AVRC_EVENT_VOLUME_CHANGED);

    /// No events advertised
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Union of two capability sets
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether all events in `other` are advertised
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bitmask
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }
}

/// Identity the device presents during and after negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Display name shown to source devices
    pub display_name: String<MAX_DEVICE_NAME_LENGTH>,
    /// Whether the device answers general inquiry
    pub discoverable: bool,
    /// Whether the device accepts incoming connections
    pub connectable: bool,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            display_name: String::try_from(DEFAULT_DEVICE_NAME).unwrap_or_default(),
            discoverable: true,
            connectable: true,
        }
    }
}

/// State of the negotiation machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NegotiationState {
    /// Waiting for the stack-up event
    Idle,
    /// Negotiation finished, device is discoverable and connectable
    Ready,
}

/// Consumes the deferred stack-up event and completes profile setup
pub struct NegotiationHandler<'d, G, R, S>
where
    G: GapOps,
    R: RemoteControl,
    S: AudioSinkProfile,
{
    gap: &'d G,
    remote: &'d R,
    sink: &'d S,
    identity: DeviceIdentity,
    output: OutputHandle,
    state: NegotiationState,
}

impl<'d, G, R, S> NegotiationHandler<'d, G, R, S>
where
    G: GapOps,
    R: RemoteControl,
    S: AudioSinkProfile,
{
    /// Create a handler in the `Idle` state
    ///
    /// `output` is the proof that the audio output path was committed; the
    /// data-delivery callback registered during negotiation will write into
    /// the peripheral it describes.
    #[must_use]
    pub fn new(
        gap: &'d G,
        remote: &'d R,
        sink: &'d S,
        identity: DeviceIdentity,
        output: OutputHandle,
    ) -> Self {
        Self {
            gap,
            remote,
            sink,
            identity,
            output,
            state: NegotiationState::Idle,
        }
    }

    /// Current machine state
    #[must_use]
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// The committed output descriptor the sink streams into
    #[must_use]
    pub fn output(&self) -> &OutputHandle {
        &self.output
    }

    /// Consume one event from the stack-event queue
    ///
    /// Only a [`SinkEvent::StackUp`] in `Idle` advances the machine; every
    /// other combination is logged and ignored.
    pub fn handle_event(&mut self, event: &SinkEvent) {
        match (self.state, event) {
            (NegotiationState::Idle, SinkEvent::StackUp) => match self.arm() {
                Ok(()) => {
                    self.state = NegotiationState::Ready;
                    info!("negotiation complete, device is discoverable and connectable");
                }
                Err(cause) => {
                    error!("negotiation failed: {:?}", cause);
                }
            },
            (NegotiationState::Ready, SinkEvent::StackUp) => {
                error!("duplicate stack-up event ignored");
            }
            (_, other) => {
                error!("unexpected event in negotiation handler: {:?}", other);
            }
        }
    }

    fn arm(&mut self) -> Result<(), StackError> {
        self.gap.set_device_name(self.identity.display_name.as_str())?;
        self.gap.register_security_callbacks()?;

        self.remote.controller_init()?;
        self.remote.controller_register_callbacks()?;

        self.remote.target_init()?;
        self.remote.target_register_callbacks()?;
        self.remote
            .target_set_notification_capabilities(NotificationCapabilities::VOLUME_CHANGE)?;

        self.sink.register_event_callbacks()?;
        self.sink.register_data_callback()?;
        self.sink.init()?;

        self.gap
            .set_scan_mode(self.identity.connectable, self.identity.discoverable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{OutputConfig, OutputConfigurator, OutputDriver, PinAssignment};
    use crate::security::SecurityEvent;
    use core::cell::{Cell, RefCell};
    use heapless::Vec;

    type CallLog = RefCell<Vec<&'static str, 16>>;

    struct FakeGap<'d> {
        log: &'d CallLog,
        scan_mode: Cell<Option<(bool, bool)>>,
    }

    impl GapOps for FakeGap<'_> {
        fn set_device_name(&self, name: &str) -> Result<(), StackError> {
            assert_eq!(name, "SINKLET_SPEAKER");
            self.log.borrow_mut().push("set_device_name").unwrap();
            Ok(())
        }

        fn register_security_callbacks(&self) -> Result<(), StackError> {
            self.log.borrow_mut().push("register_security_callbacks").unwrap();
            Ok(())
        }

        fn set_scan_mode(&self, connectable: bool, discoverable: bool) -> Result<(), StackError> {
            self.log.borrow_mut().push("set_scan_mode").unwrap();
            self.scan_mode.set(Some((connectable, discoverable)));
            Ok(())
        }

        fn set_security_parameters(&self, _policy: &SecurityPolicy) -> Result<(), StackError> {
            self.log.borrow_mut().push("set_security_parameters").unwrap();
            Ok(())
        }

        fn confirm_pairing(&self, _peer: PeerAddress, _accept: bool) -> Result<(), StackError> {
            self.log.borrow_mut().push("confirm_pairing").unwrap();
            Ok(())
        }
    }

    struct FakeRemote<'d> {
        log: &'d CallLog,
        fail_target_init: Cell<bool>,
        capabilities: Cell<Option<NotificationCapabilities>>,
    }

    impl RemoteControl for FakeRemote<'_> {
        fn controller_init(&self) -> Result<(), StackError> {
            self.log.borrow_mut().push("ct_init").unwrap();
            Ok(())
        }

        fn controller_deinit(&self) -> Result<(), StackError> {
            self.log.borrow_mut().push("ct_deinit").unwrap();
            Ok(())
        }

        fn controller_register_callbacks(&self) -> Result<(), StackError> {
            self.log.borrow_mut().push("ct_register_callbacks").unwrap();
            Ok(())
        }

        fn target_init(&self) -> Result<(), StackError> {
            self.log.borrow_mut().push("tg_init").unwrap();
            if self.fail_target_init.get() {
                Err(StackError::NoMemory)
            } else {
                Ok(())
            }
        }

        fn target_deinit(&self) -> Result<(), StackError> {
            self.log.borrow_mut().push("tg_deinit").unwrap();
            Ok(())
        }

        fn target_register_callbacks(&self) -> Result<(), StackError> {
            self.log.borrow_mut().push("tg_register_callbacks").unwrap();
            Ok(())
        }

        fn target_set_notification_capabilities(
            &self,
            capabilities: NotificationCapabilities,
        ) -> Result<(), StackError> {
            self.log.borrow_mut().push("tg_set_capabilities").unwrap();
            self.capabilities.set(Some(capabilities));
            Ok(())
        }
    }

    struct FakeSink<'d> {
        log: &'d CallLog,
    }

    impl AudioSinkProfile for FakeSink<'_> {
        fn init(&self) -> Result<(), StackError> {
            self.log.borrow_mut().push("sink_init").unwrap();
            Ok(())
        }

        fn deinit(&self) -> Result<(), StackError> {
            self.log.borrow_mut().push("sink_deinit").unwrap();
            Ok(())
        }

        fn register_event_callbacks(&self) -> Result<(), StackError> {
            self.log.borrow_mut().push("sink_register_event_callbacks").unwrap();
            Ok(())
        }

        fn register_data_callback(&self) -> Result<(), StackError> {
            self.log.borrow_mut().push("sink_register_data_callback").unwrap();
            Ok(())
        }
    }

    struct FakeOutput;

    impl OutputDriver for FakeOutput {
        fn install(&self, _config: &OutputConfig) -> Result<(), StackError> {
            Ok(())
        }

        fn set_pins(&self, _pins: &PinAssignment) -> Result<(), StackError> {
            Ok(())
        }

        fn set_internal_dac_mode(
            &self,
            _channels: crate::output::DacChannels,
        ) -> Result<(), StackError> {
            Ok(())
        }
    }

    fn committed_output() -> OutputHandle {
        let driver = FakeOutput;
        let mut configurator = OutputConfigurator::new(&driver);
        configurator.commit(OutputConfig::default()).unwrap()
    }

    fn fakes(log: &CallLog) -> (FakeGap<'_>, FakeRemote<'_>, FakeSink<'_>) {
        (
            FakeGap {
                log,
                scan_mode: Cell::new(None),
            },
            FakeRemote {
                log,
                fail_target_init: Cell::new(false),
                capabilities: Cell::new(None),
            },
            FakeSink { log },
        )
    }

    #[test]
    fn test_stack_up_runs_full_arming_sequence() {
        let log = CallLog::default();
        let (gap, remote, sink) = fakes(&log);
        let mut handler = NegotiationHandler::new(
            &gap,
            &remote,
            &sink,
            DeviceIdentity::default(),
            committed_output(),
        );

        handler.handle_event(&SinkEvent::StackUp);

        assert_eq!(handler.state(), NegotiationState::Ready);
        assert_eq!(
            &log.borrow()[..],
            &[
                "set_device_name",
                "register_security_callbacks",
                "ct_init",
                "ct_register_callbacks",
                "tg_init",
                "tg_register_callbacks",
                "tg_set_capabilities",
                "sink_register_event_callbacks",
                "sink_register_data_callback",
                "sink_init",
                "set_scan_mode",
            ][..]
        );
        assert_eq!(gap.scan_mode.get(), Some((true, true)));
        assert_eq!(
            remote.capabilities.get(),
            Some(NotificationCapabilities::VOLUME_CHANGE)
        );
    }

    #[test]
    fn test_duplicate_stack_up_ignored_in_ready() {
        let log = CallLog::default();
        let (gap, remote, sink) = fakes(&log);
        let mut handler = NegotiationHandler::new(
            &gap,
            &remote,
            &sink,
            DeviceIdentity::default(),
            committed_output(),
        );

        handler.handle_event(&SinkEvent::StackUp);
        let calls_after_first = log.borrow().len();
        handler.handle_event(&SinkEvent::StackUp);

        assert_eq!(handler.state(), NegotiationState::Ready);
        assert_eq!(log.borrow().len(), calls_after_first);
    }

    #[test]
    fn test_unexpected_event_in_idle_ignored() {
        let log = CallLog::default();
        let (gap, remote, sink) = fakes(&log);
        let mut handler = NegotiationHandler::new(
            &gap,
            &remote,
            &sink,
            DeviceIdentity::default(),
            committed_output(),
        );

        handler.handle_event(&SinkEvent::Security(SecurityEvent::Other { id: 7 }));

        assert_eq!(handler.state(), NegotiationState::Idle);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_arming_failure_stays_idle_and_aborts_sequence() {
        let log = CallLog::default();
        let (gap, remote, sink) = fakes(&log);
        remote.fail_target_init.set(true);
        let mut handler = NegotiationHandler::new(
            &gap,
            &remote,
            &sink,
            DeviceIdentity::default(),
            committed_output(),
        );

        handler.handle_event(&SinkEvent::StackUp);

        assert_eq!(handler.state(), NegotiationState::Idle);
        // Nothing after the failing target init ran.
        assert_eq!(log.borrow().last(), Some(&"tg_init"));
        assert!(!log.borrow().contains(&"sink_register_data_callback"));
    }

    #[test]
    fn test_identity_controls_scan_mode() {
        let log = CallLog::default();
        let (gap, remote, sink) = fakes(&log);
        let identity = DeviceIdentity {
            discoverable: false,
            ..DeviceIdentity::default()
        };
        let mut handler =
            NegotiationHandler::new(&gap, &remote, &sink, identity, committed_output());

        handler.handle_event(&SinkEvent::StackUp);

        assert_eq!(gap.scan_mode.get(), Some((true, false)));
    }

    #[test]
    fn test_notification_capability_mask() {
        let caps = NotificationCapabilities::VOLUME_CHANGE;
        assert_eq!(caps.bits(), 1 << 0x0D);
        assert!(caps.contains(NotificationCapabilities::VOLUME_CHANGE));
        assert!(!NotificationCapabilities::empty().contains(caps));
        assert_eq!(
            NotificationCapabilities::empty().with(caps),
            caps
        );
    }
}
