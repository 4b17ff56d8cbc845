//! Stack Lifecycle Controller
//!
//! Owns the ordered bring-up and reverse-ordered tear-down of the wireless
//! protocol layers for the audio sink.
//!
//! ## Bring-up
//!
//! Bring-up runs eight stages strictly in order and aborts on the first
//! failure, reporting the failing stage's identity and cause. There is no
//! automatic rollback and no retry: the caller decides whether to tear down
//! the partially brought-up stack.
//!
//! 1. release the reserved low-energy radio memory (once per process)
//! 2. initialize the protocol controller with its default configuration
//! 3. enable the controller in classic (BR/EDR) mode
//! 4. initialize the host stack middleware
//! 5. enable the host stack
//! 6. start the deferred-event dispatch worker
//! 7. post exactly one stack-up event for the negotiation handler
//! 8. apply the secure-simple-pairing parameters
//!
//! Bring-up returns synchronously; profile negotiation completes later on
//! the event-dispatch worker. Stage 7 is a queue post, never an inline call.
//!
//! ## Tear-down
//!
//! Tear-down mirrors the sequence best-effort: every stage whose bring-up
//! phase was reached is attempted even when an earlier tear-down stage
//! fails, because leaving a later-stage resource allocated is worse than a
//! partial shutdown. Failures are logged and collected into a
//! [`ShutdownReport`] instead of aborting.
//!
//! ## One-time memory release
//!
//! The radio reserves memory for the unused low-energy mode at boot.
//! Releasing it is irreversible within a process lifetime, so the release is
//! gated by a [`MemReleaseFlag`] that trips atomically on first use and is
//! never reset, no matter how many bring-up/tear-down cycles run.

use crate::negotiation::{AudioSinkProfile, GapOps, RemoteControl};
use crate::security::SecurityPolicy;
use crate::{SinkEvent, StackError};
use core::sync::atomic::{AtomicBool, Ordering};
use heapless::Vec;

use crate::constants::MAX_SHUTDOWN_ERRORS;

/// Radio mode selector for the protocol controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerMode {
    /// Classic BR/EDR only
    Classic,
    /// Low-energy only
    LowEnergy,
    /// Both classic and low-energy
    Dual,
}

/// Default bring-up parameters for the protocol controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerConfig {
    /// Maximum simultaneous ACL links
    pub max_acl_connections: u8,
    /// Maximum simultaneous synchronous (SCO/eSCO) links
    pub max_sync_connections: u8,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_acl_connections: 2,
            max_sync_connections: 1,
        }
    }
}

/// Options for a [`LifecycleController`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleOptions {
    /// Controller bring-up parameters
    pub controller: ControllerConfig,
    /// Pairing policy applied as the final bring-up stage
    pub policy: SecurityPolicy,
}

/// Bring-up progress, ordered; tear-down skips phases never reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LifecyclePhase {
    /// Nothing brought up
    Off,
    /// Protocol controller initialized
    ControllerInit,
    /// Protocol controller enabled
    ControllerEnable,
    /// Host stack initialized
    StackInit,
    /// Host stack enabled
    StackEnable,
    /// Stack-up event posted, negotiation pending or complete
    NegotiationArmed,
}

/// Named bring-up stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    /// One-time reserved-memory release for the unused radio mode
    MemoryRelease,
    /// Protocol controller initialization
    ControllerInit,
    /// Protocol controller enable (classic mode)
    ControllerEnable,
    /// Host stack initialization
    StackInit,
    /// Host stack enable
    StackEnable,
    /// Event-dispatch worker start
    DispatchStart,
    /// Stack-up event post
    EventPost,
    /// Security parameter application
    SecuritySetup,
}

/// Named tear-down stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShutdownStage {
    /// Event-dispatch worker shutdown
    DispatchShutdown,
    /// Remote-control target role deinitialization
    RemoteTargetDeinit,
    /// Remote-control controller role deinitialization
    RemoteControllerDeinit,
    /// Audio-profile sink deinitialization
    SinkDeinit,
    /// Host stack disable and deinitialization
    StackShutdown,
    /// Protocol controller disable and deinitialization
    ControllerShutdown,
}

/// A bring-up stage failed; later stages were not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StageError {
    /// The stage that failed
    pub stage: Stage,
    /// The underlying error reported by the layer
    pub cause: StackError,
}

/// A tear-down stage failed; later stages still ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ShutdownStageError {
    /// The stage that failed
    pub stage: ShutdownStage,
    /// The underlying error reported by the layer
    pub cause: StackError,
}

/// Every tear-down stage failure observed during one [`LifecycleController::tear_down`]
pub type ShutdownReport = Vec<ShutdownStageError, MAX_SHUTDOWN_ERRORS>;

/// One-time gate for the reserved-memory release
///
/// Trips atomically on the first [`take`](Self::take) and never resets.
/// Declare it `static` so the gate spans the whole process lifetime across
/// repeated bring-up/tear-down cycles, and so concurrent bring-up attempts
/// cannot both win the gate.
#[derive(Debug)]
pub struct MemReleaseFlag(AtomicBool);

impl MemReleaseFlag {
    /// Create an untripped flag
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Trip the flag; returns `true` exactly once per flag instance
    pub fn take(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    /// Whether the flag has tripped
    #[must_use]
    pub fn is_taken(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for MemReleaseFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Lower protocol controller (link layer), injected by the platform
pub trait ProtocolController {
    /// Initialize the controller
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn init(&self, config: &ControllerConfig) -> Result<(), StackError>;

    /// Enable the controller in the given radio mode
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn enable(&self, mode: ControllerMode) -> Result<(), StackError>;

    /// Disable the controller
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn disable(&self) -> Result<(), StackError>;

    /// Deinitialize the controller
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn deinit(&self) -> Result<(), StackError>;

    /// Release the memory reserved for an unused radio mode
    ///
    /// Irreversible within a process lifetime; must be called at most once.
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn release_reserved_memory(&self, mode: ControllerMode) -> Result<(), StackError>;
}

/// Upper host-stack middleware, injected by the platform
pub trait HostStack {
    /// Initialize the host stack
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn init(&self) -> Result<(), StackError>;

    /// Enable the host stack
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn enable(&self) -> Result<(), StackError>;

    /// Disable the host stack
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn disable(&self) -> Result<(), StackError>;

    /// Deinitialize the host stack
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn deinit(&self) -> Result<(), StackError>;
}

/// Deferred-event dispatch worker, injected by the platform
///
/// FIFO delivery, single consumer. The lifecycle controller posts to it but
/// never blocks on consumption; that decoupling is why negotiation is a
/// deferred event and not an inline call.
pub trait EventDispatcher {
    /// Start accepting and delivering events
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn start(&self) -> Result<(), StackError>;

    /// Stop delivery and drop queued events
    ///
    /// # Errors
    /// Returns the layer's error code on failure.
    fn shutdown(&self) -> Result<(), StackError>;

    /// Enqueue one event without blocking
    ///
    /// # Errors
    /// Returns the layer's error code if the worker is stopped or the
    /// queue is full.
    fn post(&self, event: SinkEvent) -> Result<(), StackError>;
}

/// Sequences bring-up and tear-down of the wireless audio stack
pub struct LifecycleController<'d, C, H, D, R, S, G>
where
    C: ProtocolController,
    H: HostStack,
    D: EventDispatcher,
    R: RemoteControl,
    S: AudioSinkProfile,
    G: GapOps,
{
    controller: &'d C,
    stack: &'d H,
    dispatcher: &'d D,
    remote: &'d R,
    sink: &'d S,
    gap: &'d G,
    mem_release: &'d MemReleaseFlag,
    options: LifecycleOptions,
    phase: LifecyclePhase,
    dispatch_running: bool,
}

impl<'d, C, H, D, R, S, G> LifecycleController<'d, C, H, D, R, S, G>
where
    C: ProtocolController,
    H: HostStack,
    D: EventDispatcher,
    R: RemoteControl,
    S: AudioSinkProfile,
    G: GapOps,
{
    /// Create a controller in the `Off` phase
    ///
    /// `mem_release` should point at a `static` flag so the one-time
    /// reserved-memory release is gated per process, not per controller.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        controller: &'d C,
        stack: &'d H,
        dispatcher: &'d D,
        remote: &'d R,
        sink: &'d S,
        gap: &'d G,
        mem_release: &'d MemReleaseFlag,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            controller,
            stack,
            dispatcher,
            remote,
            sink,
            gap,
            mem_release,
            options,
            phase: LifecyclePhase::Off,
            dispatch_running: false,
        }
    }

    /// Current bring-up phase
    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Bring the wireless audio stack up
    ///
    /// Runs the stages described in the module docs strictly in order and
    /// aborts on the first failure without attempting later stages or
    /// rolling back earlier ones. On success the stack-up event has been
    /// posted and negotiation will complete on the event-dispatch worker.
    ///
    /// # Errors
    /// Returns the identity of the failing stage and the underlying cause.
    /// Calling while not in the `Off` phase fails with
    /// [`StackError::InvalidState`].
    pub fn bring_up(&mut self) -> Result<(), StageError> {
        if self.phase != LifecyclePhase::Off {
            error!("bring-up requested while stack is already up");
            return Err(StageError {
                stage: Stage::ControllerInit,
                cause: StackError::InvalidState,
            });
        }

        if self.mem_release.take() {
            self.stage(
                Stage::MemoryRelease,
                self.controller
                    .release_reserved_memory(ControllerMode::LowEnergy),
            )?;
        }

        self.stage(
            Stage::ControllerInit,
            self.controller.init(&self.options.controller),
        )?;
        self.phase = LifecyclePhase::ControllerInit;

        self.stage(
            Stage::ControllerEnable,
            self.controller.enable(ControllerMode::Classic),
        )?;
        self.phase = LifecyclePhase::ControllerEnable;

        self.stage(Stage::StackInit, self.stack.init())?;
        self.phase = LifecyclePhase::StackInit;

        self.stage(Stage::StackEnable, self.stack.enable())?;
        self.phase = LifecyclePhase::StackEnable;

        self.stage(Stage::DispatchStart, self.dispatcher.start())?;
        self.dispatch_running = true;

        self.stage(Stage::EventPost, self.dispatcher.post(SinkEvent::StackUp))?;
        self.phase = LifecyclePhase::NegotiationArmed;

        self.stage(
            Stage::SecuritySetup,
            self.gap.set_security_parameters(&self.options.policy),
        )?;

        info!("bring-up complete, negotiation armed");
        Ok(())
    }

    /// Tear the wireless audio stack down, best-effort
    ///
    /// Visits the mirror sequence of every phase reached during bring-up.
    /// A failing stage is logged and recorded but never stops later stages.
    /// Afterwards the controller is back in the `Off` phase and may be
    /// brought up again; the one-time memory release will not repeat.
    pub fn tear_down(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::new();

        if self.dispatch_running {
            Self::attempt(
                &mut report,
                ShutdownStage::DispatchShutdown,
                self.dispatcher.shutdown(),
            );
            self.dispatch_running = false;
        }

        if self.phase >= LifecyclePhase::NegotiationArmed {
            Self::attempt(
                &mut report,
                ShutdownStage::RemoteTargetDeinit,
                self.remote.target_deinit(),
            );
            Self::attempt(
                &mut report,
                ShutdownStage::RemoteControllerDeinit,
                self.remote.controller_deinit(),
            );
            Self::attempt(&mut report, ShutdownStage::SinkDeinit, self.sink.deinit());
        }

        if self.phase >= LifecyclePhase::StackEnable {
            Self::attempt(
                &mut report,
                ShutdownStage::StackShutdown,
                self.stack.disable(),
            );
        }
        if self.phase >= LifecyclePhase::StackInit {
            Self::attempt(
                &mut report,
                ShutdownStage::StackShutdown,
                self.stack.deinit(),
            );
        }

        if self.phase >= LifecyclePhase::ControllerEnable {
            Self::attempt(
                &mut report,
                ShutdownStage::ControllerShutdown,
                self.controller.disable(),
            );
        }
        if self.phase >= LifecyclePhase::ControllerInit {
            Self::attempt(
                &mut report,
                ShutdownStage::ControllerShutdown,
                self.controller.deinit(),
            );
        }

        self.phase = LifecyclePhase::Off;
        info!("tear-down finished with {} stage failure(s)", report.len());
        report
    }

    fn stage(&self, stage: Stage, result: Result<(), StackError>) -> Result<(), StageError> {
        result.map_err(|cause| {
            error!("bring-up stage {:?} failed: {:?}", stage, cause);
            StageError { stage, cause }
        })
    }

    fn attempt(report: &mut ShutdownReport, stage: ShutdownStage, result: Result<(), StackError>) {
        match result {
            Ok(()) => debug!("tear-down stage {:?} done", stage),
            Err(cause) => {
                warn!("tear-down stage {:?} failed: {:?}", stage, cause);
                report.push(ShutdownStageError { stage, cause }).ok();
            }
        }
    }
}
