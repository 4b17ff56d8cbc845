//! Security/Pairing Callback
//!
//! Reacts to authentication and pairing-confirmation events raised by the
//! protocol layer after the GAP security callbacks have been registered
//! during negotiation. The handler applies [`SecurityPolicy`] and never
//! initiates protocol traffic of its own beyond the confirmation reply.

use crate::PeerAddress;
use crate::negotiation::GapOps;

/// Input/output capability advertised for secure simple pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoCapability {
    /// Display only, no input
    DisplayOnly,
    /// Display plus yes/no input
    DisplayYesNo,
    /// Keyboard only, no display
    KeyboardOnly,
    /// Neither input nor output
    NoInputNoOutput,
}

/// Pairing policy, applied once to the protocol layer at bring-up time
///
/// The default auto-confirms numeric-comparison pairing requests. That is a
/// policy choice inherited from the reference sink application, not a
/// protocol requirement: it lets any nearby device pair without user
/// interaction and should be reviewed before shipping a product build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecurityPolicy {
    /// IO capability advertised during secure simple pairing
    pub io_capability: IoCapability,
    /// Automatically accept numeric-comparison confirmation requests
    pub auto_confirm: bool,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            io_capability: IoCapability::DisplayYesNo,
            auto_confirm: true,
        }
    }
}

/// Authentication and pairing events raised by the protocol layer
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityEvent {
    /// Authentication with a peer finished
    AuthenticationComplete {
        /// Peer device address
        peer: PeerAddress,
        /// Peer display name, null-padded
        name: [u8; 32],
        /// Whether authentication succeeded
        success: bool,
    },
    /// Numeric-comparison pairing confirmation requested
    ConfirmationRequest {
        /// Peer device address
        peer: PeerAddress,
        /// Numeric value presented on both devices
        numeric_value: u32,
    },
    /// Passkey to show to the user
    PasskeyNotification {
        /// Peer device address
        peer: PeerAddress,
        /// Passkey to display
        passkey: u32,
    },
    /// Peer requests passkey entry
    PasskeyRequest {
        /// Peer device address
        peer: PeerAddress,
    },
    /// Any other event, kept for diagnosis
    Other {
        /// Raw event identifier
        id: u8,
    },
}

/// Applies [`SecurityPolicy`] to incoming pairing events
pub struct SecurityHandler<'d, G: GapOps> {
    gap: &'d G,
    policy: SecurityPolicy,
}

impl<'d, G: GapOps> SecurityHandler<'d, G> {
    /// Create a handler over the platform's GAP layer
    #[must_use]
    pub fn new(gap: &'d G, policy: SecurityPolicy) -> Self {
        Self { gap, policy }
    }

    /// The policy this handler applies
    #[must_use]
    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// React to one security event
    ///
    /// Confirmation requests are answered affirmatively when the policy's
    /// `auto_confirm` is set; everything else is logged only.
    pub fn handle_event(&self, event: &SecurityEvent) {
        match *event {
            SecurityEvent::AuthenticationComplete { peer, name, success } => {
                if success {
                    info!("authentication success: {:?} {:?}", peer, name);
                } else {
                    error!("authentication failed, peer: {:?}", peer);
                }
            }
            SecurityEvent::ConfirmationRequest {
                peer,
                numeric_value,
            } => {
                info!(
                    "pairing confirmation requested, compare numeric value: {}",
                    numeric_value
                );
                if self.policy.auto_confirm {
                    if let Err(cause) = self.gap.confirm_pairing(peer, true) {
                        error!("pairing confirmation reply failed: {:?}", cause);
                    }
                } else {
                    info!("auto-confirm disabled, awaiting user confirmation");
                }
            }
            SecurityEvent::PasskeyNotification { peer, passkey } => {
                info!("passkey for {:?}: {}", peer, passkey);
            }
            SecurityEvent::PasskeyRequest { peer } => {
                info!("passkey entry requested by {:?}", peer);
            }
            SecurityEvent::Other { id } => {
                info!("unhandled security event: {}", id);
            }
        }
    }
}
