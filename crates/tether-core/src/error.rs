//! Error taxonomy for connection management.
//!
//! Only setup failures propagate to callers: everything that goes
//! wrong on one relayed connection is reported to the remote through
//! the relay's close reason and contained to that connection.

use tether_transport::TransportError;

use crate::registry::Role;

/// Fatal failures opening the subsystem or changing roles.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The relay transport refused to initialize or listen.
    #[error("relay transport setup failed: {0}")]
    Relay(#[from] TransportError),

    /// A local socket could not be created.
    #[error("local transport setup failed: {0}")]
    Local(#[from] std::io::Error),

    /// The requested operation is not valid in the current role.
    #[error("operation not valid while {0}")]
    InvalidRole(Role),
}
