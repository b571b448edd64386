//! Identity and friends capability.
//!
//! The connection registry needs two answers from the platform's
//! identity service: who am I, and is this claimed identity a friend
//! of mine. Production backends wrap the platform SDK; tests and the
//! loopback demo use [`StaticRoster`].

use std::collections::HashSet;

use tether_transport::IdentityToken;

/// Identity service capability.
pub trait IdentityProvider: Send + Sync {
    /// The local user's identity on the relay network.
    fn local_identity(&self) -> IdentityToken;

    /// Whether `identity` is on the local user's friends list.
    fn is_friend(&self, identity: &IdentityToken) -> bool;
}

/// Fixed identity with a fixed friends list.
pub struct StaticRoster {
    identity: IdentityToken,
    friends: HashSet<IdentityToken>,
}

impl StaticRoster {
    /// Create a roster for `identity` with no friends.
    pub fn new(identity: impl Into<IdentityToken>) -> Self {
        Self {
            identity: identity.into(),
            friends: HashSet::new(),
        }
    }

    /// Add a friend and return the roster, builder-style.
    #[must_use]
    pub fn with_friend(mut self, friend: impl Into<IdentityToken>) -> Self {
        self.friends.insert(friend.into());
        self
    }
}

impl IdentityProvider for StaticRoster {
    fn local_identity(&self) -> IdentityToken {
        self.identity.clone()
    }

    fn is_friend(&self, identity: &IdentityToken) -> bool {
        self.friends.contains(identity)
    }
}
