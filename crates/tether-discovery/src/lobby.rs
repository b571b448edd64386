//! Pluggable discovery strategies.
//!
//! Two ways to learn which identity to connect to: a pasted connect
//! string, or membership in a shared lobby whose owner is the host.
//! Either way the result is just a [`ConnectRequest`]; the relay and
//! handshake logic never see where it came from.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tether_transport::IdentityToken;

use crate::connect_string::{ConnectRequest, parse_join_request};

/// Identifier of a shared lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LobbyId(pub u64);

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lobby#{}", self.0)
    }
}

/// Discovery errors.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The target string does not name anything connectable.
    #[error("cannot resolve join target: {0:?}")]
    Unresolvable(String),

    /// The local user is not a member of the named lobby.
    #[error("not a member of {0}")]
    NotAMember(LobbyId),
}

/// A way to turn a user-supplied join target into a connect request.
pub trait DiscoveryStrategy: Send + Sync {
    /// Resolve `target` to an identity (plus optional password).
    ///
    /// # Errors
    /// Fails when the target cannot be resolved by this strategy.
    fn resolve(&self, target: &str) -> Result<ConnectRequest, DiscoveryError>;
}

/// Direct strategy: the target is a `+connect` command or a bare
/// identity token.
pub struct DirectConnect;

impl DiscoveryStrategy for DirectConnect {
    fn resolve(&self, target: &str) -> Result<ConnectRequest, DiscoveryError> {
        if let Some(request) = parse_join_request(target) {
            return Ok(request);
        }
        let mut words = target.split_whitespace();
        match (words.next(), words.next()) {
            (Some(identity), password) if !identity.starts_with('+') => Ok(ConnectRequest {
                target: IdentityToken::new(identity),
                password: password.map(str::to_string),
            }),
            _ => Err(DiscoveryError::Unresolvable(target.to_string())),
        }
    }
}

/// Lobby membership capability.
///
/// Backed by the platform's matchmaking service in production;
/// [`MemoryLobbies`] stands in for tests and the loopback demo.
pub trait LobbyDirectory: Send + Sync {
    /// Owner (= host) of the lobby, if it exists.
    fn owner(&self, lobby: LobbyId) -> Option<IdentityToken>;

    /// Current members of the lobby.
    fn members(&self, lobby: LobbyId) -> Vec<IdentityToken>;

    /// Whether `user` is currently in the lobby.
    fn is_member(&self, lobby: LobbyId, user: &IdentityToken) -> bool {
        self.members(lobby).iter().any(|member| member == user)
    }
}

/// In-process lobby directory.
#[derive(Default)]
pub struct MemoryLobbies {
    lobbies: Mutex<HashMap<LobbyId, Vec<IdentityToken>>>,
}

impl MemoryLobbies {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a lobby owned by `owner` (the first member).
    pub fn create(&self, lobby: LobbyId, owner: impl Into<IdentityToken>) {
        self.lobbies
            .lock()
            .expect("lobby lock poisoned")
            .insert(lobby, vec![owner.into()]);
    }

    /// Add a member to an existing lobby.
    pub fn join(&self, lobby: LobbyId, user: impl Into<IdentityToken>) {
        if let Some(members) = self
            .lobbies
            .lock()
            .expect("lobby lock poisoned")
            .get_mut(&lobby)
        {
            members.push(user.into());
        }
    }
}

impl LobbyDirectory for MemoryLobbies {
    fn owner(&self, lobby: LobbyId) -> Option<IdentityToken> {
        self.lobbies
            .lock()
            .expect("lobby lock poisoned")
            .get(&lobby)
            .and_then(|members| members.first().cloned())
    }

    fn members(&self, lobby: LobbyId) -> Vec<IdentityToken> {
        self.lobbies
            .lock()
            .expect("lobby lock poisoned")
            .get(&lobby)
            .cloned()
            .unwrap_or_default()
    }
}

/// Lobby strategy: the target is a lobby id; the lobby's owner is the
/// identity to connect to. The local user must already be a member.
pub struct LobbyDiscovery {
    directory: Arc<dyn LobbyDirectory>,
    local: IdentityToken,
}

impl LobbyDiscovery {
    /// Create the strategy for `local`, querying `directory`.
    pub fn new(directory: Arc<dyn LobbyDirectory>, local: impl Into<IdentityToken>) -> Self {
        Self {
            directory,
            local: local.into(),
        }
    }
}

impl DiscoveryStrategy for LobbyDiscovery {
    fn resolve(&self, target: &str) -> Result<ConnectRequest, DiscoveryError> {
        let id: u64 = target
            .trim()
            .parse()
            .map_err(|_| DiscoveryError::Unresolvable(target.to_string()))?;
        let lobby = LobbyId(id);
        let owner = self
            .directory
            .owner(lobby)
            .ok_or_else(|| DiscoveryError::Unresolvable(target.to_string()))?;
        if !self.directory.is_member(lobby, &self.local) {
            return Err(DiscoveryError::NotAMember(lobby));
        }
        Ok(ConnectRequest {
            target: owner,
            password: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_connect_resolves_command_and_bare_token() {
        let strategy = DirectConnect;
        let request = strategy.resolve("+connect host-id abc123").unwrap();
        assert_eq!(request.target, IdentityToken::new("host-id"));
        assert_eq!(request.password.as_deref(), Some("abc123"));

        let request = strategy.resolve("host-id").unwrap();
        assert_eq!(request.target, IdentityToken::new("host-id"));
        assert_eq!(request.password, None);
    }

    #[test]
    fn test_lobby_discovery_resolves_owner() {
        let lobbies = Arc::new(MemoryLobbies::new());
        lobbies.create(LobbyId(42), "host-id");
        lobbies.join(LobbyId(42), "joiner");

        let strategy = LobbyDiscovery::new(lobbies, "joiner");
        let request = strategy.resolve("42").unwrap();
        assert_eq!(request.target, IdentityToken::new("host-id"));
        assert_eq!(request.password, None);
    }

    #[test]
    fn test_lobby_discovery_requires_membership() {
        let lobbies = Arc::new(MemoryLobbies::new());
        lobbies.create(LobbyId(42), "host-id");

        let strategy = LobbyDiscovery::new(lobbies, "outsider");
        assert!(matches!(
            strategy.resolve("42"),
            Err(DiscoveryError::NotAMember(LobbyId(42)))
        ));
    }

    #[test]
    fn test_lobby_discovery_unknown_lobby() {
        let lobbies = Arc::new(MemoryLobbies::new());
        let strategy = LobbyDiscovery::new(lobbies, "joiner");
        assert!(matches!(
            strategy.resolve("7"),
            Err(DiscoveryError::Unresolvable(_))
        ));
    }
}
