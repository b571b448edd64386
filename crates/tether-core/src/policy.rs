//! Join filter and admission policy.
//!
//! The host's filter decides what happens to an inbound connection
//! attempt before any game data flows. The decision is pure: filter
//! setting and friend relationship in, verdict out. Capacity is
//! checked separately by the registry because it depends on live
//! connection counts, not policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use tether_transport::CloseReason;

/// Host-side admission filter. Takes effect on the next inbound
/// attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinFilter {
    /// Accept nobody.
    #[default]
    Off,
    /// Accept whoever proves knowledge of the current password.
    Controlled,
    /// Accept friends of the local user.
    Friends,
    /// Accept anybody.
    Everyone,
}

impl fmt::Display for JoinFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Controlled => "controlled",
            Self::Friends => "friends",
            Self::Everyone => "everyone",
        };
        f.write_str(name)
    }
}

/// Error for unrecognized filter names.
#[derive(Debug, thiserror::Error)]
#[error("unrecognized join filter: {0:?} (expected off, controlled, friends or everyone)")]
pub struct ParseFilterError(String);

impl FromStr for JoinFilter {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "controlled" => Ok(Self::Controlled),
            "friends" => Ok(Self::Friends),
            "everyone" => Ok(Self::Everyone),
            other => Err(ParseFilterError(other.to_string())),
        }
    }
}

/// Verdict for one inbound connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Let the connection through and start relaying.
    Accept,
    /// Accept the transport-level connection but demand the password
    /// before any game data.
    Challenge,
    /// Refuse, reporting `CloseReason` to the remote.
    Reject(CloseReason),
}

/// Decide what to do with an inbound attempt under `filter`, given the
/// identity provider's answer about the claimed identity.
#[must_use]
pub fn evaluate(filter: JoinFilter, is_friend: bool) -> Admission {
    match filter {
        JoinFilter::Off => Admission::Reject(CloseReason::NotOpen),
        JoinFilter::Everyone => Admission::Accept,
        JoinFilter::Friends => {
            if is_friend {
                Admission::Accept
            } else {
                Admission::Reject(CloseReason::NotFriend)
            }
        }
        JoinFilter::Controlled => Admission::Challenge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_table() {
        for is_friend in [false, true] {
            assert_eq!(
                evaluate(JoinFilter::Off, is_friend),
                Admission::Reject(CloseReason::NotOpen)
            );
            assert_eq!(evaluate(JoinFilter::Everyone, is_friend), Admission::Accept);
            assert_eq!(
                evaluate(JoinFilter::Controlled, is_friend),
                Admission::Challenge
            );
        }
        assert_eq!(evaluate(JoinFilter::Friends, true), Admission::Accept);
        assert_eq!(
            evaluate(JoinFilter::Friends, false),
            Admission::Reject(CloseReason::NotFriend)
        );
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("off".parse::<JoinFilter>().unwrap(), JoinFilter::Off);
        assert_eq!(
            "Controlled".parse::<JoinFilter>().unwrap(),
            JoinFilter::Controlled
        );
        assert_eq!(
            "FRIENDS".parse::<JoinFilter>().unwrap(),
            JoinFilter::Friends
        );
        assert_eq!(
            "everyone".parse::<JoinFilter>().unwrap(),
            JoinFilter::Everyone
        );
        assert!("open".parse::<JoinFilter>().is_err());
    }

    #[test]
    fn test_filter_display_roundtrip() {
        for filter in [
            JoinFilter::Off,
            JoinFilter::Controlled,
            JoinFilter::Friends,
            JoinFilter::Everyone,
        ] {
            assert_eq!(filter.to_string().parse::<JoinFilter>().unwrap(), filter);
        }
    }
}
