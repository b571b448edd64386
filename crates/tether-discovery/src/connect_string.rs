//! Shareable connect command.
//!
//! A host hands out a `+connect` command the peer can paste into their
//! console or receive through an invite; the same string arrives as a
//! launch command when the game is started through an invite, so the
//! parser accepts it embedded anywhere in a command line.

use tether_transport::IdentityToken;

/// Console/launch token that introduces a join request.
pub const CONNECT_COMMAND: &str = "+connect";

/// A parsed join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Identity to connect to.
    pub target: IdentityToken,
    /// Password to present, when the host shared one.
    pub password: Option<String>,
}

/// Render the shareable connect command for `target`, appending the
/// password when the host's admission mode requires one.
#[must_use]
pub fn format_connect_command(target: &IdentityToken, password: Option<&str>) -> String {
    match password {
        Some(password) => format!("{CONNECT_COMMAND} {target} {password}"),
        None => format!("{CONNECT_COMMAND} {target}"),
    }
}

/// Find a `+connect` request anywhere in a command line.
///
/// Returns `None` when the line carries no join request. A token
/// following the identity is taken as the password unless it starts
/// another option.
#[must_use]
pub fn parse_join_request(command_line: &str) -> Option<ConnectRequest> {
    let mut words = command_line.split_whitespace().peekable();
    while let Some(word) = words.next() {
        if word != CONNECT_COMMAND {
            continue;
        }
        let target = words.next()?;
        if target.starts_with('+') || target.starts_with('-') {
            return None;
        }
        let password = words
            .peek()
            .filter(|next| !next.starts_with('+') && !next.starts_with('-'))
            .map(|next| (*next).to_string());
        return Some(ConnectRequest {
            target: IdentityToken::new(target),
            password,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_without_password() {
        let cmd = format_connect_command(&IdentityToken::new("76561198000001"), None);
        assert_eq!(cmd, "+connect 76561198000001");
    }

    #[test]
    fn test_format_with_password() {
        let cmd = format_connect_command(&IdentityToken::new("76561198000001"), Some("abc123"));
        assert_eq!(cmd, "+connect 76561198000001 abc123");
    }

    #[test]
    fn test_parse_roundtrip() {
        let target = IdentityToken::new("host-id");
        let cmd = format_connect_command(&target, Some("s3cret"));
        let request = parse_join_request(&cmd).unwrap();
        assert_eq!(request.target, target);
        assert_eq!(request.password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_parse_embedded_in_launch_command() {
        let request =
            parse_join_request("-novid -w 1920 +connect host-id abc123 +map de_dust2").unwrap();
        assert_eq!(request.target, IdentityToken::new("host-id"));
        assert_eq!(request.password.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_parse_without_password_before_next_option() {
        let request = parse_join_request("+connect host-id +map de_dust2").unwrap();
        assert_eq!(request.password, None);
    }

    #[test]
    fn test_parse_rejects_missing_target() {
        assert_eq!(parse_join_request("+connect"), None);
        assert_eq!(parse_join_request("+connect +map de_dust2"), None);
        assert_eq!(parse_join_request("echo hello"), None);
    }
}
