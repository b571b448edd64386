//! Property tests for the pure layers: wire tokens, password
//! matching, relay ordering, connect-command parsing.

use proptest::prelude::*;

use tether_core::password::Password;
use tether_core::wire;
use tether_discovery::{format_connect_command, parse_join_request};
use tether_transport::{IdentityToken, MemoryRelayHub, RelayTransport};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_password_reply_roundtrip(
        password in proptest::collection::vec(any::<u8>(), 0..64)
    ) {
        let reply = wire::password_reply(&password);
        prop_assert_eq!(wire::parse_password_reply(&reply), Some(&password[..]));
    }

    #[test]
    fn prop_password_match_requires_exact_bytes(
        garbage in proptest::collection::vec(any::<u8>(), 0..32)
    ) {
        let password = Password::generate();
        prop_assume!(garbage != password.as_bytes());
        prop_assert!(!password.matches(&garbage));
        prop_assert!(password.matches(password.as_bytes()));
    }

    #[test]
    fn prop_relay_preserves_order_and_bytes(
        payloads in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..512),
            1..32,
        )
    ) {
        let hub = MemoryRelayHub::new();
        let host = hub.endpoint("prop-host");
        let client = hub.endpoint("prop-client");
        host.listen().unwrap();
        let conn = client.connect(&IdentityToken::new("prop-host")).unwrap();
        host.poll_events();
        host.accept(conn).unwrap();

        for payload in &payloads {
            client.send(conn, payload).unwrap();
        }
        for payload in &payloads {
            let received = host.recv(conn).unwrap();
            prop_assert_eq!(received.as_deref(), Some(&payload[..]));
        }
        prop_assert_eq!(host.recv(conn).unwrap(), None);
    }

    #[test]
    fn prop_connect_command_roundtrip(
        token in "[A-Za-z0-9_]{1,24}",
        password in proptest::option::of("[A-Za-z0-9]{1,16}")
    ) {
        let target = IdentityToken::new(token);
        let command = format_connect_command(&target, password.as_deref());
        let parsed = parse_join_request(&command).unwrap();
        prop_assert_eq!(parsed.target, target);
        prop_assert_eq!(parsed.password, password);
    }

    #[test]
    fn prop_byte_swaps_are_involutive(v16 in any::<u16>(), v32 in any::<u32>()) {
        prop_assert_eq!(wire::swap_u16(wire::swap_u16(v16)), v16);
        prop_assert_eq!(wire::swap_u32(wire::swap_u32(v32)), v32);
    }
}
