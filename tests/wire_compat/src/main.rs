fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use serde_json::{Value, json};
    use tether_protocol::constants::{
        ERR_NOT_CONNECTED, REASON_ALREADY_CONNECTED, REASON_HEARTBEAT_TIMEOUT,
    };
    use tether_protocol::{Decoded, Envelope, Kind, Malformed, codec};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture as raw wire text.
    fn load_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap_or_else(|e| panic!("invalid JSON {text}: {e}"))
    }

    /// Decodes a fixture, checks it against `expected`, re-encodes it and
    /// compares the JSON values (key order independent).
    fn roundtrip_test(name: &str, expected: &Envelope) {
        let wire = load_fixture(name);
        let envelope = match codec::decode(&wire) {
            Decoded::Envelope(envelope) => envelope,
            other => panic!("fixture {name} did not decode: {other:?}"),
        };
        assert_eq!(&envelope, expected, "decoded mismatch for {name}");

        let reencoded = codec::encode(envelope).unwrap();
        assert_eq!(
            parse(&wire),
            parse(&reencoded),
            "roundtrip mismatch for {name}:\n  fixture: {wire}\n  encoded: {reencoded}"
        );
    }

    // --- Lifecycle frames ---

    #[test]
    fn fixture_connect() {
        roundtrip_test("connect.json", &Envelope::new(Kind::Connect));
    }

    #[test]
    fn fixture_connected() {
        roundtrip_test("connected.json", &Envelope::new(Kind::Connected));
    }

    #[test]
    fn fixture_heartbeat() {
        roundtrip_test("heartbeat.json", &Envelope::new(Kind::Heartbeat));
    }

    #[test]
    fn fixture_disconnected_reasons() {
        roundtrip_test(
            "disconnected_heartbeat_timeout.json",
            &Envelope::disconnected(REASON_HEARTBEAT_TIMEOUT),
        );
        roundtrip_test(
            "disconnected_already_connected.json",
            &Envelope::disconnected(REASON_ALREADY_CONNECTED),
        );
    }

    #[test]
    fn fixture_error_not_connected() {
        roundtrip_test(
            "error_not_connected.json",
            &Envelope::error(ERR_NOT_CONNECTED),
        );
    }

    // --- Application frames ---

    #[test]
    fn fixture_message_text() {
        roundtrip_test("message_text.json", &Envelope::message("hi"));

        // A bare string sent by the application produces the same frame.
        assert_eq!(
            parse(&codec::encode("hi").unwrap()),
            parse(&load_fixture("message_text.json"))
        );
    }

    #[test]
    fn fixture_message_object() {
        let body = json!({
            "title": "Build finished",
            "tabs": [3, 7],
            "ok": true,
            "elapsed": 12.5
        });
        roundtrip_test("message_object.json", &Envelope::message(body));
    }

    #[test]
    fn fixture_custom_event() {
        let expected =
            Envelope::with_body("tab-updated", &json!({ "url": "https://example.org/", "active": false }))
                .unwrap();
        roundtrip_test("custom_event.json", &expected);
        assert!(!expected.kind.is_reserved());
    }

    // --- Frames that are not ours ---

    #[test]
    fn fixture_foreign_traffic() {
        for name in [
            "foreign_object.json",
            "foreign_array.json",
            "marker_false.json",
            "marker_string.json",
        ] {
            assert_eq!(
                codec::decode(&load_fixture(name)),
                Decoded::NotOurs,
                "{name} should be ignored"
            );
        }
    }

    #[test]
    fn fixture_marked_without_kind() {
        for name in ["missing_kind.json", "numeric_kind.json"] {
            assert_eq!(
                codec::decode(&load_fixture(name)),
                Decoded::Malformed(Malformed::MissingKind),
                "{name} should be malformed"
            );
        }
    }

    #[test]
    fn every_fixture_is_valid_json() {
        let entries = fs::read_dir(fixtures_dir()).unwrap();
        let mut count = 0;
        for entry in entries {
            let path = entry.unwrap().path();
            if path.extension().is_some_and(|ext| ext == "json") {
                parse(&fs::read_to_string(&path).unwrap());
                count += 1;
            }
        }
        assert!(count >= 15, "expected all fixtures, found {count}");
    }
}
