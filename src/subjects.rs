// Subject naming for the JetStream binding.
// A topic becomes the subject prefix and the partition key the last token:
//   truck-telemetry.TRK-001
// so per-key ordering follows the stream's per-subject ordering.

/// Header carrying the exact, unsanitised partition key.
pub const KEY_HEADER: &str = "Truck-Key";

/// Replaces characters NATS does not allow inside a subject token.
pub fn token(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | '/' | '\\' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

pub fn for_key(topic: &str, key: &str) -> String {
    format!("{}.{}", token(topic), token(key))
}

/// Subscription pattern covering every key of `topic`.
pub fn wildcard(topic: &str) -> String {
    format!("{}.>", token(topic))
}

/// Last token of a subject, i.e. the (sanitised) partition key.
pub fn key_token(subject: &str) -> Option<&str> {
    subject.rsplit_once('.').map(|(_, key)| key)
}

pub fn stream_name(topic: &str) -> String {
    token(topic).to_uppercase()
}

pub fn durable_name(group: &str) -> String {
    token(group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_for_key() {
        assert_eq!(for_key("truck-telemetry", "TRK-001"), "truck-telemetry.TRK-001");
        assert_eq!(for_key("truck-telemetry", "fleet.7 *north>"), "truck-telemetry.fleet_7__north_");
        assert_eq!(for_key("truck-telemetry", ""), "truck-telemetry._");
    }

    #[test]
    fn test_key_token_roundtrip() {
        let subject = for_key("truck-telemetry", "TRK-001");
        assert_eq!(key_token(&subject), Some("TRK-001"));
        assert_eq!(key_token("no-dots"), None);
    }

    #[test]
    fn test_stream_and_durable_names() {
        assert_eq!(stream_name("truck-telemetry"), "TRUCK-TELEMETRY");
        assert_eq!(wildcard("eda-topic"), "eda-topic.>");
        assert_eq!(durable_name("truck consumer.group"), "truck_consumer_group");
    }
}
