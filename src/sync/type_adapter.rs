//! Normalizes upstream JSON values into typed column values
//! (SPEC_FULL.md §4.1). Every function here is total: unknown shapes are
//! coerced to a sane default rather than raising an error, matching the
//! "unknown field -> log and skip, never throw" error policy.

use serde_json::Value;
use uuid::Uuid;

/// Coerces `Null`, a number, a numeric string, or an already-long value into
/// a 64-bit signed integer.
///
/// Rules: `Null` or an empty string maps to `0`; a non-empty string is
/// parsed as base-10; a JSON number is cast directly. A value that doesn't
/// fit in `i64`, or a non-numeric string, also maps to `0` rather than
/// panicking — overflow is unsupported, not fatal (SPEC_FULL.md §4.1).
pub fn to_long(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) if s.is_empty() => 0,
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        Value::Bool(b) => *b as i64,
        _ => 0,
    }
}

/// Maps an ordered list of `(name, value)` tags into a deduplicated,
/// canonically-sorted set of 2-tuples — the nearest Postgres analogue of a
/// Cassandra `frozen<set<tuple<text,text>>>` column. Empty input yields an
/// empty `Vec`, never a single-element sentinel.
pub fn tag_set(tags: &[(String, String)]) -> Vec<(String, String)> {
    let mut set: Vec<(String, String)> = tags.to_vec();
    set.sort();
    set.dedup();
    set
}

/// Produces a time-based (v1) UUID from a unix-seconds timestamp, used as a
/// sortable cluster key in `block_gql_asc`/`block_gql_desc`.
pub fn time_uuid(unix_seconds: i64) -> Uuid {
    let millis = unix_seconds.saturating_mul(1000).max(0) as u64;
    let secs = millis / 1000;
    let nanos = ((millis % 1000) * 1_000_000) as u32;
    let ts = uuid::Timestamp::from_unix(uuid::Context::new(0), secs, nanos);
    // The v1 node id is a fixed, non-identifying 6-byte value: this system
    // never needs global cluster-node uniqueness, only monotonic ordering.
    Uuid::new_v1(ts, &[0u8; 6])
}

/// Recovers the unix-seconds timestamp embedded in a time-based UUID, for
/// the Query Builder's `since` filter (SPEC_FULL.md §4.7).
pub fn unix_seconds_from_time_uuid(id: Uuid) -> Option<i64> {
    let (secs, nanos) = id.get_timestamp()?.to_unix();
    Some(secs as i64 + (nanos as i64 / 1_000_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn to_long_null_and_empty_string_are_zero() {
        assert_eq!(to_long(&Value::Null), 0);
        assert_eq!(to_long(&json!("")), 0);
    }

    #[test]
    fn to_long_parses_decimal_strings() {
        assert_eq!(to_long(&json!("12345678901234")), 12345678901234);
    }

    #[test]
    fn to_long_casts_numbers_directly() {
        assert_eq!(to_long(&json!(42)), 42);
    }

    #[test]
    fn to_long_non_numeric_string_is_zero() {
        assert_eq!(to_long(&json!("not-a-number")), 0);
    }

    #[test]
    fn to_long_round_trips_through_its_own_string_form() {
        for x in [0i64, 1, -7, 9_999_999_999] {
            let adapted = to_long(&json!(x));
            let round_tripped = to_long(&json!(adapted.to_string()));
            assert_eq!(adapted, round_tripped);
        }
    }

    #[test]
    fn tag_set_dedupes_and_sorts() {
        let tags = vec![
            ("App".to_string(), "X".to_string()),
            ("Type".to_string(), "tx".to_string()),
            ("App".to_string(), "X".to_string()),
        ];
        let set = tag_set(&tags);
        assert_eq!(
            set,
            vec![
                ("App".to_string(), "X".to_string()),
                ("Type".to_string(), "tx".to_string()),
            ]
        );
    }

    #[test]
    fn tag_set_empty_input_is_empty_output() {
        assert!(tag_set(&[]).is_empty());
    }

    #[test]
    fn time_uuid_is_sortable_by_timestamp() {
        let earlier = time_uuid(1_700_000_000);
        let later = time_uuid(1_700_000_100);
        let earlier_secs = earlier.get_timestamp().unwrap().to_unix().0;
        let later_secs = later.get_timestamp().unwrap().to_unix().0;
        assert!(earlier_secs < later_secs);
    }

    #[test]
    fn time_uuid_round_trips_to_unix_seconds() {
        let ts = 1_704_067_200; // 2024-01-01T00:00:00Z
        let id = time_uuid(ts);
        assert_eq!(unix_seconds_from_time_uuid(id), Some(ts));
    }
}
