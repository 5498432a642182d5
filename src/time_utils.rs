use chrono::{DateTime, Utc};

/// Current timestamp in UTC.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp as RFC 3339 for journals and snapshots.
pub fn to_disk(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse an RFC 3339 timestamp read back from disk.
pub fn from_disk(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    s.parse::<DateTime<Utc>>()
}

/// Seconds elapsed between `earlier` and `later` (negative if out of order).
pub fn secs_between(earlier: &DateTime<Utc>, later: &DateTime<Utc>) -> i64 {
    (*later - *earlier).num_seconds()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dt = now();
        let s = to_disk(&dt);
        let parsed = from_disk(&s).unwrap();
        assert_eq!(dt.timestamp(), parsed.timestamp());
    }

    #[test]
    fn test_secs_between() {
        let a = now();
        let b = a + chrono::Duration::seconds(90);
        assert_eq!(secs_between(&a, &b), 90);
        assert_eq!(secs_between(&b, &a), -90);
    }
}
