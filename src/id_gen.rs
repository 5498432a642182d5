use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of a stable content hash id (SHA-256 truncated).
pub const CONTENT_HASH_LEN: usize = 16;

/// Unique id for a percept (UUID v4 hex, 32 chars).
pub fn percept_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Unique id for a thread (UUID v4 hex, 32 chars).
pub fn thread_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Unique id for a trace (UUID v4 hex, 32 chars).
pub fn trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Unique id for an outbound action (UUID v4 hex, 32 chars).
pub fn action_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Stable id derived from content. Used for core seed entries so that
/// re-running the bootstrap never duplicates a trace.
pub fn content_id(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..CONTENT_HASH_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = thread_id();
        let b = thread_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_content_id_stable() {
        let a = content_id("I live in a small terminal window.");
        assert_eq!(a.len(), CONTENT_HASH_LEN);
        assert_eq!(a, content_id("I live in a small terminal window."));
        assert_ne!(a, content_id("something else"));
    }
}
