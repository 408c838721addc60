use rand::RngCore;

/// Length of an encoded object id.
pub const OBJECT_ID_LEN: usize = 24;

/// Generate a new 24-character hex object id.
///
/// Layout: 4-byte big-endian unix seconds followed by 8 random bytes, so ids
/// sort roughly by creation time.
pub fn new_object_id() -> String {
    let mut bytes = [0u8; 12];
    let secs = chrono::Utc::now().timestamp() as u32;
    bytes[..4].copy_from_slice(&secs.to_be_bytes());
    rand::rng().fill_bytes(&mut bytes[4..]);
    hex::encode(bytes)
}

/// True if `value` is a well-formed object id (24 hex characters).
pub fn is_object_id(value: &str) -> bool {
    value.len() == OBJECT_ID_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_well_formed_and_unique() {
        let a = new_object_id();
        let b = new_object_id();
        assert!(is_object_id(&a));
        assert!(is_object_id(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!is_object_id("abc"));
        assert!(!is_object_id("zzzzzzzzzzzzzzzzzzzzzzzz"));
        assert!(!is_object_id("0123456789abcdef012345678"));
        assert!(is_object_id("0123456789ABCDEF01234567"));
    }
}
