//! Store key builders for presence rows.
//!
//! The Redis backend prepends its configured prefix; these builders only
//! produce the logical part of the key.

use presence_core::types::id::UserId;

/// Hash field holding the `0`/`1` online flag.
pub const FIELD_ONLINE: &str = "online";

/// Hash field holding the last-seen epoch milliseconds.
pub const FIELD_LAST_SEEN: &str = "last_seen";

/// Logical key of a user's presence hash.
pub fn user_presence(user_id: &UserId) -> String {
    format!("user:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_presence_key() {
        assert_eq!(user_presence(&UserId::new("u1")), "user:u1");
    }
}
