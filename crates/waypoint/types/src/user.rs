//! Directory user record

use crate::UserId;
use serde::{Deserialize, Serialize};

/// A user as resolved by the directory service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl UserRecord {
    pub fn new(id: UserId, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: email.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Case-insensitive email comparison, Unicode-aware like `LOWER()`
    pub fn has_email(&self, email: &str) -> bool {
        emails_match(&self.email, email)
    }
}

/// Compare two addresses after trimming and Unicode lowercasing
pub fn emails_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_email_folds_non_ascii_case() {
        let user = UserRecord::new(UserId::new("zoe"), "zoe", "ZOË@Example.com");
        assert!(user.has_email("zoë@example.com"));
        assert!(user.has_email("  zoë@EXAMPLE.com "));
        assert!(!user.has_email("zoe@example.com"));
    }
}
