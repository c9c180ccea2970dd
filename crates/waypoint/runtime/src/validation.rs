//! Input normalization shared by the invitation and task managers

use waypoint_types::{CollabError, CollabResult, PageRequest, UserId};

/// Trim and lowercase an email address, rejecting obviously malformed input
pub fn normalize_email(email: &str) -> CollabResult<String> {
    let email = email.trim().to_lowercase();
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !well_formed {
        return Err(CollabError::Validation(format!("invalid email address: {email}")));
    }
    Ok(email)
}

/// Optional free text: trimmed, blank becomes `None`, bounded in characters
pub fn optional_text(
    field: &str,
    value: Option<String>,
    max_len: usize,
) -> CollabResult<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if value.chars().count() > max_len {
        return Err(CollabError::Validation(format!(
            "{field} exceeds {max_len} characters"
        )));
    }
    Ok(Some(value.to_string()))
}

/// Required single-line text such as a task title
pub fn required_text(field: &str, value: &str, max_len: usize) -> CollabResult<String> {
    optional_text(field, Some(value.to_string()), max_len)?
        .ok_or_else(|| CollabError::Validation(format!("{field} must not be empty")))
}

pub fn expiry_days(requested: Option<u32>, default_days: u32, max_days: u32) -> CollabResult<u32> {
    let days = requested.unwrap_or(default_days);
    if days == 0 || days > max_days {
        return Err(CollabError::Validation(format!(
            "expiry must be between 1 and {max_days} days"
        )));
    }
    Ok(days)
}

/// Drop repeated ids, keeping first occurrence order
pub fn dedupe_ids(ids: Vec<UserId>) -> Vec<UserId> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Resolve an optional page selector against configured limits
pub fn page_request(page: Option<PageRequest>, default_limit: u32, max_limit: u32) -> PageRequest {
    page.unwrap_or_else(|| PageRequest::first(default_limit))
        .normalized(max_limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Bob@Example.COM ").unwrap(), "bob@example.com");
        assert!(normalize_email("bob").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("a b@example.com").is_err());
    }

    #[test]
    fn test_optional_text_bounds() {
        assert_eq!(optional_text("message", Some("  ".into()), 10).unwrap(), None);
        assert_eq!(
            optional_text("message", Some(" hi ".into()), 10).unwrap(),
            Some("hi".to_string())
        );
        assert!(matches!(
            optional_text("message", Some("x".repeat(11)), 10),
            Err(CollabError::Validation(_))
        ));
        assert!(required_text("title", "   ", 10).is_err());
    }

    #[test]
    fn test_expiry_days_range() {
        assert_eq!(expiry_days(None, 7, 30).unwrap(), 7);
        assert_eq!(expiry_days(Some(30), 7, 30).unwrap(), 30);
        assert!(expiry_days(Some(0), 7, 30).is_err());
        assert!(expiry_days(Some(31), 7, 30).is_err());
    }

    #[test]
    fn test_dedupe_keeps_order() {
        let ids = vec![UserId::new("b"), UserId::new("a"), UserId::new("b")];
        assert_eq!(dedupe_ids(ids), vec![UserId::new("b"), UserId::new("a")]);
    }

    #[test]
    fn test_page_request_defaults() {
        assert_eq!(page_request(None, 20, 100), PageRequest::new(1, 20));
        assert_eq!(
            page_request(Some(PageRequest::new(0, 1000)), 20, 100),
            PageRequest::new(1, 100)
        );
    }
}
