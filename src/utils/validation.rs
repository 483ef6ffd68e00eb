//! Input validation utilities

use validator::ValidateEmail;

/// Validate an email address
pub fn validate_email(email: &str) -> bool {
    !email.is_empty() && email.len() <= 254 && email.validate_email()
}

/// Validate a workspace slug: lowercase alphanumeric runs joined by single dashes
pub fn validate_slug(slug: &str) -> bool {
    if slug.is_empty() || slug.len() > 100 {
        return false;
    }

    slug.split('-').all(|part| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    })
}

/// Validate an audit event type such as `membership.role_updated`
pub fn validate_event_type(event_type: &str) -> bool {
    if event_type.is_empty() || event_type.len() > 100 {
        return false;
    }

    event_type.split('.').all(|part| {
        !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Validate a notification type or channel: ASCII alphanumerics, `_` and `-`
pub fn validate_notification_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 100
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
