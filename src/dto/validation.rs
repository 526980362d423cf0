//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a display handle is non-blank and at most 64 characters.
pub fn validate_handle(handle: &str) -> Result<(), ValidationError> {
    if handle.trim().is_empty() {
        let mut err = ValidationError::new("handle_blank");
        err.message = Some("Handle must not be blank".into());
        return Err(err);
    }

    if handle.chars().count() > 64 {
        let mut err = ValidationError::new("handle_length");
        err.message = Some(
            format!(
                "Handle must be at most 64 characters (got {})",
                handle.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates relayed chat content against the configured length ceiling.
pub fn validate_chat_content(content: &str, max_chars: usize) -> Result<(), ValidationError> {
    if content.is_empty() {
        let mut err = ValidationError::new("chat_empty");
        err.message = Some("Chat message content must not be empty".into());
        return Err(err);
    }

    if content.chars().count() > max_chars {
        let mut err = ValidationError::new("chat_length");
        err.message = Some(
            format!(
                "Chat message exceeds {} characters (got {})",
                max_chars,
                content.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_handle_valid() {
        assert!(validate_handle("gull").is_ok());
        assert!(validate_handle("User_AB12CD").is_ok());
    }

    #[test]
    fn test_validate_handle_invalid() {
        assert!(validate_handle("").is_err());
        assert!(validate_handle("   ").is_err());
        assert!(validate_handle(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_chat_content() {
        assert!(validate_chat_content("hello", 10).is_ok());
        assert!(validate_chat_content("", 10).is_err());
        assert!(validate_chat_content("0123456789a", 10).is_err());
    }
}
