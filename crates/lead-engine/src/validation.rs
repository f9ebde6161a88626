//! Input validation rules shared by the request payloads

use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

use crate::types::CreateServiceRequest;

// Digits with optional leading +, spaces, dashes, dots and parentheses
static PHONE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9 ().-]{7,20}$").expect("phone pattern is valid"));

const MAX_NOTES_LEN: usize = 500;

/// Reject values that are empty once trimmed
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank"))
    } else {
        Ok(())
    }
}

/// Validate a client phone number
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if PHONE_REGEX.is_match(phone) && digits >= 7 {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_phone"))
    }
}

/// `budget_min` may not exceed `budget_max` when both are given
pub fn validate_budget_range(request: &CreateServiceRequest) -> Result<(), ValidationError> {
    match (request.budget_min, request.budget_max) {
        (Some(min), Some(max)) if min > max => Err(ValidationError::new("budget_min_exceeds_max")),
        _ => Ok(()),
    }
}

/// Trim free-text review notes and drop empty ones
pub fn normalize_notes(notes: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if notes.chars().count() > MAX_NOTES_LEN {
        return Err(ValidationError::new("notes_too_long"));
    }
    Ok(Some(notes.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Urgency;
    use validator::Validate;

    fn request() -> CreateServiceRequest {
        CreateServiceRequest {
            client_name: "Marcus Brown".to_string(),
            client_email: "marcus@example.com".to_string(),
            client_phone: "(876) 555-0199".to_string(),
            request_type: "rent".to_string(),
            property_type: "apartment".to_string(),
            location: "Montego Bay".to_string(),
            budget_min: Some(80_000),
            budget_max: Some(120_000),
            bedrooms: Some(2),
            bathrooms: Some(1),
            description: None,
            urgency: Urgency::High,
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_phone_rules() {
        assert!(validate_phone("+1 876 555 0100").is_ok());
        assert!(validate_phone("876.555.0100").is_ok());
        assert!(validate_phone("call me").is_err());
        assert!(validate_phone("12").is_err());
        assert!(validate_phone("-----------").is_err());
    }

    #[test]
    fn test_inverted_budget_rejected() {
        let mut req = request();
        req.budget_min = Some(200_000);
        req.budget_max = Some(100_000);
        let errors = req.validate().unwrap_err();
        assert!(errors.to_string().contains("budget_min_exceeds_max"));
    }

    #[test]
    fn test_blank_and_malformed_fields_rejected() {
        let mut req = request();
        req.location = "   ".to_string();
        req.client_email = "not-an-email".to_string();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("location"));
        assert!(fields.contains_key("client_email"));
    }

    #[test]
    fn test_negative_budget_and_room_bounds() {
        let mut req = request();
        req.budget_min = Some(-5);
        req.bedrooms = Some(99);
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("budget_min"));
        assert!(fields.contains_key("bedrooms"));
    }

    #[test]
    fn test_normalize_notes() {
        assert_eq!(normalize_notes(None).unwrap(), None);
        assert_eq!(normalize_notes(Some("  ")).unwrap(), None);
        assert_eq!(normalize_notes(Some(" ok ")).unwrap().as_deref(), Some("ok"));
        assert!(normalize_notes(Some(&"x".repeat(501))).is_err());
    }
}
