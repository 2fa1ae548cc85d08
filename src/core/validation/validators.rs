//! Reusable field validators
//!
//! Each validator receives the field name and its (already coerced) value and
//! returns the schema's message on failure. Messages may contain `{VALUE}`,
//! replaced by the offending value. Validators ignore values of a kind they do
//! not check; the schema's type coercion catches those.

use crate::core::document::display_value;
use serde_json::Value;
use validator::ValidateEmail;

fn render(message: &str, value: &Value) -> String {
    message.replace("{VALUE}", &display_value(value))
}

/// Validator: string must have at least `min` characters
pub fn min_length(
    min: usize,
    message: impl Into<String>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    let message = message.into();
    move |_: &str, value: &Value| match value.as_str() {
        Some(s) if s.chars().count() < min => Err(render(&message, value)),
        _ => Ok(()),
    }
}

/// Validator: string must have at most `max` characters
pub fn max_length(
    max: usize,
    message: impl Into<String>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    let message = message.into();
    move |_: &str, value: &Value| match value.as_str() {
        Some(s) if s.chars().count() > max => Err(render(&message, value)),
        _ => Ok(()),
    }
}

/// Validator: number must be at least `min`
pub fn min_value(
    min: f64,
    message: impl Into<String>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    let message = message.into();
    move |_: &str, value: &Value| match value.as_f64() {
        Some(num) if num < min => Err(render(&message, value)),
        _ => Ok(()),
    }
}

/// Validator: number must not exceed `max`
pub fn max_value(
    max: f64,
    message: impl Into<String>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    let message = message.into();
    move |_: &str, value: &Value| match value.as_f64() {
        Some(num) if num > max => Err(render(&message, value)),
        _ => Ok(()),
    }
}

/// Validator: value must be in allowed list
pub fn in_list<S: AsRef<str>>(
    allowed: &[S],
    message: impl Into<String>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    let allowed: Vec<String> = allowed.iter().map(|s| s.as_ref().to_string()).collect();
    let message = message.into();
    move |_: &str, value: &Value| match value.as_str() {
        Some(s) if !allowed.iter().any(|a| a == s) => Err(render(&message, value)),
        _ => Ok(()),
    }
}

/// Validator: string must be a well-formed email address
pub fn email(
    message: impl Into<String>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    let message = message.into();
    move |_: &str, value: &Value| match value.as_str() {
        Some(s) if !s.validate_email() => Err(render(&message, value)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_min_length() {
        let v = min_length(10, "A tour name must have more or equal then 10 characters");
        assert_eq!(
            v("name", &json!("Short")).unwrap_err(),
            "A tour name must have more or equal then 10 characters"
        );
        assert!(v("name", &json!("Long enough name")).is_ok());
        assert!(v("name", &json!(42)).is_ok());
    }

    #[test]
    fn test_max_length_counts_characters() {
        let v = max_length(3, "too long");
        assert!(v("name", &json!("été")).is_ok());
        assert!(v("name", &json!("abcd")).is_err());
    }

    #[test]
    fn test_value_bounds() {
        let min = min_value(1.0, "Rating must be above 1.0");
        let max = max_value(5.0, "Rating must be below 5.0");
        assert!(min("rating", &json!(0.5)).is_err());
        assert!(min("rating", &json!(1)).is_ok());
        assert!(max("rating", &json!(5)).is_ok());
        assert_eq!(max("rating", &json!(6)).unwrap_err(), "Rating must be below 5.0");
        assert!(max("rating", &json!("6")).is_ok());
    }

    #[test]
    fn test_in_list() {
        let v = in_list(
            &["easy", "medium", "difficult"],
            "Difficulty is either: easy, medium, difficult",
        );
        assert!(v("difficulty", &json!("easy")).is_ok());
        assert!(v("difficulty", &json!("insane")).is_err());
        assert!(v("difficulty", &json!(null)).is_ok());
    }

    #[test]
    fn test_in_list_empty_list_rejects_strings() {
        let v = in_list::<&str>(&[], "nope");
        assert!(v("status", &json!("anything")).is_err());
    }

    #[test]
    fn test_email() {
        let v = email("Please provide a valid email");
        assert!(v("email", &json!("jonas@example.io")).is_ok());
        assert!(v("email", &json!("not-an-email")).is_err());
    }

    #[test]
    fn test_value_placeholder() {
        let v = max_value(100.0, "Value ({VALUE}) is too high");
        assert_eq!(v("x", &json!(250)).unwrap_err(), "Value (250) is too high");
    }
}
