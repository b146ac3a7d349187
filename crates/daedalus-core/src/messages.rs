//! Model-binding error message templates.
//!
//! Templates use `{0}`, `{1}` placeholders and can be overridden through
//! configuration.

use serde::{Deserialize, Serialize};

/// Message templates recorded in model state by the binders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelBindingMessages {
    /// `{0}` = attempted value, `{1}` = field name.
    pub attempted_value_is_invalid: String,
    /// `{0}` = field name.
    pub missing_bind_required_value: String,
    /// `{0}` = attempted value.
    pub value_must_not_be_null: String,
    /// No placeholders.
    pub missing_request_body_required_value: String,
    /// `{0}` = field name.
    pub unknown_value_is_invalid: String,
    /// `{0}` = field name.
    pub value_must_be_a_number: String,
}

impl Default for ModelBindingMessages {
    fn default() -> Self {
        Self {
            attempted_value_is_invalid: "The value '{0}' is not valid for {1}.".to_string(),
            missing_bind_required_value:
                "A value for the '{0}' parameter or property was not provided.".to_string(),
            value_must_not_be_null: "The value '{0}' is invalid.".to_string(),
            missing_request_body_required_value: "A non-empty request body is required."
                .to_string(),
            unknown_value_is_invalid: "The supplied value is invalid for {0}.".to_string(),
            value_must_be_a_number: "The field {0} must be a number.".to_string(),
        }
    }
}

impl ModelBindingMessages {
    /// The attempted value could not be converted.
    #[must_use]
    pub fn attempted_value_is_invalid(&self, value: &str, field: &str) -> String {
        format_template(&self.attempted_value_is_invalid, &[value, field])
    }

    /// A bind-required value was not supplied.
    #[must_use]
    pub fn missing_bind_required_value(&self, field: &str) -> String {
        format_template(&self.missing_bind_required_value, &[field])
    }

    /// A blank value was supplied for a non-nullable type.
    #[must_use]
    pub fn value_must_not_be_null(&self, value: &str) -> String {
        format_template(&self.value_must_not_be_null, &[value])
    }

    /// The request body was empty.
    #[must_use]
    pub fn missing_request_body_required_value(&self) -> String {
        self.missing_request_body_required_value.clone()
    }

    /// A value was rejected without a displayable attempted value.
    #[must_use]
    pub fn unknown_value_is_invalid(&self, field: &str) -> String {
        format_template(&self.unknown_value_is_invalid, &[field])
    }

    /// A numeric field received a non-numeric value.
    #[must_use]
    pub fn value_must_be_a_number(&self, field: &str) -> String {
        format_template(&self.value_must_be_a_number, &[field])
    }
}

/// Replaces `{n}` placeholders with the matching argument.
#[must_use]
pub fn format_template(template: &str, args: &[&str]) -> String {
    args.iter()
        .enumerate()
        .fold(template.to_string(), |acc, (i, arg)| {
            acc.replace(&format!("{{{i}}}"), arg)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_messages() {
        let messages = ModelBindingMessages::default();
        assert_eq!(
            messages.attempted_value_is_invalid("abc", "age"),
            "The value 'abc' is not valid for age."
        );
        assert_eq!(
            messages.missing_bind_required_value("id"),
            "A value for the 'id' parameter or property was not provided."
        );
    }

    #[test]
    fn test_partial_override_from_json() {
        let messages: ModelBindingMessages =
            serde_json::from_str(r#"{"value_must_not_be_null": "'{0}' cannot be blank"}"#)
                .expect("parse");
        assert_eq!(messages.value_must_not_be_null(""), "'' cannot be blank");
        assert_eq!(
            messages.missing_request_body_required_value(),
            "A non-empty request body is required."
        );
    }
}
