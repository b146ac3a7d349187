//! Validators and the built-in declarative rules.

use daedalus_core::messages::format_template;
use daedalus_core::{ModelMetadata, ModelValue, ValidationRule};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

use crate::error::ValidationError;

/// Input to a validator: one node of the model graph.
#[derive(Debug, Clone, Copy)]
pub struct ModelValidationContext<'a> {
    /// Metadata of the node.
    pub metadata: &'a ModelMetadata,
    /// The object owning the node, for property nodes.
    pub container: Option<&'a ModelValue>,
    /// The node value.
    pub model: &'a ModelValue,
    /// Model-state key of the node.
    pub key: &'a str,
}

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelValidationResult {
    /// Member below the node the error belongs to; empty for the node itself.
    pub member_name: String,
    /// Error message.
    pub message: String,
}

impl ModelValidationResult {
    /// An error on the validated node.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            member_name: String::new(),
            message: message.into(),
        }
    }

    /// An error on a member of the validated node.
    pub fn for_member(member_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            member_name: member_name.into(),
            message: message.into(),
        }
    }
}

/// Checks a single model node.
pub trait ModelValidator: Send + Sync + fmt::Debug {
    /// Returns the failures for the node. An empty list means valid.
    fn validate(&self, ctx: &ModelValidationContext<'_>) -> Vec<ModelValidationResult>;
}

/// A validator backed by a declarative [`ValidationRule`].
///
/// # Example
///
/// ```
/// use daedalus_core::{ModelMetadataProvider, ModelType, ModelValue, ValidationRule};
/// use daedalus_validation::{ModelValidationContext, ModelValidator, RuleValidator};
///
/// let provider = ModelMetadataProvider::default();
/// let metadata = provider.for_type(&ModelType::int());
/// let validator = RuleValidator::new(ValidationRule::range(1.0, 10.0)).unwrap();
///
/// let model = ModelValue::Int(12);
/// let ctx = ModelValidationContext { metadata: &metadata, container: None, model: &model, key: "n" };
/// assert_eq!(validator.validate(&ctx).len(), 1);
/// ```
#[derive(Debug)]
pub struct RuleValidator {
    rule: ValidationRule,
    pattern: Option<Regex>,
}

impl RuleValidator {
    /// Creates a validator, compiling regular expressions up front.
    pub fn new(rule: ValidationRule) -> Result<Self, ValidationError> {
        let pattern = match &rule {
            ValidationRule::RegularExpression(pattern) => {
                let anchored = format!("^(?:{pattern})$");
                Some(
                    Regex::new(&anchored).map_err(|e| ValidationError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })?,
                )
            }
            _ => None,
        };
        Ok(Self { rule, pattern })
    }

    /// Returns the rule.
    #[must_use]
    pub const fn rule(&self) -> &ValidationRule {
        &self.rule
    }

    fn check(&self, model: &ModelValue, field: &str) -> Option<String> {
        match &self.rule {
            ValidationRule::Required {
                allow_empty_strings,
            } => {
                let missing = match model {
                    ModelValue::Null => true,
                    ModelValue::String(s) => !allow_empty_strings && s.trim().is_empty(),
                    _ => false,
                };
                missing.then(|| format_template("The {0} field is required.", &[field]))
            }
            ValidationRule::StringLength { min, max } => {
                let len = model.as_str()?.chars().count();
                if len >= *min && len <= *max {
                    return None;
                }
                let (max, min) = (max.to_string(), min.to_string());
                Some(if min == "0" {
                    format_template(
                        "The field {0} must be a string with a maximum length of {1}.",
                        &[field, &max],
                    )
                } else {
                    format_template(
                        "The field {0} must be a string with a minimum length of {2} and a maximum length of {1}.",
                        &[field, &max, &min],
                    )
                })
            }
            ValidationRule::Range { min, max } => {
                let value = match model {
                    ModelValue::Null => return None,
                    ModelValue::String(s) => s.trim().parse::<f64>().ok(),
                    other => other.as_f64(),
                };
                match value {
                    Some(v) if v >= *min && v <= *max => None,
                    _ => Some(format_template(
                        "The field {0} must be between {1} and {2}.",
                        &[field, &min.to_string(), &max.to_string()],
                    )),
                }
            }
            ValidationRule::RegularExpression(pattern) => {
                let text = model.as_str()?;
                let matched = self.pattern.as_ref().is_some_and(|re| re.is_match(text));
                (!matched).then(|| {
                    format_template(
                        "The field {0} must match the regular expression '{1}'.",
                        &[field, pattern],
                    )
                })
            }
            ValidationRule::MinLength(min) => {
                let len = length_of(model)?;
                (len < *min).then(|| {
                    format_template(
                        "The field {0} must be a string or array type with a minimum length of '{1}'.",
                        &[field, &min.to_string()],
                    )
                })
            }
            ValidationRule::MaxLength(max) => {
                let len = length_of(model)?;
                (len > *max).then(|| {
                    format_template(
                        "The field {0} must be a string or array type with a maximum length of '{1}'.",
                        &[field, &max.to_string()],
                    )
                })
            }
            ValidationRule::EmailAddress => {
                let text = model.as_str()?;
                (!is_email_shaped(text)).then(|| {
                    format_template("The {0} field is not a valid e-mail address.", &[field])
                })
            }
            ValidationRule::Custom { check, .. } => check(model),
        }
    }
}

impl ModelValidator for RuleValidator {
    fn validate(&self, ctx: &ModelValidationContext<'_>) -> Vec<ModelValidationResult> {
        let field = ctx.metadata.display_name();
        self.check(ctx.model, &field)
            .map(ModelValidationResult::new)
            .into_iter()
            .collect()
    }
}

fn length_of(model: &ModelValue) -> Option<usize> {
    match model {
        ModelValue::String(s) => Some(s.chars().count()),
        ModelValue::List(list) => Some(list.len()),
        ModelValue::Map(map) => Some(map.len()),
        _ => None,
    }
}

// Exactly one '@', neither first nor last.
fn is_email_shaped(text: &str) -> bool {
    let mut parts = text.split('@');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
    )
}

/// A validator built from a closure.
pub struct FnValidator {
    name: String,
    check: Arc<dyn Fn(&ModelValidationContext<'_>) -> Vec<ModelValidationResult> + Send + Sync>,
}

impl FnValidator {
    /// Wraps a closure.
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&ModelValidationContext<'_>) -> Vec<ModelValidationResult> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }
}

impl fmt::Debug for FnValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator").field("name", &self.name).finish()
    }
}

impl ModelValidator for FnValidator {
    fn validate(&self, ctx: &ModelValidationContext<'_>) -> Vec<ModelValidationResult> {
        (self.check)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daedalus_core::{ModelMetadataProvider, ModelType};

    fn run(rule: ValidationRule, model: ModelValue) -> Vec<String> {
        let provider = ModelMetadataProvider::default();
        let metadata = provider.for_type(&ModelType::string());
        let validator = RuleValidator::new(rule).expect("rule");
        let ctx = ModelValidationContext {
            metadata: &metadata,
            container: None,
            model: &model,
            key: "field",
        };
        validator
            .validate(&ctx)
            .into_iter()
            .map(|r| r.message)
            .collect()
    }

    #[test]
    fn test_required() {
        assert_eq!(run(ValidationRule::required(), ModelValue::Null).len(), 1);
        assert_eq!(run(ValidationRule::required(), "  ".into()).len(), 1);
        assert!(run(
            ValidationRule::Required {
                allow_empty_strings: true
            },
            "".into()
        )
        .is_empty());
        assert!(run(ValidationRule::required(), ModelValue::Int(0)).is_empty());
    }

    #[test]
    fn test_string_length_messages() {
        let errors = run(ValidationRule::string_length(3), "abcd".into());
        assert_eq!(errors, vec!["The field String must be a string with a maximum length of 3."]);

        let errors = run(ValidationRule::StringLength { min: 2, max: 4 }, "a".into());
        assert!(errors[0].contains("minimum length of 2"));
        assert!(run(ValidationRule::string_length(3), ModelValue::Null).is_empty());
    }

    #[test]
    fn test_range_accepts_numeric_strings() {
        assert!(run(ValidationRule::range(1.0, 5.0), "3".into()).is_empty());
        assert_eq!(run(ValidationRule::range(1.0, 5.0), ModelValue::Int(9)).len(), 1);
        assert_eq!(run(ValidationRule::range(1.0, 5.0), "x".into()).len(), 1);
    }

    #[test]
    fn test_regex_matches_whole_value() {
        let rule = ValidationRule::RegularExpression("[a-z]+".to_string());
        assert!(run(rule.clone(), "abc".into()).is_empty());
        assert_eq!(run(rule, "abc1".into()).len(), 1);
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let err = RuleValidator::new(ValidationRule::RegularExpression("(".to_string()))
            .expect_err("invalid");
        assert!(matches!(err, ValidationError::InvalidPattern { .. }));
    }

    #[test]
    fn test_lengths_and_email() {
        let list = ModelValue::list(vec![ModelValue::Int(1)]);
        assert_eq!(run(ValidationRule::MinLength(2), list.clone()).len(), 1);
        assert!(run(ValidationRule::MaxLength(1), list).is_empty());
        assert!(run(ValidationRule::EmailAddress, "a@b".into()).is_empty());
        assert_eq!(run(ValidationRule::EmailAddress, "a@b@c".into()).len(), 1);
        assert_eq!(run(ValidationRule::EmailAddress, "@b".into()).len(), 1);
    }

    #[test]
    fn test_custom_rule() {
        let rule = ValidationRule::custom("even", |v| {
            v.as_i64()
                .filter(|n| n % 2 != 0)
                .map(|n| format!("{n} is odd"))
        });
        assert_eq!(run(rule, ModelValue::Int(3)), vec!["3 is odd"]);
    }
}
