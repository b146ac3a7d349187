//! # Daedalus Validation
//!
//! Validation of bound model graphs.
//!
//! - [`ModelValidator`] - Checks one node; [`RuleValidator`] implements the
//!   declarative [`ValidationRule`](daedalus_core::ValidationRule)s
//! - [`ModelValidatorProvider`] / [`ValidatorCache`] - Ordered providers whose
//!   output is cached per metadata key
//! - [`ValidationVisitor`] - Depth-first walk with cycle detection, suppression
//!   and depth / collection-size guards
//! - [`ObjectModelValidator`] - Entry point used after binding a parameter
//!
//! Failed rules become model-state errors. Only guard violations are returned
//! as [`ValidationError`].

#![doc(html_root_url = "https://docs.rs/daedalus-validation/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod object_validator;
mod provider;
pub mod strategy;
mod validator;
mod visitor;

pub use error::{ValidationError, ValidationResult};
pub use object_validator::ObjectModelValidator;
pub use provider::{
    ConditionalValidatorProvider, ModelValidatorProvider, RuleValidatorProvider, ValidatorCache,
};
pub use strategy::ValidationEntry;
pub use validator::{
    FnValidator, ModelValidationContext, ModelValidationResult, ModelValidator, RuleValidator,
};
pub use visitor::ValidationVisitor;
