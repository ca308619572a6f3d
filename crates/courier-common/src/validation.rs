//! Single and composite validators returning structured validation results.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ValidationResult;

#[async_trait]
pub trait Validator<M>: Send + Sync {
    async fn validate(&self, message: &M, cancel: &CancellationToken) -> ValidationResult;
}

/// Runs an ordered list of validators, concatenating failures from all of them
/// rather than short-circuiting on the first one, so a caller sees every
/// violation in one result.
pub struct CompositeValidator<M> {
    validators: Vec<Box<dyn Validator<M>>>,
}

impl<M> CompositeValidator<M> {
    pub fn new() -> Self {
        Self { validators: Vec::new() }
    }

    pub fn push(mut self, validator: Box<dyn Validator<M>>) -> Self {
        self.validators.push(validator);
        self
    }
}

impl<M> Default for CompositeValidator<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Send + Sync> Validator<M> for CompositeValidator<M> {
    async fn validate(&self, message: &M, cancel: &CancellationToken) -> ValidationResult {
        let mut result = ValidationResult::valid();
        for validator in &self.validators {
            if cancel.is_cancelled() {
                break;
            }
            result = result.merge(validator.validate(message, cancel).await);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysValid;
    #[async_trait]
    impl Validator<String> for AlwaysValid {
        async fn validate(&self, _message: &String, _cancel: &CancellationToken) -> ValidationResult {
            ValidationResult::valid()
        }
    }

    struct AlwaysInvalid(&'static str);
    #[async_trait]
    impl Validator<String> for AlwaysInvalid {
        async fn validate(&self, _message: &String, _cancel: &CancellationToken) -> ValidationResult {
            ValidationResult::invalid(vec![self.0.to_string()])
        }
    }

    #[tokio::test]
    async fn composite_validator_concatenates_all_failures() {
        let composite = CompositeValidator::new()
            .push(Box::new(AlwaysInvalid("missing field a")))
            .push(Box::new(AlwaysValid))
            .push(Box::new(AlwaysInvalid("missing field b")));

        let result = composite.validate(&"msg".to_string(), &CancellationToken::new()).await;
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["missing field a", "missing field b"]);
    }

    #[tokio::test]
    async fn composite_validator_of_all_valid_is_valid() {
        let composite = CompositeValidator::new().push(Box::new(AlwaysValid));
        let result = composite.validate(&"msg".to_string(), &CancellationToken::new()).await;
        assert!(result.is_valid);
    }
}
