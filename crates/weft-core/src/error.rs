use std::fmt;

use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Path of the offending field, e.g. `grades[1].math`.
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All field errors found while validating one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Whether any error refers to `field` or one of its children.
    pub fn mentions(&self, field: &str) -> bool {
        self.0.iter().any(|e| {
            e.field == field
                || e.field.starts_with(&format!("{}.", field))
                || e.field.starts_with(&format!("{}[", field))
        })
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, Error)]
pub enum WeftError {
    // Schema errors
    #[error("Unknown type tag: {0}")]
    UnknownTypeTag(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    // Workflow structure errors
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("Broken loop template: {0}")]
    BrokenTemplate(String),

    // Node invocation errors
    #[error("Input data validation error in {node}: {errors}")]
    InputValidation {
        node: String,
        errors: ValidationErrors,
    },

    #[error("Output data validation error in {node}: {errors}")]
    OutputValidation {
        node: String,
        errors: ValidationErrors,
    },

    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    // Engine errors
    #[error("No output produced for node: {0}")]
    MissingOutput(String),

    #[error("Sub-graph nesting exceeded max depth ({0})")]
    DepthExceeded(usize),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WeftError {
    /// Configuration-time failures; never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            WeftError::UnknownTypeTag(_)
                | WeftError::Config(_)
                | WeftError::ConfigNotFound(_)
                | WeftError::UnknownNodeType(_)
                | WeftError::InvalidWorkflow(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WeftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = WeftError::InputValidation {
            node: "if_else_node".into(),
            errors: ValidationErrors(vec![
                FieldError::new("x", "field required"),
                FieldError::new("y", "expected int, got string"),
            ]),
        };
        assert_eq!(
            err.to_string(),
            "Input data validation error in if_else_node: x: field required; y: expected int, got string"
        );
    }

    #[test]
    fn test_mentions_nested_fields() {
        let errors = ValidationErrors(vec![FieldError::new("grades[1].math", "expected float")]);
        assert!(errors.mentions("grades"));
        assert!(!errors.mentions("grade"));
    }

    #[test]
    fn test_is_configuration() {
        assert!(WeftError::UnknownTypeTag("complex".into()).is_configuration());
        assert!(!WeftError::MissingOutput("out".into()).is_configuration());
    }
}
