//! Error types for Ripple
//!
//! Tracking and propagation bookkeeping never fails a mutation. The types
//! here cover:
//! - Owner hook outcomes during propagation ([`HookError`])
//! - Best-effort coercion of raw mappings into records ([`CoerceError`])
//! - Misuse surfaced at construction/wrap time ([`TrackingError`])
//! - Schema configuration loading ([`ConfigError`])

/// Outcome of an owner hook that did not deliver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    /// The owner does not implement this hook; propagation tries the next one
    #[error("hook not supported by owner")]
    Unsupported,

    /// The owner implements the hook but refused or failed the delivery
    #[error("owner rejected change: {0}")]
    Rejected(String),
}

impl HookError {
    /// Create rejection error
    #[inline]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Check if the owner simply lacks the hook
    #[inline]
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported)
    }
}

/// Failure to turn a raw mapping into a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoerceError {
    /// Value assigned to a record slot is not a mapping
    #[error("expected a mapping for schema '{schema}', got {actual}")]
    NotAMapping {
        /// Schema of the record slot
        schema: String,
        /// Kind name of the value that was assigned
        actual: &'static str,
    },

    /// Record fields are named by text keys only
    #[error("non-text key {key} in mapping for schema '{schema}'")]
    NonTextKey {
        /// Schema of the record slot
        schema: String,
        /// Offending key, rendered for display
        key: String,
    },

    /// A field required by the schema is absent
    #[error("missing required field '{field}' for schema '{schema}'")]
    MissingField {
        /// Schema that requires the field
        schema: String,
        /// Name of the absent field
        field: String,
    },

    /// Host coercer specific failure
    #[error("coercion failed: {0}")]
    Custom(String),
}

/// Misuse of the tracking API
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    /// A field source enumerated the same name twice
    #[error("field '{field}' enumerated more than once")]
    DuplicateField {
        /// Repeated field name
        field: String,
    },

    /// Snapshot references a schema the registry does not know
    #[error("unknown schema: '{0}'")]
    UnknownSchema(String),

    /// Positional insert outside the container
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested position
        index: usize,
        /// Container length at the time of the insert
        len: usize,
    },

    /// Nested field value could not be coerced by [`Record::try_set`](crate::Record::try_set)
    #[error("coercion failed: {0}")]
    Coerce(#[from] CoerceError),
}

/// Schema configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML could not be parsed into schema declarations
    #[error("failed to parse schema config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Nested field references a schema not declared before it
    #[error("schema '{referenced_by}' references unknown schema '{schema}'")]
    UnknownSchema {
        /// Name that could not be resolved
        schema: String,
        /// Schema whose nested field points at it
        referenced_by: String,
    },

    /// The same schema name was declared twice
    #[error("schema '{0}' declared more than once")]
    DuplicateSchema(String),

    /// Declaration is structurally invalid
    #[error("invalid schema config: {0}")]
    Invalid(String),
}
