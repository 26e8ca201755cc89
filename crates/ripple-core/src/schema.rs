//! Record schemas and the schema registry
//!
//! A [`RecordSchema`] carries everything a record type configures about
//! tracking: the depth ceiling, eager or lazy wrapping, which field names are
//! internal, propagation limits, and which fields hold nested records.
//!
//! Schemas are registered in a [`SchemaRegistry`], either in code or from a
//! TOML document:
//!
//! ```toml
//! [[schema]]
//! name = "address"
//! required = ["city"]
//!
//! [[schema]]
//! name = "user"
//! strategy = "lazy"
//! depth_overflow = "warn"
//!
//! [schema.skip]
//! exact = ["cache"]
//!
//! [schema.nested]
//! address = "address"
//! ```

use crate::error::{CoerceError, ConfigError, TrackingError};
use crate::propagate::PropagationPolicy;
use crate::record::{Record, RecordSnapshot};
use crate::value::{Key, Value};
use crate::walker::{DepthOverflow, Limits, DEFAULT_MAX_DEPTH};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Prefix marking internal field names unless configured otherwise
pub const DEFAULT_INTERNAL_PREFIX: &str = "__";

/// When a record wraps its field values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Wrap every field when tracking is (re)established
    #[default]
    Eager,

    /// Wrap a field on first read
    Lazy,
}

/// Field names that are stored but never scanned, wrapped or signalled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipPolicy {
    /// Exact internal names
    pub exact: Vec<String>,

    /// Internal name prefixes
    pub prefixes: Vec<String>,
}

impl SkipPolicy {
    /// Check if `name` is internal
    #[must_use]
    pub fn is_internal(&self, name: &str) -> bool {
        self.exact.iter().any(|e| e == name) || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

impl Default for SkipPolicy {
    fn default() -> Self {
        Self {
            exact: Vec::new(),
            prefixes: vec![DEFAULT_INTERNAL_PREFIX.to_string()],
        }
    }
}

/// Builds a nested record from a value assigned to a record-typed field
pub trait Coerce: Send + Sync {
    /// Build a record of `schema` from `value`
    ///
    /// # Errors
    /// Returns error if `value` cannot represent a record of `schema`
    fn coerce(&self, schema: &Arc<RecordSchema>, value: &Value) -> Result<Record, CoerceError>;
}

/// Accepts mappings with text keys that carry every required field
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCoercer;

impl Coerce for DefaultCoercer {
    fn coerce(&self, schema: &Arc<RecordSchema>, value: &Value) -> Result<Record, CoerceError> {
        let entries = match value {
            Value::RawMap(map) => map.snapshot(),
            Value::Map(map) => map.entries(),
            other => {
                return Err(CoerceError::NotAMapping {
                    schema: schema.name.clone(),
                    actual: other.kind_name(),
                })
            }
        };

        let mut fields = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let Key::Text(name) = key else {
                return Err(CoerceError::NonTextKey {
                    schema: schema.name.clone(),
                    key: key.to_string(),
                });
            };
            fields.push((name, value));
        }

        if let Some(field) = schema
            .required
            .iter()
            .find(|required| !fields.iter().any(|(name, _)| name == *required))
        {
            return Err(CoerceError::MissingField {
                schema: schema.name.clone(),
                field: field.clone(),
            });
        }

        Record::from_source(Arc::clone(schema), &fields).map_err(|e| CoerceError::Custom(e.to_string()))
    }
}

/// Tracking configuration of one record type
#[derive(Clone)]
pub struct RecordSchema {
    /// Schema name, used in diagnostics and snapshots
    pub name: String,

    /// Deepest depth at which raw collections are still wrapped
    pub max_depth: usize,

    /// When field values are wrapped
    pub strategy: Strategy,

    /// Internal field names
    pub skip: SkipPolicy,

    /// Reporting when the depth ceiling leaves a value untracked
    pub depth_overflow: DepthOverflow,

    /// Propagation limits of the record and of containers created under it
    pub propagation: PropagationPolicy,

    /// Fields a mapping must carry to be coerced into this schema
    pub required: Vec<String>,

    nested: IndexMap<String, Arc<RecordSchema>>,
    coercer: Arc<dyn Coerce>,
}

impl RecordSchema {
    /// Create schema with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_depth: DEFAULT_MAX_DEPTH,
            strategy: Strategy::default(),
            skip: SkipPolicy::default(),
            depth_overflow: DepthOverflow::default(),
            propagation: PropagationPolicy::default(),
            required: Vec::new(),
            nested: IndexMap::new(),
            coercer: Arc::new(DefaultCoercer),
        }
    }

    /// Set depth ceiling
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set wrapping strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set internal field names
    #[must_use]
    pub fn with_skip(mut self, skip: SkipPolicy) -> Self {
        self.skip = skip;
        self
    }

    /// Mark one more exact field name as internal
    #[must_use]
    pub fn with_internal(mut self, name: impl Into<String>) -> Self {
        self.skip.exact.push(name.into());
        self
    }

    /// Set depth overflow reporting
    #[must_use]
    pub fn with_depth_overflow(mut self, overflow: DepthOverflow) -> Self {
        self.depth_overflow = overflow;
        self
    }

    /// Set propagation limits
    #[must_use]
    pub fn with_propagation(mut self, propagation: PropagationPolicy) -> Self {
        self.propagation = propagation;
        self
    }

    /// Add a required field
    #[must_use]
    pub fn with_required(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    /// Declare `field` as holding records of `schema`
    #[must_use]
    pub fn with_nested(mut self, field: impl Into<String>, schema: Arc<RecordSchema>) -> Self {
        self.nested.insert(field.into(), schema);
        self
    }

    /// Replace the coercer used for nested fields
    #[must_use]
    pub fn with_coercer(mut self, coercer: impl Coerce + 'static) -> Self {
        self.coercer = Arc::new(coercer);
        self
    }

    /// Schema of the records held in `field`, if it is record-typed
    #[must_use]
    pub fn nested(&self, field: &str) -> Option<&Arc<RecordSchema>> {
        self.nested.get(field)
    }

    /// Coercer used for values assigned to nested fields
    #[must_use]
    pub fn coercer(&self) -> &dyn Coerce {
        self.coercer.as_ref()
    }

    /// Traversal limits derived from this schema
    #[must_use]
    pub fn limits(&self) -> Limits {
        Limits {
            max_depth: self.max_depth,
            overflow: self.depth_overflow,
            propagation: self.propagation,
        }
    }
}

impl fmt::Debug for RecordSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSchema")
            .field("name", &self.name)
            .field("max_depth", &self.max_depth)
            .field("strategy", &self.strategy)
            .field("skip", &self.skip)
            .field("depth_overflow", &self.depth_overflow)
            .field("propagation", &self.propagation)
            .field("required", &self.required)
            .field("nested", &self.nested.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaConfig {
    name: String,
    #[serde(default = "default_max_depth")]
    max_depth: usize,
    #[serde(default)]
    strategy: Strategy,
    #[serde(default)]
    skip: SkipPolicy,
    #[serde(default)]
    depth_overflow: DepthOverflow,
    #[serde(default)]
    propagation: PropagationPolicy,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    nested: IndexMap<String, String>,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryConfig {
    #[serde(default)]
    schema: Vec<SchemaConfig>,
}

/// Concurrent name -> schema registry
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: DashMap<String, Arc<RecordSchema>>,
}

impl SchemaRegistry {
    /// Create empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build registry from a TOML document
    ///
    /// # Errors
    /// Returns error if the document does not parse or declares an invalid
    /// schema set
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let registry = Self::new();
        registry.load_toml(source)?;
        Ok(registry)
    }

    /// Register every schema declared in a TOML document
    ///
    /// Nested fields may only reference schemas registered earlier, in this
    /// document or before it. Returns the number of schemas registered.
    ///
    /// # Errors
    /// Returns error on the first invalid declaration; schemas declared
    /// before it stay registered
    pub fn load_toml(&self, source: &str) -> Result<usize, ConfigError> {
        let config: RegistryConfig = toml::from_str(source)?;
        let count = config.schema.len();
        for declared in config.schema {
            let schema = self.resolve(declared)?;
            self.register(schema)?;
        }
        Ok(count)
    }

    fn resolve(&self, config: SchemaConfig) -> Result<RecordSchema, ConfigError> {
        if config.name.trim().is_empty() {
            return Err(ConfigError::Invalid("schema name must not be empty".to_string()));
        }
        if config.propagation.snapshot_retries == 0 {
            return Err(ConfigError::Invalid(format!(
                "schema '{}': snapshot_retries must be at least 1",
                config.name
            )));
        }

        let mut schema = RecordSchema::new(config.name)
            .with_max_depth(config.max_depth)
            .with_strategy(config.strategy)
            .with_skip(config.skip)
            .with_depth_overflow(config.depth_overflow)
            .with_propagation(config.propagation);
        schema.required = config.required;

        for (field, target) in config.nested {
            let nested = self.get(&target).ok_or_else(|| ConfigError::UnknownSchema {
                schema: target.clone(),
                referenced_by: schema.name.clone(),
            })?;
            schema = schema.with_nested(field, nested);
        }
        Ok(schema)
    }

    /// Register a schema under its name
    ///
    /// # Errors
    /// Returns error if a schema with the same name is already registered
    pub fn register(&self, schema: RecordSchema) -> Result<Arc<RecordSchema>, ConfigError> {
        use dashmap::mapref::entry::Entry;

        match self.schemas.entry(schema.name.clone()) {
            Entry::Occupied(_) => Err(ConfigError::DuplicateSchema(schema.name)),
            Entry::Vacant(slot) => {
                let schema = Arc::new(schema);
                slot.insert(Arc::clone(&schema));
                tracing::debug!(schema = %schema.name, "schema registered");
                Ok(schema)
            }
        }
    }

    /// Get schema by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<RecordSchema>> {
        self.schemas.get(name).map(|s| Arc::clone(s.value()))
    }

    /// Check if a schema is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Number of registered schemas
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Check if no schema is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Rebuild a record from its serialized form, with tracking restored
    ///
    /// # Errors
    /// Returns error if the snapshot's schema is not registered or its
    /// fields are not a valid enumeration
    pub fn revive(&self, snapshot: &RecordSnapshot) -> Result<Record, TrackingError> {
        let schema = self
            .get(&snapshot.schema)
            .ok_or_else(|| TrackingError::UnknownSchema(snapshot.schema.clone()))?;
        Record::from_source(schema, snapshot)
    }
}
