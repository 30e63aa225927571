//! Import error taxonomy.
//!
//! Three tiers, mirroring how the run loop treats a failure:
//!
//! - [`ImportError`] - fatal, aborts the run. No records are committed past
//!   the point of detection; earlier commits stay committed.
//! - [`RecordError`] - per-record, tolerated. Becomes a failed outcome for
//!   that record and counts against the configured error budget.
//! - [`SchemeError`] - scheme compilation/evaluation faults; fatal when they
//!   surface at configuration load.

use thiserror::Error;

use campus_store::StoreError;

/// Faults in scheme templates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemeError {
    /// A transform name after `:` is not recognized.
    #[error("unknown transform ':{name}' in scheme '{scheme}'")]
    UnknownTransform { scheme: String, name: String },

    /// A placeholder references an attribute no mapping or scheme produces.
    #[error("scheme '{scheme}' references unknown attribute '{attribute}'")]
    UnknownAttribute { scheme: String, attribute: String },

    /// More than one counter directive in a single scheme.
    #[error("scheme '{scheme}' contains more than one counter directive")]
    MultipleCounters { scheme: String },

    /// A counter directive is not the final fragment.
    #[error("counter directive must be the last fragment of scheme '{scheme}'")]
    CounterNotLast { scheme: String },

    /// A `<...>` placeholder was never closed.
    #[error("unterminated placeholder in scheme '{scheme}'")]
    Unterminated { scheme: String },

    /// A `[...]` directive is neither a slice nor a counter.
    #[error("invalid directive '[{directive}]' in scheme '{scheme}'")]
    InvalidDirective { scheme: String, directive: String },

    /// Scheme-derived attributes reference each other in a cycle.
    #[error("scheme dependency cycle involving attribute '{attribute}'")]
    Cycle { attribute: String },
}

/// Per-record errors, tolerated up to the configured budget.
#[derive(Debug, Error)]
pub enum RecordError {
    /// A mandatory attribute was never produced by mapping or schemes.
    #[error("mandatory attribute '{attribute}' missing")]
    MissingMandatoryAttribute { attribute: String },

    /// A mandatory attribute was produced but is blank.
    #[error("mandatory attribute '{attribute}' is empty")]
    EmptyMandatoryAttribute { attribute: String },

    /// Scheme evaluation failed for this record.
    #[error(transparent)]
    Scheme(#[from] SchemeError),

    /// A pipeline-owned attribute was set via free-form extra properties.
    #[error("attribute '{attribute}' is owned by the pipeline and cannot be set as an extra property")]
    NotSupported { attribute: String },

    /// A record-scoped hook failed.
    #[error("hook '{hook}' failed at stage {stage}: {message}")]
    Hook {
        hook: String,
        stage: String,
        message: String,
    },

    /// The store adapter rejected an individual operation.
    #[error("store {operation} failed: {source}")]
    Store {
        operation: String,
        #[source]
        source: StoreError,
    },
}

impl RecordError {
    /// Create a missing-mandatory error.
    pub fn missing(attribute: impl Into<String>) -> Self {
        Self::MissingMandatoryAttribute {
            attribute: attribute.into(),
        }
    }

    /// Create an empty-mandatory error.
    pub fn empty(attribute: impl Into<String>) -> Self {
        Self::EmptyMandatoryAttribute {
            attribute: attribute.into(),
        }
    }

    /// Create a not-supported error.
    pub fn not_supported(attribute: impl Into<String>) -> Self {
        Self::NotSupported {
            attribute: attribute.into(),
        }
    }

    /// Wrap a store error for one operation.
    pub fn store(operation: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            operation: operation.into(),
            source,
        }
    }

    /// Whether this is an input-data fault, as opposed to a hook or store
    /// failure. Validation faults are fixable in the source system.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingMandatoryAttribute { .. }
                | Self::EmptyMandatoryAttribute { .. }
                | Self::NotSupported { .. }
                | Self::Scheme(_)
        )
    }
}

/// Run-aborting errors.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Invalid or unreadable configuration/input.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Malformed scheme detected at configuration load.
    #[error(transparent)]
    Scheme(#[from] SchemeError),

    /// Two input records share the same external identity key pair.
    #[error("duplicate record key ({source_uid}, {record_uid}) at line {line}")]
    DuplicateRecordKey {
        source_uid: String,
        record_uid: String,
        line: usize,
    },

    /// A hook violated its registration contract.
    #[error("hook contract violation for '{hook}': {message}")]
    HookContract { hook: String, message: String },

    /// A run-scoped hook stage failed.
    #[error("hook '{hook}' aborted the run at stage {stage}: {message}")]
    HookAborted {
        hook: String,
        stage: String,
        message: String,
    },

    /// Store failure while loading the existing-entry snapshot.
    #[error("failed to load existing entries: {0}")]
    StoreLoad(#[from] StoreError),

    /// I/O failure on input or artifacts.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON input or persisted state.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV-level failure (artifact writing, malformed input).
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl ImportError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a hook contract error.
    pub fn hook_contract(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookContract {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

/// Result type for run-level operations.
pub type ImportResult<T> = Result<T, ImportError>;
