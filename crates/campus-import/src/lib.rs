//! # Importer
//!
//! The configurable user-import pipeline: ingests CSV/JSON rosters, derives
//! identity attributes through scheme templates, resolves naming collisions
//! with persistent counters, reconciles desired state against the person
//! store and emits result artifacts.
//!
//! ## Data flow
//!
//! Reader -> (pre-read hooks) -> Field Mapper/Validator (scheme engine +
//! counter store) -> Reconciler (consults the store adapter) -> per-record
//! hook-wrapped store calls -> Result Writer.
//!
//! ## Crate organization
//!
//! - [`config`] - run configuration, loaded once per import
//! - [`error`] - run-fatal vs per-record error taxonomy
//! - [`scheme`] - attribute template engine
//! - [`counter`] - disambiguation counter store
//! - [`reader`] - CSV/JSON record sources
//! - [`mapper`] - field mapping and mandatory-attribute validation
//! - [`reconcile`] - create/modify/delete/no-op decisions
//! - [`hooks`] - typed hook registry and dispatcher
//! - [`writer`] - summary and password artifacts
//! - [`pipeline`] - run orchestration

pub mod config;
pub mod counter;
pub mod error;
pub mod hooks;
pub mod mapper;
pub mod password;
pub mod pipeline;
pub mod reader;
pub mod reconcile;
pub mod record;
pub mod scheme;
pub mod writer;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ImportConfig, InputConfig, InputFormat, OutputConfig};
    pub use crate::counter::CounterStore;
    pub use crate::error::{ImportError, ImportResult, RecordError, SchemeError};
    pub use crate::hooks::{
        HookDispatcher, HookError, HookOutcome, HookStage, ImportHook,
    };
    pub use crate::mapper::{FieldHandler, FieldMapper};
    pub use crate::pipeline::{ImportPipeline, ImportSummary, RunStatus};
    pub use crate::reader::{CsvReader, JsonReader, RecordStream, RowError};
    pub use crate::reconcile::{ExistingIndex, Reconciler};
    pub use crate::record::{ImportOutcome, ImportRecord, OutcomeKind, RawRecord, RecordAction};
    pub use crate::scheme::{CompiledSchemes, CounterMode, Scheme};
    pub use crate::writer::ResultWriter;
}
