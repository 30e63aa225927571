//! Import hook stages and dispatch.
//!
//! Hooks extend a run at fixed points without forking the pipeline. A hook
//! declares the stages it subscribes to at registration; the dispatcher
//! validates that declaration once and then invokes subscribers in priority
//! order at each stage.
//!
//! Run-scoped stages see the mutable configuration before any records flow;
//! record-scoped stages see the mutable record around each store mutation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::ImportConfig;
use crate::error::{ImportError, ImportResult, RecordError};
use crate::record::ImportRecord;

/// The fixed extension points of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    /// Before the input source is opened.
    PreRead,
    /// After configuration files are loaded; the hook may rewrite them.
    PostConfigFilesRead,
    PreCreate,
    PostCreate,
    PreModify,
    PostModify,
    PreRemove,
    PostRemove,
}

impl HookStage {
    /// Whether the stage fires once per run rather than once per record.
    #[must_use]
    pub fn is_run_scoped(self) -> bool {
        matches!(self, Self::PreRead | Self::PostConfigFilesRead)
    }

    /// Stable name for logs and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreRead => "pre_read",
            Self::PostConfigFilesRead => "post_config_files_read",
            Self::PreCreate => "pre_create",
            Self::PostCreate => "post_create",
            Self::PreModify => "pre_modify",
            Self::PostModify => "post_modify",
            Self::PreRemove => "pre_remove",
            Self::PostRemove => "post_remove",
        }
    }
}

impl std::fmt::Display for HookStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a record-scoped hook decided about the current record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookOutcome {
    /// Proceed with the pending store operation.
    #[default]
    Continue,
    /// Drop the pending operation; the record is reported unchanged.
    Skip,
}

/// Failure raised by a hook.
///
/// At a run-scoped stage this aborts the run; at a record-scoped stage it
/// fails only the current record.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A pipeline extension invoked at its declared stages.
#[async_trait]
pub trait ImportHook: Send + Sync {
    /// Unique hook name for logs and error attribution.
    fn name(&self) -> &str;

    /// The stages this hook subscribes to. Must be non-empty and free of
    /// duplicates.
    fn stages(&self) -> Vec<HookStage>;

    /// Dispatch order within a stage; lower runs first.
    fn priority(&self) -> i32 {
        0
    }

    /// Called at subscribed run-scoped stages.
    async fn on_run_stage(
        &self,
        _stage: HookStage,
        _config: &mut ImportConfig,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Called at subscribed record-scoped stages.
    async fn on_record_stage(
        &self,
        _stage: HookStage,
        _record: &mut ImportRecord,
    ) -> Result<HookOutcome, HookError> {
        Ok(HookOutcome::Continue)
    }
}

/// Registry and dispatcher for import hooks.
#[derive(Default)]
pub struct HookDispatcher {
    subscribers: HashMap<HookStage, Vec<Arc<dyn ImportHook>>>,
}

impl HookDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook, validating its stage declaration.
    pub fn register(&mut self, hook: Arc<dyn ImportHook>) -> ImportResult<()> {
        let name = hook.name().to_string();
        if name.trim().is_empty() {
            return Err(ImportError::hook_contract(name, "hook name must not be empty"));
        }
        let stages = hook.stages();
        if stages.is_empty() {
            return Err(ImportError::hook_contract(
                name,
                "hook declares no stages",
            ));
        }
        for (i, stage) in stages.iter().enumerate() {
            if stages[..i].contains(stage) {
                return Err(ImportError::hook_contract(
                    name,
                    format!("stage {stage} declared twice"),
                ));
            }
        }
        for stage in stages {
            let subscribers = self.subscribers.entry(stage).or_default();
            subscribers.push(Arc::clone(&hook));
            subscribers.sort_by_key(|h| h.priority());
        }
        debug!(hook = %name, "hook registered");
        Ok(())
    }

    /// Number of subscribers at a stage.
    pub fn subscriber_count(&self, stage: HookStage) -> usize {
        self.subscribers.get(&stage).map_or(0, Vec::len)
    }

    /// Invoke all subscribers of a run-scoped stage.
    ///
    /// The first failure aborts the run; later subscribers do not fire.
    #[instrument(skip(self, config), fields(stage = %stage))]
    pub async fn dispatch_run(
        &self,
        stage: HookStage,
        config: &mut ImportConfig,
    ) -> ImportResult<()> {
        let Some(subscribers) = self.subscribers.get(&stage) else {
            return Ok(());
        };
        for hook in subscribers {
            hook.on_run_stage(stage, config).await.map_err(|e| {
                ImportError::HookAborted {
                    hook: hook.name().to_string(),
                    stage: stage.to_string(),
                    message: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    /// Invoke all subscribers of a record-scoped stage.
    ///
    /// A `Skip` short-circuits the remaining subscribers; a failure becomes
    /// a per-record error attributed to the failing hook.
    pub async fn dispatch_record(
        &self,
        stage: HookStage,
        record: &mut ImportRecord,
    ) -> Result<HookOutcome, RecordError> {
        let Some(subscribers) = self.subscribers.get(&stage) else {
            return Ok(HookOutcome::Continue);
        };
        for hook in subscribers {
            let outcome = hook.on_record_stage(stage, record).await.map_err(|e| {
                RecordError::Hook {
                    hook: hook.name().to_string(),
                    stage: stage.to_string(),
                    message: e.to_string(),
                }
            })?;
            if outcome == HookOutcome::Skip {
                debug!(hook = hook.name(), stage = %stage, line = record.line, "record skipped");
                return Ok(HookOutcome::Skip);
            }
        }
        Ok(HookOutcome::Continue)
    }
}
