//! Stage definitions and the generic stage orchestrator.
//!
//! A stage is described by a [`StageDefinition`]: its name, default
//! properties, hook set and body. [`Stage`] drives any definition through
//! the same lifecycle:
//!
//! 1. load `<build>/.buildflow/<name>.json` (a missing file counts as empty);
//! 2. merge `defaults < file < options` and freeze the result;
//! 3. run the lifecycle hooks;
//! 4. execute the body.
//!
//! Any error marks the stage failed, is recorded, and propagates.

mod api_report;
mod clean;
mod result;

pub use api_report::{
    ApiReportStage, ApiReportStageHooks, ApiReportStageOptions, ApiReportStageProperties,
};
pub use clean::{
    has_glob_magic, resolve_pattern, CleanStage, CleanStageHooks, CleanStageOptions,
    CleanStageProperties, DELETE_CONCURRENCY,
};
pub use result::{StageReport, StageState};

use crate::config::merge_layers;
use crate::errors::{BuildflowError, Result};
use crate::hooks::SeriesHook;
use crate::logging::ScopedLogger;
use crate::session::BuildSession;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info_span, Instrument};

/// Hooks every stage exposes around configuration loading.
pub struct StageLifecycleHooks {
    /// Runs once properties are resolved.
    pub load_stage_configuration: SeriesHook<()>,
    /// Runs after every `load_stage_configuration` handler.
    pub after_load_stage_configuration: SeriesHook<()>,
}

impl Default for StageLifecycleHooks {
    fn default() -> Self {
        Self {
            load_stage_configuration: SeriesHook::series("loadStageConfiguration"),
            after_load_stage_configuration: SeriesHook::series("afterLoadStageConfiguration"),
        }
    }
}

impl fmt::Debug for StageLifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageLifecycleHooks")
            .field("load_stage_configuration", &self.load_stage_configuration.len())
            .field(
                "after_load_stage_configuration",
                &self.after_load_stage_configuration.len(),
            )
            .finish()
    }
}

/// Implemented by every stage hook set.
pub trait HasLifecycleHooks {
    /// Returns the lifecycle hooks.
    fn lifecycle(&self) -> &StageLifecycleHooks;
}

/// What a stage is: configuration shape, hooks and body.
#[async_trait]
pub trait StageDefinition: Send + Sync + Sized + 'static {
    /// Caller-supplied options; highest-priority configuration layer.
    type Options: Serialize + Send + Sync;
    /// The frozen, merged configuration.
    type Properties: DeserializeOwned + Send + Sync;
    /// The stage's extension points.
    type Hooks: HasLifecycleHooks + Default + Send + Sync;

    /// Returns the stage name; also names its config file and logger.
    fn name(&self) -> &str;

    /// Returns the lowest-priority configuration layer.
    fn default_properties(&self) -> serde_json::Value;

    /// Adjusts freshly merged properties before they are frozen.
    fn normalize(&self, properties: Self::Properties) -> Result<Self::Properties> {
        Ok(properties)
    }

    /// Runs the stage body.
    async fn execute(&self, ctx: &StageContext<'_, Self>) -> Result<()>;
}

/// What a stage body can see.
pub struct StageContext<'a, D: StageDefinition> {
    properties: &'a D::Properties,
    hooks: &'a D::Hooks,
    logger: Arc<ScopedLogger>,
    session: &'a BuildSession,
}

impl<'a, D: StageDefinition> StageContext<'a, D> {
    /// Returns the resolved properties.
    #[must_use]
    pub fn properties(&self) -> &'a D::Properties {
        self.properties
    }

    /// Returns the stage hooks.
    #[must_use]
    pub fn hooks(&self) -> &'a D::Hooks {
        self.hooks
    }

    /// Returns the stage's scoped logger.
    #[must_use]
    pub fn logger(&self) -> &Arc<ScopedLogger> {
        &self.logger
    }

    /// Returns the session.
    #[must_use]
    pub fn session(&self) -> &'a BuildSession {
        self.session
    }
}

/// A plugin that taps a stage's hooks.
pub trait StagePlugin<H>: Send + Sync {
    /// Returns the plugin name.
    fn name(&self) -> &str;

    /// Subscribes the plugin's handlers.
    fn apply(&self, hooks: &H);
}

/// Drives a [`StageDefinition`] through its lifecycle.
pub struct Stage<D: StageDefinition> {
    definition: D,
    hooks: D::Hooks,
    properties: OnceLock<D::Properties>,
    state: Mutex<StageState>,
    claimed: AtomicBool,
    report: Mutex<Option<StageReport>>,
}

impl<D: StageDefinition> Stage<D> {
    /// Creates a stage in the `Created` state with empty hooks.
    #[must_use]
    pub fn new(definition: D) -> Self {
        Self {
            definition,
            hooks: D::Hooks::default(),
            properties: OnceLock::new(),
            state: Mutex::new(StageState::Created),
            claimed: AtomicBool::new(false),
            report: Mutex::new(None),
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Returns the definition.
    #[must_use]
    pub fn definition(&self) -> &D {
        &self.definition
    }

    /// Returns the hooks plugins tap.
    #[must_use]
    pub fn hooks(&self) -> &D::Hooks {
        &self.hooks
    }

    /// Lets a plugin tap this stage's hooks.
    pub fn apply_plugin(&self, plugin: &dyn StagePlugin<D::Hooks>) {
        debug!(stage = %self.name(), plugin = %plugin.name(), "Applying plugin");
        plugin.apply(&self.hooks);
    }

    /// Returns the resolved properties, once resolved.
    #[must_use]
    pub fn properties(&self) -> Option<&D::Properties> {
        self.properties.get()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StageState {
        *self.state.lock()
    }

    /// Returns the report of the finished run.
    #[must_use]
    pub fn report(&self) -> Option<StageReport> {
        self.report.lock().clone()
    }

    /// Returns the recorded error of a failed run.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.report.lock().as_ref().and_then(|r| r.error.clone())
    }

    fn transition(&self, from: StageState, to: StageState) -> Result<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(BuildflowError::stage_execution(
                self.name(),
                format!("expected state {from}, found {}", *state),
            ));
        }
        *state = to;
        Ok(())
    }

    /// Merges and freezes the stage properties.
    ///
    /// A missing configuration file is treated as empty; any other load
    /// failure is returned.
    pub async fn resolve_properties(
        &self,
        session: &BuildSession,
        options: &D::Options,
    ) -> Result<&D::Properties> {
        if self.state() != StageState::Created {
            return Err(BuildflowError::stage_execution(
                self.name(),
                "properties are already resolved",
            ));
        }

        let path = session.build().stage_config_path(self.name());
        let file = session.config().load_json(&path).await?;
        debug!(
            stage = %self.name(),
            path = %path.display(),
            found = file.is_some(),
            "Loaded stage configuration"
        );

        let merged = merge_layers(
            self.definition.default_properties(),
            file,
            serde_json::to_value(options)?,
        );
        let properties: D::Properties = serde_json::from_value(merged)
            .map_err(|e| BuildflowError::configuration_invalid(&path, e.to_string()))?;
        let properties = self.definition.normalize(properties)?;

        self.properties.set(properties).map_err(|_| {
            BuildflowError::Internal(format!("properties of '{}' set twice", self.name()))
        })?;
        self.transition(StageState::Created, StageState::PropertiesResolved)?;

        self.properties
            .get()
            .ok_or_else(|| BuildflowError::Internal("properties vanished".to_string()))
    }

    /// Resolves properties and executes the stage.
    ///
    /// A stage runs at most once. If [`Stage::resolve_properties`] was
    /// already called, `options` is ignored and the frozen properties are
    /// used. On failure the stage becomes [`StageState::Failed`], the error
    /// is recorded in its report, and the error is returned.
    pub async fn run(&self, session: &BuildSession, options: &D::Options) -> Result<StageReport> {
        // First caller wins; later calls leave the winner's state alone.
        let state = self.state();
        if self.claimed.swap(true, Ordering::AcqRel)
            || !matches!(state, StageState::Created | StageState::PropertiesResolved)
        {
            return Err(BuildflowError::stage_execution(
                self.name(),
                format!("cannot run a stage in state {state}"),
            ));
        }

        let started_at = Utc::now();
        let span = info_span!("stage", stage = %self.name(), run_id = %session.run_id());

        let outcome = self.run_inner(session, options).instrument(span).await;

        let report = match &outcome {
            Ok(()) => {
                *self.state.lock() = StageState::Succeeded;
                StageReport::succeeded(self.name(), started_at)
            }
            Err(e) => {
                *self.state.lock() = StageState::Failed;
                debug!(stage = %self.name(), error = %e, "Stage failed");
                StageReport::failed(self.name(), started_at, e.to_string())
            }
        };
        *self.report.lock() = Some(report.clone());

        outcome.map(|()| report)
    }

    async fn run_inner(&self, session: &BuildSession, options: &D::Options) -> Result<()> {
        let properties = match self.properties.get() {
            Some(properties) => properties,
            None => self.resolve_properties(session, options).await?,
        };

        let lifecycle = self.hooks.lifecycle();
        lifecycle.load_stage_configuration.invoke(&()).await?;
        lifecycle.after_load_stage_configuration.invoke(&()).await?;

        self.transition(StageState::PropertiesResolved, StageState::Executing)?;

        let ctx = StageContext {
            properties,
            hooks: &self.hooks,
            logger: session.logging().request_scoped_logger(self.name()),
            session,
        };
        self.definition.execute(&ctx).await
    }
}

impl<D: StageDefinition> fmt::Debug for Stage<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
