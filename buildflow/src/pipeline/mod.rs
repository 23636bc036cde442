//! The pipeline driver.
//!
//! A [`Pipeline`] is an ordered list of configured stages. Running it runs
//! each stage in turn against one [`BuildSession`] and stops at the first
//! failure; the stages after it are reported as skipped.


use crate::errors::{BuildflowError, Result};
use crate::session::BuildSession;
use crate::stages::{Stage, StageDefinition, StageReport};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// A stage paired with the options it runs with.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Returns the stage name.
    fn name(&self) -> &str;

    /// Runs the stage once.
    async fn run(&self, session: &BuildSession) -> Result<StageReport>;

    /// Returns the report of the last run, if any.
    fn report(&self) -> Option<StageReport>;
}

/// A [`Stage`] and its options.
pub struct ConfiguredStage<D: StageDefinition> {
    stage: Arc<Stage<D>>,
    options: D::Options,
}

impl<D: StageDefinition> ConfiguredStage<D> {
    /// Pairs `stage` with `options`.
    pub fn new(stage: Arc<Stage<D>>, options: D::Options) -> Self {
        Self { stage, options }
    }

    /// Returns the wrapped stage.
    pub fn stage(&self) -> &Arc<Stage<D>> {
        &self.stage
    }
}

#[async_trait]
impl<D: StageDefinition> PipelineStage for ConfiguredStage<D> {
    fn name(&self) -> &str {
        self.stage.name()
    }

    async fn run(&self, session: &BuildSession) -> Result<StageReport> {
        self.stage.run(session, &self.options).await
    }

    fn report(&self) -> Option<StageReport> {
        self.stage.report()
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// The session's run id.
    pub run_id: Uuid,
    /// Reports of the stages that ran, in order.
    pub stages: Vec<StageReport>,
    /// Stages not run because an earlier one failed.
    pub skipped: Vec<String>,
}

impl PipelineReport {
    /// Returns true if every stage ran and succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.skipped.is_empty() && self.stages.iter().all(StageReport::is_success)
    }

    /// Returns the report of the stage that stopped the run.
    #[must_use]
    pub fn failed_stage(&self) -> Option<&StageReport> {
        self.stages.iter().find(|s| !s.is_success())
    }
}

/// An ordered list of stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn PipelineStage>>,
    names: HashSet<String>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage. Stage names must be unique.
    pub fn add_stage(&mut self, stage: Box<dyn PipelineStage>) -> Result<()> {
        let name = stage.name().to_string();
        if !self.names.insert(name.clone()) {
            return Err(BuildflowError::DuplicateStage { stage: name });
        }
        self.stages.push(stage);
        Ok(())
    }

    /// Appends `stage` configured with `options`.
    ///
    /// The caller may keep a clone of `stage` to inspect it after the run.
    pub fn with_stage<D: StageDefinition>(
        mut self,
        stage: Arc<Stage<D>>,
        options: D::Options,
    ) -> Result<Self> {
        self.add_stage(Box::new(ConfiguredStage::new(stage, options)))?;
        Ok(self)
    }

    /// Returns the stage names in run order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage in order, stopping at the first failure.
    pub async fn run(&self, session: &BuildSession) -> PipelineReport {
        let mut report = PipelineReport {
            run_id: session.run_id(),
            stages: Vec::with_capacity(self.stages.len()),
            skipped: Vec::new(),
        };

        let mut remaining = self.stages.iter();
        for stage in remaining.by_ref() {
            let started_at = Utc::now();
            match stage.run(session).await {
                Ok(stage_report) => {
                    info!(
                        stage = %stage.name(),
                        duration_ms = stage_report.duration_ms(),
                        "Stage succeeded"
                    );
                    report.stages.push(stage_report);
                }
                Err(e) => {
                    error!(stage = %stage.name(), error = %e, "Stage failed");
                    let stage_report = stage
                        .report()
                        .filter(|r| !r.is_success())
                        .unwrap_or_else(|| {
                            StageReport::failed(stage.name(), started_at, e.to_string())
                        });
                    report.stages.push(stage_report);
                    break;
                }
            }
        }
        report.skipped = remaining.map(|s| s.name().to_string()).collect();

        report
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}
