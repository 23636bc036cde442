//! # Buildflow
//!
//! The orchestration core of a build pipeline.
//!
//! A pipeline is a sequence of named stages. Each stage:
//!
//! - **Resolves its configuration**: defaults, then `.buildflow/<stage>.json`,
//!   then caller options, merged and frozen before the body runs
//! - **Exposes hooks**: ordered handler chains that plugins tap; a
//!   series-bail hook stops at the first handler that claims the call
//! - **Fans work out**: through the bounded-concurrency executor, or through
//!   runners that wrap an external tool and classify its diagnostics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use buildflow::prelude::*;
//! use std::sync::Arc;
//!
//! let clean = Arc::new(Stage::new(CleanStage));
//! clean.apply_plugin(&BuildFolderGuardPlugin::new("/repo/project"));
//! clean.apply_plugin(&FileSystemDeletePlugin::new());
//!
//! let pipeline = Pipeline::new().with_stage(clean, CleanStageOptions::default())?;
//! let session = BuildSession::new(BuildConfiguration::new("/repo/project")?);
//! let report = pipeline.run(&session).await;
//! assert!(report.succeeded());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod errors;
pub mod executor;
pub mod hooks;
pub mod logging;
pub mod pipeline;
pub mod plugins;
pub mod runner;
pub mod session;
pub mod stages;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{BuildConfiguration, ConfigLoader};
    pub use crate::errors::{BuildflowError, ErrorKind, Result};
    pub use crate::executor::{
        for_each_limited, for_each_limited_with, FailurePolicy, ForEachOptions,
    };
    pub use crate::hooks::{
        BailHook, HookHandler, HookKind, HookOutcome, HookRegistry, SeriesHook,
    };
    pub use crate::logging::{init_tracing, LogLevel, LogSink, LoggingManager, ScopedLogger};
    pub use crate::pipeline::{Pipeline, PipelineReport, PipelineStage};
    pub use crate::plugins::{BuildFolderGuardPlugin, FileSystemDeletePlugin};
    pub use crate::runner::{
        run_runner, ApiExtractorRunner, ApiExtractorRunnerConfiguration, DiagnosticMessage,
        DiagnosticSeverity, DiagnosticTool, Runner, RunnerResult, ToolLoader,
    };
    pub use crate::session::BuildSession;
    pub use crate::stages::{
        ApiReportStage, ApiReportStageOptions, CleanStage, CleanStageOptions, Stage,
        StageDefinition, StagePlugin, StageReport, StageState,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_prelude_builds_a_pipeline() {
        let clean = Arc::new(Stage::new(CleanStage));
        clean.apply_plugin(&BuildFolderGuardPlugin::new("/repo/project"));
        clean.apply_plugin(&FileSystemDeletePlugin::new());

        let pipeline = Pipeline::new()
            .with_stage(clean.clone(), CleanStageOptions::default())
            .unwrap();

        assert_eq!(pipeline.stage_names(), vec!["clean"]);
        assert_eq!(clean.hooks().delete_path.len(), 2);
    }
}
