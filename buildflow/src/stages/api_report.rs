//! The `api-report` stage: runs API extraction when the project opts in.

use super::{HasLifecycleHooks, StageContext, StageDefinition, StageLifecycleHooks};
use crate::errors::{BuildflowError, Result};
use crate::runner::{run_runner, ApiExtractorRunner, ApiExtractorRunnerConfiguration, ToolLoader};
use crate::utils::resolve_path;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Default location of the tool's configuration, relative to the build folder.
pub const DEFAULT_TOOL_CONFIG_FILE: &str = "config/api-extractor.json";

/// Caller-supplied options for the API report stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReportStageOptions {
    /// Fail on report drift instead of updating the baseline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production: Option<bool>,
}

/// Resolved API report stage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReportStageProperties {
    /// Fail on report drift instead of updating the baseline.
    pub production: bool,
    /// The tool's configuration file, relative to the build folder.
    pub tool_config_file: String,
    /// Where the tool package is installed.
    #[serde(default)]
    pub tool_package_path: Option<String>,
    /// Alternative compiler installation.
    #[serde(default)]
    pub auxiliary_compiler_path: Option<String>,
}

/// Extension points of the API report stage.
#[derive(Debug, Default)]
pub struct ApiReportStageHooks {
    lifecycle: StageLifecycleHooks,
}

impl HasLifecycleHooks for ApiReportStageHooks {
    fn lifecycle(&self) -> &StageLifecycleHooks {
        &self.lifecycle
    }
}

/// The API report stage definition.
#[derive(Clone)]
pub struct ApiReportStage {
    loader: Arc<dyn ToolLoader>,
}

impl ApiReportStage {
    /// Creates the stage; `loader` locates the tool from its package path.
    #[must_use]
    pub fn new(loader: Arc<dyn ToolLoader>) -> Self {
        Self { loader }
    }
}

impl fmt::Debug for ApiReportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiReportStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl StageDefinition for ApiReportStage {
    type Options = ApiReportStageOptions;
    type Properties = ApiReportStageProperties;
    type Hooks = ApiReportStageHooks;

    fn name(&self) -> &str {
        "api-report"
    }

    fn default_properties(&self) -> serde_json::Value {
        serde_json::json!({
            "production": false,
            "toolConfigFile": DEFAULT_TOOL_CONFIG_FILE,
        })
    }

    async fn execute(&self, ctx: &StageContext<'_, Self>) -> Result<()> {
        let properties = ctx.properties();
        let build_folder = &ctx.session().build().build_folder;

        let config_file = resolve_path(build_folder, Path::new(&properties.tool_config_file));
        if !tokio::fs::try_exists(&config_file).await? {
            ctx.logger().write_verbose_line(format!(
                "No {} found; skipping API report",
                properties.tool_config_file
            ));
            return Ok(());
        }

        let package_path = properties.tool_package_path.as_deref().ok_or_else(|| {
            BuildflowError::stage_execution(
                self.name(),
                "toolPackagePath must be set when a tool config file is present",
            )
        })?;
        let package_path = resolve_path(build_folder, Path::new(package_path));

        let runner = ApiExtractorRunner::new(self.loader.load(&package_path)?);
        let config = ApiExtractorRunnerConfiguration {
            tool_config_file_location: config_file,
            tool_package_path: package_path,
            auxiliary_compiler_path: properties
                .auxiliary_compiler_path
                .as_deref()
                .map(|p| resolve_path(build_folder, Path::new(p))),
            build_folder: build_folder.clone(),
            production: properties.production,
        };

        run_runner(&runner, &config, ctx.session().logging()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfiguration;
    use crate::logging::{CollectingLogSink, LogLevel, LoggingManager};
    use crate::runner::{
        DiagnosticMessage, DiagnosticSeverity, DiagnosticTool, DiagnosticVisitor,
        StaticToolLoader, ToolOutcome, ToolRequest,
    };
    use crate::session::BuildSession;
    use crate::stages::{Stage, StageState};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    struct DriftingTool {
        requests: Mutex<Vec<ToolRequest>>,
    }

    impl DiagnosticTool for DriftingTool {
        fn name(&self) -> &str {
            "API Extractor"
        }

        fn version(&self) -> Result<String> {
            Ok("7.0.0".into())
        }

        fn invoke(
            &self,
            request: &ToolRequest,
            visitor: &mut DiagnosticVisitor<'_>,
        ) -> Result<ToolOutcome> {
            self.requests.lock().push(request.clone());
            visitor(DiagnosticMessage::new(DiagnosticSeverity::Warning, "ae-forgotten-export"))?;
            Ok(ToolOutcome {
                succeeded: true,
                report_changed: true,
            })
        }
    }

    fn fixture(
        with_tool_config: bool,
    ) -> (tempfile::TempDir, Arc<DriftingTool>, Stage<ApiReportStage>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".buildflow")).unwrap();
        std::fs::write(
            dir.path().join(".buildflow/api-report.json"),
            r#"{ "toolPackagePath": "node_modules/api-extractor" }"#,
        )
        .unwrap();
        if with_tool_config {
            std::fs::create_dir_all(dir.path().join("config")).unwrap();
            std::fs::write(dir.path().join(DEFAULT_TOOL_CONFIG_FILE), "{}").unwrap();
        }

        let tool = Arc::new(DriftingTool {
            requests: Mutex::new(Vec::new()),
        });
        let stage = Stage::new(ApiReportStage::new(Arc::new(StaticToolLoader::new(
            tool.clone(),
        ))));
        (dir, tool, stage)
    }

    fn session(root: &Path, sink: Arc<CollectingLogSink>) -> BuildSession {
        BuildSession::new(BuildConfiguration::with_root(root.to_path_buf()))
            .with_logging(Arc::new(LoggingManager::new(sink)))
    }

    #[tokio::test]
    async fn test_skips_without_tool_config() {
        let (dir, tool, stage) = fixture(false);
        let sink = Arc::new(CollectingLogSink::new());

        stage
            .run(&session(dir.path(), sink.clone()), &ApiReportStageOptions::default())
            .await
            .unwrap();

        assert!(tool.requests.lock().is_empty());
        assert!(sink.contains(LogLevel::Verbose, "skipping API report"));
    }

    #[tokio::test]
    async fn test_local_build_tolerates_drift() {
        let (dir, tool, stage) = fixture(true);
        let sink = Arc::new(CollectingLogSink::new());

        stage
            .run(&session(dir.path(), sink.clone()), &ApiReportStageOptions::default())
            .await
            .unwrap();

        let requests = tool.requests.lock().clone();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].local_build);
        assert_eq!(
            requests[0].config_file,
            dir.path().join("config/api-extractor.json")
        );
        assert!(sink.contains(LogLevel::Warning, "API Extractor completed with 1 warning"));
        assert_eq!(stage.state(), StageState::Succeeded);
    }

    #[tokio::test]
    async fn test_production_drift_fails_stage() {
        let (dir, _tool, stage) = fixture(true);
        let sink = Arc::new(CollectingLogSink::new());

        let err = stage
            .run(
                &session(dir.path(), sink),
                &ApiReportStageOptions {
                    production: Some(true),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, BuildflowError::ReportDrift { .. }));
        assert_eq!(stage.state(), StageState::Failed);
        assert_eq!(stage.error().as_deref(), Some("API Extractor report changed."));
    }

    #[tokio::test]
    async fn test_missing_package_path_is_stage_error() {
        let (dir, tool, stage) = fixture(true);
        std::fs::write(dir.path().join(".buildflow/api-report.json"), "{}").unwrap();

        let err = stage
            .run(
                &session(dir.path(), Arc::new(CollectingLogSink::new())),
                &ApiReportStageOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, BuildflowError::StageExecution { .. }));
        assert!(tool.requests.lock().is_empty());
    }

    #[test]
    fn test_defaults_deserialize() {
        let properties: ApiReportStageProperties =
            serde_json::from_value(ApiReportStage::new(Arc::new(StaticToolLoader::new(Arc::new(
                DriftingTool {
                    requests: Mutex::new(Vec::new()),
                },
            ))))
            .default_properties())
            .unwrap();

        assert_eq!(
            properties,
            ApiReportStageProperties {
                production: false,
                tool_config_file: DEFAULT_TOOL_CONFIG_FILE.into(),
                tool_package_path: None,
                auxiliary_compiler_path: None,
            }
        );
    }
}
