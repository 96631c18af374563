use crate::invoker::{InvokerSettings, DEFAULT_ACTIVITY_TIMEOUT};
use crate::stage::StageKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub agents: HashMap<String, AgentConfig>,
    pub pipeline: StageConfigs,
    /// No output for this long kills the stage.
    #[serde(default = "default_activity_timeout_secs")]
    pub activity_timeout_secs: u64,
    /// Directory prepended to the child's PATH (e.g. where the CLI tool
    /// lives when not globally installed).
    #[serde(default)]
    pub path_prepend: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Static list of alternate command names tried when `command` does
    /// not resolve. No other path search happens.
    #[serde(default)]
    pub fallback_commands: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfigs {
    pub plan: StageConfig,
    pub implement: StageConfig,
    pub review: StageConfig,
}

impl StageConfigs {
    pub fn stage(&self, kind: StageKind) -> &StageConfig {
        match kind {
            StageKind::Plan => &self.plan,
            StageKind::Implement => &self.implement,
            StageKind::Review => &self.review,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageConfig {
    /// Name of an entry in the `agents` map.
    pub agent: String,
    #[serde(default = "default_stage_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_activity_timeout_secs() -> u64 {
    DEFAULT_ACTIVITY_TIMEOUT.as_secs()
}

fn default_stage_timeout_secs() -> u64 {
    600
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        const DEFAULT_PIPELINE_YAML: &str = include_str!("../triad.yaml");

        serde_yaml::from_str(DEFAULT_PIPELINE_YAML)
            .expect("Failed to parse embedded triad.yaml - this is a bug in the triad.yaml file")
    }

    pub fn validate(&self) -> Result<()> {
        for kind in [StageKind::Plan, StageKind::Implement, StageKind::Review] {
            let stage = self.pipeline.stage(kind);
            if !self.agents.contains_key(&stage.agent) {
                anyhow::bail!(
                    "{} stage references agent '{}' which is not in the agents configuration",
                    kind,
                    stage.agent
                );
            }
            if stage.timeout_secs == 0 {
                anyhow::bail!("{} stage timeout must be greater than zero", kind);
            }
        }
        if self.activity_timeout_secs == 0 {
            anyhow::bail!("activity_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// The agent entry bound to a stage. Call after `validate()`.
    pub fn agent_for(&self, kind: StageKind) -> Result<&AgentConfig> {
        let stage = self.pipeline.stage(kind);
        self.agents
            .get(&stage.agent)
            .with_context(|| format!("{} stage agent '{}' not configured", kind, stage.agent))
    }

    /// Invoker settings for a stage under the given working directory.
    pub fn settings_for(&self, kind: StageKind, working_dir: &Path) -> InvokerSettings {
        let stage = self.pipeline.stage(kind);
        InvokerSettings::new(kind, working_dir.to_path_buf())
            .with_overall_timeout(Duration::from_secs(stage.timeout_secs))
            .with_activity_timeout(Duration::from_secs(self.activity_timeout_secs))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
