// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::types::LogLevel;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// ignore_ambiguity = false
/// latency_wait = "5s"
/// keep_going = true
///
/// [force]
/// rules = ["clean"]
/// artifacts = ["report.txt"]
///
/// [priority]
/// rules = ["report"]
/// artifacts = ["results/**"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    /// Engine behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Jobs to run regardless of their state, from `[force]`.
    #[serde(default)]
    pub force: ForceSection,

    /// Jobs whose upstream should be scheduled first, from `[priority]`.
    #[serde(default)]
    pub priority: PrioritySection,
}

/// Validated configuration. Obtain one through `TryFrom<RawConfigFile>`
/// (see `validate.rs`) or [`ConfigFile::default`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub force: ForceSection,
    pub priority: PrioritySection,
    latency_wait: Duration,
}

impl ConfigFile {
    /// Construct without validation. Only `validate.rs` calls this.
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        force: ForceSection,
        priority: PrioritySection,
        latency_wait: Duration,
    ) -> Self {
        Self {
            config,
            force,
            priority,
            latency_wait,
        }
    }

    /// Parsed `[config].latency_wait`.
    pub fn latency_wait(&self) -> Duration {
        self.latency_wait
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(
            ConfigSection::default(),
            ForceSection::default(),
            PrioritySection::default(),
            Duration::from_secs(DEFAULT_LATENCY_WAIT_SECS),
        )
    }
}

const DEFAULT_LATENCY_WAIT_SECS: u64 = 5;

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Accept the first of several equally specific producers instead of
    /// failing.
    #[serde(default)]
    pub ignore_ambiguity: bool,

    /// Rebuild artifacts left behind by an interrupted run instead of
    /// failing.
    #[serde(default)]
    pub force_incomplete: bool,

    /// Do not look for artifacts of interrupted runs at all.
    #[serde(default)]
    pub ignore_incomplete: bool,

    /// Never delete temporary artifacts.
    #[serde(default)]
    pub notemp: bool,

    /// How long to wait for outputs of a finished job to appear, e.g. `"5s"`.
    #[serde(default = "default_latency_wait")]
    pub latency_wait: String,

    /// Keep scheduling independent jobs after a job failed.
    #[serde(default)]
    pub keep_going: bool,

    #[serde(default)]
    pub rerun_on_code_change: bool,

    #[serde(default)]
    pub rerun_on_version_change: bool,

    /// Overrides `JOBDAG_LOG` when set.
    #[serde(default)]
    pub log_level: Option<LogLevel>,
}

fn default_latency_wait() -> String {
    format!("{DEFAULT_LATENCY_WAIT_SECS}s")
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            ignore_ambiguity: false,
            force_incomplete: false,
            ignore_incomplete: false,
            notemp: false,
            latency_wait: default_latency_wait(),
            keep_going: false,
            rerun_on_code_change: false,
            rerun_on_version_change: false,
            log_level: None,
        }
    }
}

/// `[force]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForceSection {
    /// Force every job.
    #[serde(default)]
    pub all: bool,

    /// Rule names whose jobs are forced.
    #[serde(default)]
    pub rules: Vec<String>,

    /// Glob patterns; a job producing a matching artifact is forced.
    #[serde(default)]
    pub artifacts: Vec<String>,
}

/// `[priority]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrioritySection {
    #[serde(default)]
    pub rules: Vec<String>,

    /// Glob patterns over job outputs.
    #[serde(default)]
    pub artifacts: Vec<String>,
}
