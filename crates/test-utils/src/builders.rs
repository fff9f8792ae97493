#![allow(dead_code)]

use jobdag::config::{ConfigFile, ConfigSection, ForceSection, PrioritySection, RawConfigFile};
use jobdag::types::LogLevel;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                force: ForceSection::default(),
                priority: PrioritySection::default(),
            },
        }
    }

    pub fn force_rule(mut self, rule: &str) -> Self {
        self.config.force.rules.push(rule.to_string());
        self
    }

    pub fn force_artifact(mut self, pattern: &str) -> Self {
        self.config.force.artifacts.push(pattern.to_string());
        self
    }

    pub fn force_all(mut self, val: bool) -> Self {
        self.config.force.all = val;
        self
    }

    pub fn priority_rule(mut self, rule: &str) -> Self {
        self.config.priority.rules.push(rule.to_string());
        self
    }

    pub fn priority_artifact(mut self, pattern: &str) -> Self {
        self.config.priority.artifacts.push(pattern.to_string());
        self
    }

    pub fn keep_going(mut self, val: bool) -> Self {
        self.config.config.keep_going = val;
        self
    }

    pub fn latency_wait(mut self, duration: &str) -> Self {
        self.config.config.latency_wait = duration.to_string();
        self
    }

    pub fn notemp(mut self, val: bool) -> Self {
        self.config.config.notemp = val;
        self
    }

    pub fn ignore_ambiguity(mut self, val: bool) -> Self {
        self.config.config.ignore_ambiguity = val;
        self
    }

    pub fn force_incomplete(mut self, val: bool) -> Self {
        self.config.config.force_incomplete = val;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.config.log_level = Some(level);
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
