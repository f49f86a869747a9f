use serde::{Deserialize, Serialize};

/// One source-to-destination mirroring operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorJob {
    pub name: String,
    /// Shown in the status line next to the progress summary
    pub icon: String,
    pub source: String,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl MirrorJob {
    pub fn new(name: &str, icon: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            icon: icon.to_string(),
            source: source.to_string(),
            exclude: Vec::new(),
        }
    }

    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }
}

/// An external program the run depends on that could not be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTool {
    pub name: String,
    pub install_hint: String,
}

impl MissingTool {
    pub fn new(name: &str, install_hint: &str) -> Self {
        Self {
            name: name.to_string(),
            install_hint: install_hint.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed {
        /// None when the process never started or was killed by a signal
        exit_code: Option<i32>,
        stderr: String,
    },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

/// How a single invocation of the orchestrator ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A successful run finished within the last 24 hours
    AlreadyRanToday,
    NoServerAvailable,
    /// Metered connection, slow uplink, or a missing speed-test tool
    LinkRejected,
    Completed,
    JobsFailed { failed: Vec<String> },
}
