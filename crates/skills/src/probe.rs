//! Executable availability probing.

use std::{process::Stdio, time::Duration};

use {
    async_trait::async_trait,
    serde::Serialize,
    tokio::process::Command,
    tracing::debug,
};

/// How long a `--version` probe may run before it counts as unavailable.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of probing one executable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeOutcome {
    Available,
    Unavailable,
    TimedOut,
}

impl ProbeOutcome {
    pub fn is_available(self) -> bool {
        self == Self::Available
    }
}

/// Answers "can this executable be run here?".
#[async_trait]
pub trait CommandProbe: Send + Sync {
    async fn probe(&self, name: &str) -> ProbeOutcome;
}

/// Probes the host: a `PATH` lookup first, then `<name> --version` run
/// directly (never through a shell) under a timeout.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    timeout: Duration,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CommandProbe for SystemProbe {
    async fn probe(&self, name: &str) -> ProbeOutcome {
        if name.is_empty() {
            return ProbeOutcome::Unavailable;
        }
        if which::which(name).is_ok() {
            return ProbeOutcome::Available;
        }

        let child = Command::new(name)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(status)) if status.success() => ProbeOutcome::Available,
            Ok(Ok(status)) => {
                debug!(bin = name, %status, "version probe exited unsuccessfully");
                ProbeOutcome::Unavailable
            },
            Ok(Err(e)) => {
                debug!(bin = name, error = %e, "version probe failed to spawn");
                ProbeOutcome::Unavailable
            },
            Err(_) => {
                debug!(bin = name, timeout_ms = self.timeout.as_millis() as u64, "version probe timed out");
                ProbeOutcome::TimedOut
            },
        }
    }
}
