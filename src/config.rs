//! Orchestrator configuration
//!
//! Which agent executable to run, the options every session starts from and
//! how long teardown waits before killing a process tree.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::types::options::AgentOptions;
use crate::types::permissions::PermissionMode;

/// Default wait for a graceful exit before the process tree is killed
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Executable name looked up on `PATH` by [`AgentCli::discover`]
pub const DEFAULT_CLI_NAME: &str = "claude";

/// Custom executable resolver
pub type CliResolver = Arc<dyn Fn() -> Option<PathBuf> + Send + Sync>;

/// How the agent executable is located
#[derive(Clone)]
pub enum AgentCli {
    /// Fixed path
    Path(PathBuf),
    /// Resolver invoked on every launch
    Resolver(CliResolver),
    /// Search `PATH` and the usual install locations
    Discover,
}

impl AgentCli {
    /// Use a fixed executable path
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Use a custom resolver
    pub fn resolver(f: impl Fn() -> Option<PathBuf> + Send + Sync + 'static) -> Self {
        Self::Resolver(Arc::new(f))
    }

    /// Search for the executable at launch time
    #[must_use]
    pub const fn discover() -> Self {
        Self::Discover
    }

    /// Resolve the executable path
    ///
    /// # Errors
    /// Returns `AgentError::LaunchFailure` if no executable could be found
    pub fn resolve(&self) -> Result<PathBuf> {
        match self {
            Self::Path(path) => Ok(path.clone()),
            Self::Resolver(resolve) => resolve().ok_or_else(|| {
                AgentError::launch_failure("Agent executable resolver returned no path")
            }),
            Self::Discover => find_cli(),
        }
    }
}

impl Default for AgentCli {
    fn default() -> Self {
        Self::Discover
    }
}

impl fmt::Debug for AgentCli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
            Self::Discover => f.write_str("Discover"),
        }
    }
}

/// Find the agent binary
///
/// # Errors
/// Returns error if the binary cannot be found in PATH or common locations
fn find_cli() -> Result<PathBuf> {
    if let Ok(path) = which::which(DEFAULT_CLI_NAME) {
        return Ok(path);
    }

    let home = env::var("HOME").map(PathBuf::from).unwrap_or_default();
    let locations = [
        home.join(".npm-global/bin").join(DEFAULT_CLI_NAME),
        PathBuf::from("/usr/local/bin").join(DEFAULT_CLI_NAME),
        home.join(".local/bin").join(DEFAULT_CLI_NAME),
        home.join("node_modules/.bin").join(DEFAULT_CLI_NAME),
        home.join(".yarn/bin").join(DEFAULT_CLI_NAME),
        home.join(".claude/local").join(DEFAULT_CLI_NAME),
    ];

    locations
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(AgentError::cli_not_found)
}

// ============================================================================
// Orchestrator Configuration
// ============================================================================

/// Orchestrator-wide settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Agent executable
    pub cli: AgentCli,
    /// Options every session starts from; per-call overrides win
    pub defaults: AgentOptions,
    /// Wait for a graceful exit before killing the process tree
    pub shutdown_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cli: AgentCli::default(),
            defaults: AgentOptions::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl OrchestratorConfig {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    /// Load configuration from the process environment
    ///
    /// Reads `AGENT_CLI_PATH`, `AGENT_MODEL`, `AGENT_PERMISSION_MODE`,
    /// `AGENT_SKIP_PERMISSIONS` and `AGENT_SHUTDOWN_GRACE_SECS`. Unset
    /// variables keep their defaults.
    ///
    /// # Errors
    /// Returns `AgentError::InvalidConfig` if a variable holds an invalid value
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// # Errors
    /// Returns `AgentError::InvalidConfig` if a variable holds an invalid value
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut builder = Self::builder();

        if let Some(path) = var("AGENT_CLI_PATH") {
            builder = builder.cli(AgentCli::path(path));
        }

        let mut defaults = AgentOptions::builder();
        if let Some(model) = var("AGENT_MODEL") {
            defaults = defaults.model(model);
        }
        if let Some(mode) = var("AGENT_PERMISSION_MODE") {
            defaults = defaults.permission_mode(mode.trim().parse::<PermissionMode>()?);
        }
        if let Some(flag) = var("AGENT_SKIP_PERMISSIONS") {
            defaults = defaults.skip_permissions(parse_flag("AGENT_SKIP_PERMISSIONS", &flag)?);
        }
        builder = builder.defaults(defaults.build());

        if let Some(secs) = var("AGENT_SHUTDOWN_GRACE_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                AgentError::invalid_config(format!(
                    "AGENT_SHUTDOWN_GRACE_SECS must be a whole number of seconds, got {secs:?}"
                ))
            })?;
            builder = builder.shutdown_grace(Duration::from_secs(secs));
        }

        Ok(builder.build())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AgentError::invalid_config(format!(
            "{key} must be a boolean, got {other:?}"
        ))),
    }
}

/// Builder for `OrchestratorConfig`
#[derive(Debug, Default)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    /// Set the agent executable
    #[must_use]
    pub fn cli(mut self, cli: AgentCli) -> Self {
        self.config.cli = cli;
        self
    }

    /// Set the default session options
    #[must_use]
    pub fn defaults(mut self, defaults: AgentOptions) -> Self {
        self.config.defaults = defaults;
        self
    }

    /// Set the teardown grace period
    #[must_use]
    pub const fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> OrchestratorConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_keeps_defaults() {
        let config = OrchestratorConfig::from_lookup(lookup(&[])).unwrap();
        assert!(matches!(config.cli, AgentCli::Discover));
        assert_eq!(config.shutdown_grace, DEFAULT_SHUTDOWN_GRACE);
        assert_eq!(config.defaults, AgentOptions::default());
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            ("AGENT_CLI_PATH", "/opt/agent/bin/claude"),
            ("AGENT_MODEL", "sonnet"),
            ("AGENT_PERMISSION_MODE", "acceptEdits"),
            ("AGENT_SKIP_PERMISSIONS", "yes"),
            ("AGENT_SHUTDOWN_GRACE_SECS", "2"),
        ]))
        .unwrap();

        assert_eq!(
            config.cli.resolve().unwrap(),
            PathBuf::from("/opt/agent/bin/claude")
        );
        assert_eq!(config.defaults.model.as_deref(), Some("sonnet"));
        assert_eq!(
            config.defaults.permission_mode,
            Some(PermissionMode::AcceptEdits)
        );
        assert!(config.defaults.skip_permissions);
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = OrchestratorConfig::from_lookup(lookup(&[("AGENT_PERMISSION_MODE", "yolo")]))
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));

        let err = OrchestratorConfig::from_lookup(lookup(&[("AGENT_SKIP_PERMISSIONS", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));

        let err =
            OrchestratorConfig::from_lookup(lookup(&[("AGENT_SHUTDOWN_GRACE_SECS", "soon")]))
                .unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));
    }

    #[test]
    fn resolver_failure_is_a_launch_failure() {
        let cli = AgentCli::resolver(|| None);
        assert!(matches!(cli.resolve(), Err(AgentError::LaunchFailure(_))));
        assert_eq!(format!("{cli:?}"), "Resolver(..)");
    }
}
