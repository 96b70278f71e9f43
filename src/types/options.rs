//! Agent invocation options and configuration
//!
//! This module contains the typed options that become the agent's command
//! line, including a builder pattern for easy configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use super::identifiers::{AgentSessionId, ToolName};
use super::permissions::PermissionMode;

/// Upper bound accepted for `max_turns`
pub const MAX_ALLOWED_TURNS: u32 = 1000;

/// System prompt configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemPrompt {
    /// Replace the agent's system prompt entirely (`--system-prompt`)
    Replace(String),
    /// Append to the agent's default system prompt (`--append-system-prompt`)
    Append(String),
}

impl From<String> for SystemPrompt {
    fn from(s: String) -> Self {
        Self::Replace(s)
    }
}

impl From<&str> for SystemPrompt {
    fn from(s: &str) -> Self {
        Self::Replace(s.to_string())
    }
}

// ============================================================================
// Agent Options
// ============================================================================

/// Options for one agent process invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOptions {
    /// Working directory for the agent process
    pub cwd: Option<PathBuf>,
    /// Agent session ID to resume from
    pub resume: Option<AgentSessionId>,
    /// Whether to continue the most recent conversation in `cwd`
    pub continue_conversation: bool,
    /// Whether a resumed session forks into a new agent session id
    pub fork_session: bool,
    /// Model to use
    pub model: Option<String>,
    /// Maximum number of turns before stopping
    pub max_turns: Option<u32>,
    /// Permission mode for tool execution
    pub permission_mode: Option<PermissionMode>,
    /// Skip every permission prompt (`--dangerously-skip-permissions`)
    pub skip_permissions: bool,
    /// Tools the agent is allowed to use
    pub allowed_tools: Vec<ToolName>,
    /// Tools the agent is not allowed to use
    pub disallowed_tools: Vec<ToolName>,
    /// Additional directories the agent may access
    pub add_dirs: Vec<PathBuf>,
    /// System prompt configuration
    pub system_prompt: Option<SystemPrompt>,
    /// Text placed before the first turn's prompt
    pub prompt_prefix: Option<String>,
    /// Emit `stream_event` partial updates
    pub include_partial_messages: bool,
    /// Raw arguments appended verbatim to the command line
    pub extra_args: Vec<String>,
    /// Environment variables for the agent process
    pub env: HashMap<String, String>,
    /// Maximum length of one output line in bytes (default: 1MB)
    pub max_buffer_size: Option<usize>,
}

impl AgentOptions {
    /// Create a new builder for `AgentOptions`
    #[must_use]
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::default()
    }

    /// Apply `prompt_prefix` to the text of a first turn
    #[must_use]
    pub fn prefixed_prompt(&self, prompt: &str) -> String {
        match self.prompt_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}\n\n{prompt}"),
            _ => prompt.to_string(),
        }
    }

    /// Fill every unset field from `defaults`
    ///
    /// Lists and maps are concatenated, defaults first.
    #[must_use]
    pub fn with_defaults(mut self, defaults: &Self) -> Self {
        self.cwd = self.cwd.or_else(|| defaults.cwd.clone());
        self.model = self.model.or_else(|| defaults.model.clone());
        self.max_turns = self.max_turns.or(defaults.max_turns);
        self.permission_mode = self.permission_mode.or(defaults.permission_mode);
        self.skip_permissions |= defaults.skip_permissions;
        self.include_partial_messages |= defaults.include_partial_messages;
        self.system_prompt = self.system_prompt.or_else(|| defaults.system_prompt.clone());
        self.prompt_prefix = self.prompt_prefix.or_else(|| defaults.prompt_prefix.clone());
        self.max_buffer_size = self.max_buffer_size.or(defaults.max_buffer_size);

        self.allowed_tools = prepend(&defaults.allowed_tools, self.allowed_tools);
        self.disallowed_tools = prepend(&defaults.disallowed_tools, self.disallowed_tools);
        self.add_dirs = prepend(&defaults.add_dirs, self.add_dirs);
        self.extra_args = prepend(&defaults.extra_args, self.extra_args);
        for (key, value) in &defaults.env {
            self.env.entry(key.clone()).or_insert_with(|| value.clone());
        }
        self
    }
}

fn prepend<T: Clone>(head: &[T], tail: Vec<T>) -> Vec<T> {
    let mut out = head.to_vec();
    out.extend(tail);
    out
}

// ============================================================================
// Builder for AgentOptions
// ============================================================================

/// Builder for `AgentOptions`
#[derive(Debug, Default)]
pub struct AgentOptionsBuilder {
    options: AgentOptions,
}

impl AgentOptionsBuilder {
    /// Set working directory
    #[must_use]
    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(path.into());
        self
    }

    /// Resume an agent session
    #[must_use]
    pub fn resume(mut self, session_id: impl Into<AgentSessionId>) -> Self {
        self.options.resume = Some(session_id.into());
        self
    }

    /// Continue the most recent conversation
    #[must_use]
    pub const fn continue_conversation(mut self, value: bool) -> Self {
        self.options.continue_conversation = value;
        self
    }

    /// Fork the resumed session
    #[must_use]
    pub const fn fork_session(mut self, value: bool) -> Self {
        self.options.fork_session = value;
        self
    }

    /// Set model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    /// Set max turns
    ///
    /// # Panics
    /// Panics if turns exceeds 1000
    #[must_use]
    pub fn max_turns(mut self, turns: u32) -> Self {
        assert!(
            turns <= MAX_ALLOWED_TURNS,
            "max_turns {turns} exceeds maximum allowed: {MAX_ALLOWED_TURNS}"
        );
        self.options.max_turns = Some(turns);
        self
    }

    /// Set permission mode
    #[must_use]
    pub const fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.options.permission_mode = Some(mode);
        self
    }

    /// Skip all permission prompts
    #[must_use]
    pub const fn skip_permissions(mut self, value: bool) -> Self {
        self.options.skip_permissions = value;
        self
    }

    /// Set allowed tools
    #[must_use]
    pub fn allowed_tools(mut self, tools: Vec<impl Into<ToolName>>) -> Self {
        self.options.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Add an allowed tool
    #[must_use]
    pub fn add_allowed_tool(mut self, tool: impl Into<ToolName>) -> Self {
        self.options.allowed_tools.push(tool.into());
        self
    }

    /// Set disallowed tools
    #[must_use]
    pub fn disallowed_tools(mut self, tools: Vec<impl Into<ToolName>>) -> Self {
        self.options.disallowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Add an additional accessible directory
    #[must_use]
    pub fn add_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.add_dirs.push(path.into());
        self
    }

    /// Set system prompt
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<SystemPrompt>) -> Self {
        self.options.system_prompt = Some(prompt.into());
        self
    }

    /// Append text to the default system prompt
    #[must_use]
    pub fn append_system_prompt(mut self, text: impl Into<String>) -> Self {
        self.options.system_prompt = Some(SystemPrompt::Append(text.into()));
        self
    }

    /// Place text before the first turn's prompt
    #[must_use]
    pub fn prompt_prefix(mut self, text: impl Into<String>) -> Self {
        self.options.prompt_prefix = Some(text.into());
        self
    }

    /// Emit partial-update stream events
    #[must_use]
    pub const fn include_partial_messages(mut self, value: bool) -> Self {
        self.options.include_partial_messages = value;
        self
    }

    /// Append a raw argument
    #[must_use]
    pub fn extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.options.extra_args.push(arg.into());
        self
    }

    /// Append raw arguments parsed with shell quoting rules
    ///
    /// Input that does not parse (an unbalanced quote) is ignored with a warning.
    #[must_use]
    pub fn raw_args(mut self, line: &str) -> Self {
        match shlex::split(line) {
            Some(args) => self.options.extra_args.extend(args),
            None => log::warn!("Ignoring unparsable raw arguments: {line}"),
        }
        self
    }

    /// Set an environment variable for the agent process
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.insert(key.into(), value.into());
        self
    }

    /// Set the maximum output line length
    #[must_use]
    pub const fn max_buffer_size(mut self, bytes: usize) -> Self {
        self.options.max_buffer_size = Some(bytes);
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> AgentOptions {
        self.options
    }
}
