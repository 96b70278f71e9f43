//! Configuration constants and types for subprocess transport

/// Default maximum length of one output line (1MB)
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Environment variables never forwarded from caller-supplied options
///
/// These variables change how the child loads and executes code.
pub const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "PATH",
    "NODE_OPTIONS",
    "PYTHONPATH",
    "PERL5LIB",
    "RUBYLIB",
];

/// How the first turn reaches the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptInput {
    /// One-shot: the prompt is a command-line argument and stdin is closed
    String(String),
    /// Streaming: turns are written to stdin as framed user messages
    Stream {
        /// Turn written right after spawn, if any
        first_turn: Option<String>,
    },
}

impl PromptInput {
    /// Streaming input with no turn yet
    #[must_use]
    pub const fn idle() -> Self {
        Self::Stream { first_turn: None }
    }

    /// Whether this is the streaming shape
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::Stream { .. })
    }
}

impl From<String> for PromptInput {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for PromptInput {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}
