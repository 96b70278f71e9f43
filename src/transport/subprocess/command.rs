//! Command-line building for the agent process

use std::path::Path;

use tokio::process::Command;

use crate::types::options::{AgentOptions, SystemPrompt};

use super::config::PromptInput;

/// Command builder for the agent executable
pub struct CommandBuilder<'a> {
    cli_path: &'a Path,
    prompt: &'a PromptInput,
    options: &'a AgentOptions,
}

impl<'a> CommandBuilder<'a> {
    /// Create a new command builder
    #[must_use]
    pub const fn new(cli_path: &'a Path, prompt: &'a PromptInput, options: &'a AgentOptions) -> Self {
        Self {
            cli_path,
            prompt,
            options,
        }
    }

    /// Every argument after the executable, in order
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();

        match self.prompt {
            PromptInput::String(prompt) => {
                args.push("-p".to_string());
                args.push(self.options.prefixed_prompt(prompt));
            }
            PromptInput::Stream { .. } => {
                push(&mut args, ["--print", "--input-format", "stream-json"]);
            }
        }
        push(&mut args, ["--output-format", "stream-json", "--verbose"]);

        match &self.options.system_prompt {
            Some(SystemPrompt::Replace(text)) => push_pair(&mut args, "--system-prompt", text),
            Some(SystemPrompt::Append(text)) => {
                push_pair(&mut args, "--append-system-prompt", text);
            }
            None => {}
        }

        self.add_tool_args(&mut args);
        self.add_configuration_args(&mut args);
        self.add_session_args(&mut args);
        args.extend(self.options.extra_args.iter().cloned());

        args
    }

    /// Shell-escaped rendering of the full command, for logs and errors
    #[must_use]
    pub fn command_line(&self) -> String {
        let program = self.cli_path.to_string_lossy().into_owned();
        let args = self.args();
        let words = std::iter::once(program.as_str()).chain(args.iter().map(String::as_str));
        shlex::try_join(words.clone()).unwrap_or_else(|_| words.collect::<Vec<_>>().join(" "))
    }

    /// Build the process command; argv goes to the OS without a shell
    #[must_use]
    pub fn build(&self) -> Command {
        let mut cmd = Command::new(self.cli_path);
        cmd.args(self.args());
        cmd
    }

    /// Tool lists repeat the flag once per tool
    fn add_tool_args(&self, args: &mut Vec<String>) {
        for tool in &self.options.allowed_tools {
            push_pair(args, "--allowedTools", tool.as_str());
        }
        for tool in &self.options.disallowed_tools {
            push_pair(args, "--disallowedTools", tool.as_str());
        }
    }

    /// Add configuration arguments (model, max turns, permissions)
    fn add_configuration_args(&self, args: &mut Vec<String>) {
        if let Some(max_turns) = self.options.max_turns {
            push_pair(args, "--max-turns", &max_turns.to_string());
        }

        if let Some(ref model) = self.options.model {
            push_pair(args, "--model", model);
        }

        if let Some(mode) = self.options.permission_mode {
            push_pair(args, "--permission-mode", mode.as_str());
        }

        if self.options.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
    }

    /// Add session-related arguments
    fn add_session_args(&self, args: &mut Vec<String>) {
        if self.options.continue_conversation {
            args.push("--continue".to_string());
        }

        if let Some(ref session_id) = self.options.resume {
            push_pair(args, "--resume", session_id.as_str());
        }

        if self.options.fork_session {
            args.push("--fork-session".to_string());
        }

        for dir in &self.options.add_dirs {
            push_pair(args, "--add-dir", &dir.to_string_lossy());
        }

        if self.options.include_partial_messages {
            args.push("--include-partial-messages".to_string());
        }
    }
}

fn push<const N: usize>(args: &mut Vec<String>, words: [&str; N]) {
    args.extend(words.iter().map(|w| (*w).to_string()));
}

fn push_pair(args: &mut Vec<String>, flag: &str, value: &str) {
    args.push(flag.to_string());
    args.push(value.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::permissions::PermissionMode;

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    #[test]
    fn one_shot_puts_prompt_after_p_flag() {
        let prompt = PromptInput::from("fix the tests");
        let options = AgentOptions::default();
        let args = CommandBuilder::new(Path::new("agent"), &prompt, &options).args();

        assert_eq!(args[0], "-p");
        assert_eq!(args[1], "fix the tests");
        assert!(position(&args, "--input-format").is_none());
        assert!(position(&args, "--verbose").is_some());
        let fmt = position(&args, "--output-format").unwrap();
        assert_eq!(args[fmt + 1], "stream-json");
    }

    #[test]
    fn streaming_shape_has_no_prompt_argument() {
        let prompt = PromptInput::Stream {
            first_turn: Some("hello".to_string()),
        };
        let options = AgentOptions::default();
        let args = CommandBuilder::new(Path::new("agent"), &prompt, &options).args();

        assert_eq!(&args[..3], ["--print", "--input-format", "stream-json"]);
        assert!(!args.iter().any(|a| a == "hello"));
        assert!(position(&args, "-p").is_none());
    }

    #[test]
    fn prefix_is_applied_to_one_shot_prompt() {
        let prompt = PromptInput::from("task");
        let options = AgentOptions::builder().prompt_prefix("context").build();
        let args = CommandBuilder::new(Path::new("agent"), &prompt, &options).args();
        assert_eq!(args[1], "context\n\ntask");
    }

    #[test]
    fn options_become_flags() {
        let prompt = PromptInput::idle();
        let options = AgentOptions::builder()
            .resume("abc-123")
            .fork_session(true)
            .model("opus")
            .max_turns(7)
            .permission_mode(PermissionMode::Plan)
            .skip_permissions(true)
            .allowed_tools(vec!["Read", "Grep"])
            .disallowed_tools(vec!["Bash"])
            .add_dir("/tmp/extra")
            .append_system_prompt("be brief")
            .include_partial_messages(true)
            .raw_args("--debug 'api hooks'")
            .build();
        let args = CommandBuilder::new(Path::new("agent"), &prompt, &options).args();

        let resume = position(&args, "--resume").unwrap();
        assert_eq!(args[resume + 1], "abc-123");
        assert!(position(&args, "--fork-session").is_some());
        assert_eq!(args[position(&args, "--model").unwrap() + 1], "opus");
        assert_eq!(args[position(&args, "--max-turns").unwrap() + 1], "7");
        assert_eq!(args[position(&args, "--permission-mode").unwrap() + 1], "plan");
        assert!(position(&args, "--dangerously-skip-permissions").is_some());
        assert_eq!(args.iter().filter(|a| *a == "--allowedTools").count(), 2);
        assert_eq!(
            args[position(&args, "--disallowedTools").unwrap() + 1],
            "Bash"
        );
        assert_eq!(args[position(&args, "--add-dir").unwrap() + 1], "/tmp/extra");
        assert_eq!(
            args[position(&args, "--append-system-prompt").unwrap() + 1],
            "be brief"
        );
        assert!(position(&args, "--include-partial-messages").is_some());
        assert_eq!(&args[args.len() - 2..], ["--debug", "api hooks"]);
    }

    #[test]
    fn command_line_quotes_whitespace() {
        let prompt = PromptInput::from("say \"hi\" twice");
        let options = AgentOptions::default();
        let line = CommandBuilder::new(Path::new("/usr/bin/agent"), &prompt, &options).command_line();

        assert!(line.starts_with("/usr/bin/agent -p "));
        assert_eq!(shlex::split(&line).unwrap()[2], "say \"hi\" twice");
    }
}
