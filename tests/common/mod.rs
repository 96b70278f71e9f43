//! Scripted stand-in for the agent executable
//!
//! Each fake agent is a POSIX shell script in its own temp dir. It records
//! its arguments and any stdin line it reads, then replays a fixed transcript
//! or runs a caller-supplied shell body.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agent_session_engine::{AgentCli, OrchestratorConfig, SessionEvent, Subscription};
use tempfile::TempDir;

pub const AGENT_SESSION_ID: &str = "agent-123";
pub const RESULT_COST: f64 = 0.25;

pub const INIT: &str = r#"{"type":"system","subtype":"init","session_id":"agent-123","cwd":"/tmp","tools":["Read"],"model":"test-model"}"#;
pub const ASSISTANT: &str = r#"{"type":"assistant","message":{"model":"test-model","content":[{"type":"text","text":"hi there"}]},"session_id":"agent-123"}"#;
pub const RESULT_OK: &str = r#"{"type":"result","subtype":"success","is_error":false,"num_turns":1,"duration_ms":12,"duration_api_ms":10,"total_cost_usd":0.25,"result":"hi there","session_id":"agent-123"}"#;
const RESULT_ERROR: &str = r#"{"type":"result","subtype":"error_during_execution","is_error":true,"num_turns":1,"duration_ms":12,"duration_api_ms":10,"total_cost_usd":0.25,"session_id":"agent-123"}"#;
const ASSISTANT_ANONYMOUS: &str = r#"{"type":"assistant","message":{"model":"test-model","content":[{"type":"text","text":"hi there"}]}}"#;
const RESULT_ANONYMOUS: &str = r#"{"type":"result","subtype":"success","is_error":false,"num_turns":1,"duration_ms":12,"duration_api_ms":10,"total_cost_usd":0.25}"#;

/// What the fake agent does once started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// init, noise lines, assistant, successful result
    Complete,
    /// init, assistant, failed result
    Fails,
    /// assistant and result without ever announcing a session id
    Anonymous,
    /// init, then exits without a result
    Crashes,
    /// never answers; sleeps until killed
    Hangs,
}

pub struct FakeAgent {
    dir: TempDir,
    path: PathBuf,
    log: PathBuf,
    stdin_log: PathBuf,
}

impl FakeAgent {
    pub fn new(behavior: Behavior) -> Self {
        let transcript = match behavior {
            Behavior::Complete => vec![
                INIT,
                "",
                "this line is not json",
                r#"{"type":"mystery","payload":1}"#,
                ASSISTANT,
                RESULT_OK,
            ],
            Behavior::Fails => vec![INIT, ASSISTANT, RESULT_ERROR],
            Behavior::Anonymous => vec![ASSISTANT_ANONYMOUS, RESULT_ANONYMOUS],
            Behavior::Crashes => vec![INIT],
            Behavior::Hangs => vec![],
        };

        let mut body = String::new();
        for line in transcript {
            body.push_str(&echo(line));
        }
        if behavior == Behavior::Hangs {
            body.push_str("sleep 30\n");
        }
        Self::scripted(&body)
    }

    /// Agent that runs `body` after recording its arguments and stdin
    ///
    /// The body runs in the session's working directory, so relative paths
    /// land in [`workdir`](Self::workdir).
    pub fn scripted(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fake-agent");
        let log = dir.path().join("args.log");
        let stdin_log = dir.path().join("stdin.log");

        let mut script = String::from("#!/bin/sh\n");
        script.push_str(&format!(
            "for arg in \"$@\"; do printf '%s\\n' \"$arg\" >> '{}'; done\n",
            log.display()
        ));
        script.push_str(&format!("echo '---' >> '{}'\n", log.display()));
        script.push_str(&format!(
            "case \" $* \" in *\" --input-format \"*) IFS= read -r line && printf '%s\\n' \"$line\" >> '{}' ;; esac\n",
            stdin_log.display()
        ));
        script.push_str(body);

        fs::write(&path, script).expect("write fake agent");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod fake agent");

        Self {
            dir,
            path,
            log,
            stdin_log,
        }
    }

    /// Executable path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory sessions can run in
    pub fn workdir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Orchestrator configuration pointing at this agent
    pub fn config(&self) -> OrchestratorConfig {
        OrchestratorConfig::builder()
            .cli(AgentCli::path(&self.path))
            .shutdown_grace(Duration::from_millis(500))
            .build()
    }

    /// Argument lists of every launch, in order
    pub fn invocations(&self) -> Vec<Vec<String>> {
        let Ok(contents) = fs::read_to_string(&self.log) else {
            return Vec::new();
        };
        let mut runs = Vec::new();
        let mut current = Vec::new();
        for line in contents.lines() {
            if line == "---" {
                runs.push(std::mem::take(&mut current));
            } else {
                current.push(line.to_string());
            }
        }
        runs
    }

    /// Lines the agent read from stdin
    pub fn stdin_lines(&self) -> Vec<String> {
        fs::read_to_string(&self.stdin_log)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Shell line printing `line` verbatim
pub fn echo(line: &str) -> String {
    format!("echo '{line}'\n")
}

/// Whether a process with this pid still exists and has not exited
///
/// A zombie counts as gone; it may linger until its new parent reaps it.
pub fn pid_alive(pid: &str) -> bool {
    let proc_root = Path::new("/proc");
    if proc_root.is_dir() {
        let Ok(stat) = fs::read_to_string(proc_root.join(pid).join("stat")) else {
            return false;
        };
        // The state letter follows the parenthesised command name
        let state = stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next());
        return state.is_some_and(|s| s != "Z" && s != "X");
    }
    std::process::Command::new("kill")
        .args(["-0", pid])
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Value following `flag` in an argument list
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Wait for the next event matching `pred`, failing after five seconds
pub async fn wait_for(
    events: &mut Subscription,
    mut pred: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll `check` until it holds, failing after five seconds
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
