//! Scripted [`CommandRunner`] for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::runner::{CommandOutput, CommandRunner, RunError};

/// `status <name>` output for an established tunnel (instance `branch-a{3}`).
pub const STATUS_UP: &str = "\
Security Associations (1 up, 0 connecting):
    branch-a[2]: ESTABLISHED 4 minutes ago, 10.0.0.1[branch-a]...10.1.0.1[branch-a]
    branch-a{3}:  INSTALLED, TUNNEL, reqid 1, ESP SPIs: c2d4f0a1_i c8b1e2f3_o
    branch-a{3}:   10.0.0.0/24 === 10.1.0.0/24";

/// `status <name>` output for a loaded but idle tunnel.
pub const STATUS_DOWN: &str = "Security Associations (0 up, 0 connecting):\n  none";

#[derive(Debug, Clone)]
enum Scripted {
    Output(CommandOutput),
    Timeout,
}

/// Answers by joined argument string; unknown commands exit 0 silently.
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    replies: Arc<Mutex<HashMap<String, Scripted>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, args: &str, reply: Scripted) -> Self {
        self.replies.lock().unwrap().insert(args.to_string(), reply);
        self
    }

    /// Exit 0 with the given stdout.
    pub fn reply(self, args: &str, stdout: &str) -> Self {
        self.script(
            args,
            Scripted::Output(CommandOutput::from_text(Some(0), stdout, "")),
        )
    }

    /// Exit `code` with the given stderr.
    pub fn fail(self, args: &str, code: i32, stderr: &str) -> Self {
        self.script(
            args,
            Scripted::Output(CommandOutput::from_text(Some(code), "", stderr)),
        )
    }

    /// Never answer.
    pub fn time_out(self, args: &str) -> Self {
        self.script(args, Scripted::Timeout)
    }

    /// Every invocation so far, as joined argument strings.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for FakeRunner {
    async fn run(&self, args: &[&str]) -> Result<CommandOutput, RunError> {
        let key = args.join(" ");
        self.calls.lock().unwrap().push(key.clone());
        let reply = self.replies.lock().unwrap().get(&key).cloned();
        match reply {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::Timeout) => Err(RunError::Timeout(Duration::from_secs(30))),
            None => Ok(CommandOutput::from_text(Some(0), "", "")),
        }
    }
}
