//! A [`QueryRunner`] that replays canned outputs instead of spawning processes.

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use crate::dispatcher::{CommandOutput, QueryRunner, ShellCommand};
use crate::error::{IndexError, Result};

enum Reply {
    Output(CommandOutput),
    DispatchError(String),
}

/// Replies are consumed in order, one per command. Once the queue is empty
/// the fallback workspace (if any) answers by output format: `label_kind`
/// queries get the target listing, everything else the source listing.
#[derive(Default)]
pub struct ScriptedRunner {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<(String, String)>,
    delay: Option<Duration>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every query from a fixed workspace listing.
    pub fn workspace(targets: impl Into<String>, sources: impl Into<String>) -> Self {
        Self {
            fallback: Some((targets.into(), sources.into())),
            ..Self::default()
        }
    }

    pub fn with_success(self, stdout: &str) -> Self {
        self.push(Reply::Output(CommandOutput::new(stdout.to_string(), String::new(), 0)));
        self
    }

    pub fn with_failure(self, exit_code: i32, stderr: &str) -> Self {
        self.push(Reply::Output(CommandOutput::new(
            String::new(),
            stderr.to_string(),
            exit_code,
        )));
        self
    }

    pub fn with_dispatch_error(self, message: &str) -> Self {
        self.push(Reply::DispatchError(message.to_string()));
        self
    }

    /// Sleep this long before answering each command.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a failure after construction, e.g. between two refreshes.
    pub fn push_failure(&self, exit_code: i32, stderr: &str) {
        self.push(Reply::Output(CommandOutput::new(
            String::new(),
            stderr.to_string(),
            exit_code,
        )));
    }

    /// Command lines received so far.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }
}

impl QueryRunner for ScriptedRunner {
    fn run(&self, command: &dyn ShellCommand) -> Result<CommandOutput> {
        let line = command.command_line();
        self.commands.lock().unwrap().push(line.clone());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::DispatchError(message)) => Err(IndexError::dispatch(
                &line,
                io::Error::new(io::ErrorKind::Other, message),
            )),
            None => match &self.fallback {
                Some((targets, _)) if line.contains("label_kind") => {
                    Ok(CommandOutput::new(targets.clone(), String::new(), 0))
                }
                Some((_, sources)) => Ok(CommandOutput::new(sources.clone(), String::new(), 0)),
                None => Err(IndexError::dispatch(
                    &line,
                    io::Error::new(io::ErrorKind::NotFound, "no scripted reply"),
                )),
            },
        }
    }
}
