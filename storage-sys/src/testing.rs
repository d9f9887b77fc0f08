// SPDX-License-Identifier: GPL-3.0-only

//! Test doubles for [`CommandRunner`] and [`MetadataSource`]

use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cmd::{CommandLine, CommandRunner};
use crate::error::{Result, SysError};
use crate::metadata::MetadataSource;

#[derive(Debug, Clone)]
enum Reply {
    Stdout(String),
    Fail,
}

/// Records every command and answers from a prefix-matched script.
///
/// A command matches a rule when its rendered form starts with the rule's
/// prefix; the most recently added matching rule wins. Unmatched commands
/// succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, Reply)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `stdout`
    pub fn respond(&self, prefix: &str, stdout: &str) -> &Self {
        self.push(prefix, Reply::Stdout(stdout.to_string()))
    }

    /// Make commands starting with `prefix` exit with status 1
    pub fn fail(&self, prefix: &str) -> &Self {
        self.push(prefix, Reply::Fail)
    }

    fn push(&self, prefix: &str, reply: Reply) -> &Self {
        self.rules
            .lock()
            .expect("rules lock")
            .push((prefix.to_string(), reply));
        self
    }

    /// Rendered commands, in execution order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Index of the first call starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|call| call.starts_with(prefix))
    }

    pub fn was_called(&self, prefix: &str) -> bool {
        self.position(prefix).is_some()
    }

    fn answer(&self, command: &CommandLine) -> Result<String> {
        let rendered = command.render();
        self.calls
            .lock()
            .expect("calls lock")
            .push(rendered.clone());

        let reply = self
            .rules
            .lock()
            .expect("rules lock")
            .iter()
            .rev()
            .find(|(prefix, _)| rendered.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(Reply::Stdout(stdout)) => Ok(stdout),
            Some(Reply::Fail) => Err(SysError::CommandFailed {
                command: rendered,
                status: ExitStatus::from_raw(1 << 8),
                stderr: "scripted failure".to_string(),
            }),
            None => Ok(String::new()),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandLine) -> Result<()> {
        self.answer(command).map(|_| ())
    }

    async fn output(&self, command: &CommandLine) -> Result<String> {
        self.answer(command)
    }
}

/// Metadata served from an in-memory map
#[derive(Debug, Default, Clone)]
pub struct StaticMetadata {
    values: HashMap<String, String>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl MetadataSource for StaticMetadata {
    async fn fetch(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
