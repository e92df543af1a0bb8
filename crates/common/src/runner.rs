//! Command execution seam
//!
//! Provisioning steps shell out to `wg`, `ip`, `systemctl` and friends
//! through this trait so the transport can change (local exec today, remote
//! exec later) without touching the step logic.

use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;

/// Captured output of one command
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    /// A successful output with the given stdout, for scripted runners
    pub fn ok(stdout: &str) -> Self {
        Self {
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    /// A failed output with the given stderr, for scripted runners
    pub fn fail(stderr: &str) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

/// Executes argv-style commands on the target host
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String]) -> Result<CmdOutput>;
}

/// Run a command and fail unless it exits successfully
pub async fn run_checked(runner: &dyn CommandRunner, argv: &[String]) -> Result<CmdOutput> {
    let output = runner.run(argv).await?;
    if !output.success {
        return Err(Error::CommandFailed {
            program: argv.join(" "),
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

/// Wrap a shell fragment for steps that need redirection or `||` chains
pub fn sh(command: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), command.to_string()]
}

/// Build an argv from string literals
pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Runs commands on the local host
#[derive(Debug, Clone, Default)]
pub struct LocalRunner;

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, argv: &[String]) -> Result<CmdOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Internal("empty argv".to_string()))?;

        debug!("exec: {}", argv.join(" "));
        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await?;

        Ok(CmdOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Scripted runner for tests: records every argv and answers through a
/// caller-supplied responder.
pub struct ScriptedRunner {
    calls: Mutex<Vec<Vec<String>>>,
    respond: Box<dyn Fn(&[String]) -> CmdOutput + Send + Sync>,
}

impl ScriptedRunner {
    pub fn new(respond: impl Fn(&[String]) -> CmdOutput + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    /// Everything that was executed, in order
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Flattened calls, for substring assertions
    pub fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.join(" ")).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, argv: &[String]) -> Result<CmdOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(argv.to_vec());
        }
        Ok((self.respond)(argv))
    }
}
