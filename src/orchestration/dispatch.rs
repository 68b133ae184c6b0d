//! The agent dispatch seam.
//!
//! The coordinator only ever sees [`AgentDispatch`]: an opaque, possibly
//! slow, possibly failing external call, selected by a task's capability
//! tag. Two implementations live here — one that shells out to the
//! configured agent program, and one that simulates completion for dry
//! runs. Timeouts are the coordinator's concern, not the dispatcher's.

use crate::config::Config;
use crate::core::Task;
use crate::error::{Error, Result};
use crate::project::ContextHints;
use crate::stlog_trace;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// Maximum number of hint files listed in a rendered prompt.
const MAX_PROMPT_FILES: usize = 20;

/// External execution of a single task by an agent worker.
#[async_trait]
pub trait AgentDispatch: Send + Sync {
    /// Execute the task, returning its output text.
    ///
    /// # Errors
    /// `Error::DispatchFailed` when the worker reports failure. The
    /// caller is responsible for bounding the call with a timeout.
    async fn dispatch(&self, task: &Task, hints: &ContextHints) -> Result<String>;
}

/// Render the prompt handed to an agent worker for one task.
///
/// The capability tag leads so the worker can route itself; hints are
/// appended as plain context.
pub fn render_prompt(task: &Task, hints: &ContextHints) -> String {
    let mut prompt = format!(
        "[{}] {}\nSuccess criterion: {}",
        task.capability, task.description, task.success_criterion
    );
    if !hints.files.is_empty() {
        prompt.push_str("\nRelevant files:");
        for file in hints.files.iter().take(MAX_PROMPT_FILES) {
            prompt.push_str(&format!("\n  {}", file.display()));
        }
        if hints.files.len() > MAX_PROMPT_FILES {
            prompt.push_str(&format!(
                "\n  ... and {} more",
                hints.files.len() - MAX_PROMPT_FILES
            ));
        }
    }
    for note in &hints.notes {
        prompt.push_str(&format!("\nNote: {}", note));
    }
    prompt
}

/// Dispatcher that runs the configured agent program as a subprocess.
///
/// The configured command line (for example
/// `claude --dangerously-skip-permissions`) is split once at
/// construction; each dispatch appends the rendered prompt as the final
/// argument. Stdout becomes the task result; a non-zero exit is a
/// dispatch failure carrying stderr.
pub struct ProcessDispatch {
    program: String,
    base_args: Vec<String>,
    cwd: PathBuf,
}

impl ProcessDispatch {
    /// Build a dispatcher from the configured agent command line.
    pub fn from_config(config: &Config, cwd: PathBuf) -> Self {
        let mut parts = config
            .effective_command()
            .split_whitespace()
            .map(String::from);
        let program = parts.next().unwrap_or_else(|| "claude".to_string());
        Self {
            program,
            base_args: parts.collect(),
            cwd,
        }
    }

    /// The agent program dispatches will spawn.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Check that the agent program exists before starting a run.
    pub fn check_available(&self) -> Result<()> {
        if which::which(&self.program).is_ok() {
            Ok(())
        } else {
            Err(Error::AgentNotAvailable(self.program.clone()))
        }
    }
}

#[async_trait]
impl AgentDispatch for ProcessDispatch {
    async fn dispatch(&self, task: &Task, hints: &ContextHints) -> Result<String> {
        let prompt = render_prompt(task, hints);
        stlog_trace!("ProcessDispatch task={} program={}", task.name, self.program);

        let output = Command::new(&self.program)
            .args(&self.base_args)
            .arg(&prompt)
            .current_dir(&self.cwd)
            .output()
            .await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!(
                    "agent exited with code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            Err(Error::DispatchFailed {
                task: task.name.clone(),
                message,
            })
        }
    }
}

/// Dispatcher that completes every task without external work.
///
/// Used by `--dry-run` to exercise planning, staging, and persistence
/// end to end. Deterministic: the output names the capability and task.
pub struct SimulatedDispatch {
    delay: Duration,
}

impl SimulatedDispatch {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    /// Simulate slow workers, mainly for exercising concurrency.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedDispatch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentDispatch for SimulatedDispatch {
    async fn dispatch(&self, task: &Task, _hints: &ContextHints) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(format!(
            "simulated {} result for '{}'",
            task.capability, task.name
        ))
    }
}
