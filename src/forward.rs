use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::{ForwardConfig, TEXT_PLACEHOLDER};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no forward command configured")]
    EmptyCommand,

    #[error("failed to start {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Starts an external program without waiting for it.
pub trait Launch: Send + Sync {
    fn launch(&self, command: &str, arguments: &str) -> Result<(), LaunchError>;
}

/// Launches real OS processes.
///
/// Must be called from within a tokio runtime; the child is reaped in the
/// background once it exits.
pub struct ProcessLauncher;

impl Launch for ProcessLauncher {
    fn launch(&self, command: &str, arguments: &str) -> Result<(), LaunchError> {
        if command.trim().is_empty() {
            return Err(LaunchError::EmptyCommand);
        }

        let mut cmd = Command::new(command);
        #[cfg(windows)]
        {
            cmd.raw_arg(arguments);
        }
        #[cfg(not(windows))]
        {
            cmd.args(split_arguments(arguments));
        }

        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            command: command.to_string(),
            source,
        })?;
        debug!("Started {} (pid {:?})", command, child.id());
        Ok(())
    }
}

/// Substitute every placeholder in the template with `text`. No escaping.
pub fn render_arguments(template: &str, text: &str) -> String {
    template.replace(TEXT_PLACEHOLDER, text)
}

/// Split an argument string into argv on whitespace; double quotes group
/// words and are dropped.
pub fn split_arguments(arguments: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in arguments.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

/// Sends final chat text to the configured external program.
pub struct Forwarder {
    command: String,
    arguments: String,
    launcher: Arc<dyn Launch>,
}

impl Forwarder {
    pub fn new(config: &ForwardConfig, launcher: Arc<dyn Launch>) -> Self {
        Self {
            command: config.command.clone(),
            arguments: config.arguments.clone(),
            launcher,
        }
    }

    pub fn forward(&self, text: &str) -> Result<(), LaunchError> {
        let arguments = render_arguments(&self.arguments, text);
        debug!("Forwarding: {} {}", self.command, arguments);
        self.launcher.launch(&self.command, &arguments)
    }
}
