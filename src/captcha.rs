//! Captcha recognition boundary.
//!
//! Recognition itself is a black box behind [`Recognizer`]; the shipped
//! implementation pipes the challenge image to an external command and reads
//! the code from its stdout, so any classifier (the classical segmentation
//! one, a CNN, a paid API wrapper) can be plugged in without touching the
//! engine.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};

pub trait Recognizer {
    /// Turn a challenge image into the code to submit.
    fn recognize(&self, image: &[u8]) -> Result<String>;

    /// Invoked after the portal accepts a code, for implementations that
    /// keep per-challenge scratch state.
    fn clear_cache(&self) {}
}

/// Runs a shell command with the image on stdin; the trimmed stdout is the
/// recognized code.
pub struct CommandRecognizer {
    command: String,
}

impl CommandRecognizer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Recognizer for CommandRecognizer {
    fn recognize(&self, image: &[u8]) -> Result<String> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn recognizer command: {}", self.command))?;

        child
            .stdin
            .take()
            .context("recognizer stdin unavailable")?
            .write_all(image)
            .context("Failed to feed image to recognizer")?;

        let output = child
            .wait_with_output()
            .context("Failed to collect recognizer output")?;
        if !output.status.success() {
            bail!(
                "recognizer exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let code = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if code.is_empty() {
            bail!("recognizer produced no code");
        }
        Ok(code)
    }
}
