// src/pm/scripts.rs

//! Hook scripts run around a transaction
//!
//! Commands are run through `/bin/sh -c` from the configured run directory
//! with a timeout. Output is logged line by line.

use crate::config::RpmConfig;
use crate::error::{Error, Result};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

#[derive(Debug, Clone)]
pub struct HookRunner {
    run_directory: PathBuf,
    timeout: Duration,
}

impl HookRunner {
    pub fn new(config: &RpmConfig) -> Self {
        Self {
            run_directory: PathBuf::from(&config.run_directory),
            timeout: Duration::from_secs(config.script_timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run every command of a hook phase, stopping at the first failure
    pub fn run_all(&self, phase: &str, commands: &[String], input: Option<&str>) -> Result<()> {
        for command in commands {
            self.run(phase, command, input)?;
        }
        Ok(())
    }

    /// Run one command, feeding `input` on stdin when given
    pub fn run(&self, phase: &str, command: &str, input: Option<&str>) -> Result<()> {
        info!("Running {} hook: {}", phase, command);
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.run_directory)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ScriptError(format!("Failed to spawn {} hook: {}", phase, e)))?;

        // Stdin and the output pipes are serviced on their own threads so
        // the timeout bounds the whole exchange
        let writer = match (input, child.stdin.take()) {
            (Some(data), Some(mut stdin)) => {
                let data = data.to_string();
                let phase = phase.to_string();
                Some(thread::spawn(move || {
                    // The hook may exit without reading everything
                    if let Err(e) = stdin.write_all(data.as_bytes()) {
                        debug!("{} hook closed stdin early: {}", phase, e);
                    }
                }))
            }
            _ => None,
        };
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        match child.wait_timeout(self.timeout)? {
            Some(status) => {
                if let Some(writer) = writer {
                    let _ = writer.join();
                }
                for line in collect(stdout).lines() {
                    info!("[{}] {}", phase, line);
                }
                for line in collect(stderr).lines() {
                    warn!("[{}] {}", phase, line);
                }

                if status.success() {
                    Ok(())
                } else {
                    Err(Error::ScriptError(format!(
                        "{} hook '{}' failed with exit code {}",
                        phase,
                        command,
                        status.code().unwrap_or(-1)
                    )))
                }
            }
            None => {
                // Pipe threads are left detached; a background child of the
                // shell may still hold the pipes open
                let _ = child.kill();
                let _ = child.wait();
                Err(Error::ScriptError(format!(
                    "{} hook '{}' timed out after {} seconds",
                    phase,
                    command,
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}
