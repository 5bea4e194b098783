//! Guarded access to the external word processor (headless LibreOffice).
//!
//! One bridge instance wraps one logical operation at a time. Every command
//! runs under a wall-clock watchdog, and the bridge sweeps stray `soffice`
//! processes on creation failure and on drop so a wedged export can never
//! poison the next run.

pub mod convert;

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("could not start {binary}: {reason}")]
    ProcessCreateFailed { binary: String, reason: String },
    #[error("document would not open after {attempts} strategies: {path}")]
    DocumentOpenFailed { path: PathBuf, attempts: usize },
    #[error("export exceeded the {0:?} watchdog")]
    ExportTimeout(Duration),
    #[error("export failed: {0}")]
    ExportFailed(String),
    #[error("word processor unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Executable name or path of the word processor.
    pub binary: String,
    pub create_retries: usize,
    pub export_timeout: Duration,
    /// Paths longer than this are detoured through a temp directory.
    pub path_ceiling: usize,
    /// How long to wait for another writer to release a file.
    pub release_wait: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            binary: "soffice".to_string(),
            create_retries: 3,
            export_timeout: Duration::from_secs(60),
            path_ceiling: 260,
            release_wait: Duration::from_secs(10),
        }
    }
}

/// Conversion argument profiles tried in order until one succeeds. The
/// earlier profiles disable lock checking and session restore; the last is
/// the bare minimum invocation.
const OPEN_PROFILES: [&[&str]; 4] = [
    &["--headless", "--norestore", "--nolockcheck", "--nodefault"],
    &["--headless", "--norestore", "--nolockcheck"],
    &["--headless", "--norestore"],
    &["--headless"],
];

pub struct AutomationBridge {
    config: BridgeConfig,
}

impl AutomationBridge {
    /// Verifies the word processor answers a version query, retrying with
    /// linearly increasing backoff and a stray-process sweep between
    /// attempts.
    pub fn create(config: BridgeConfig) -> Result<Self, BridgeError> {
        let mut last_reason = String::new();
        for attempt in 1..=config.create_retries {
            match probe_binary(&config.binary) {
                Ok(version) => {
                    log::debug!("word processor ready: {}", version.trim());
                    return Ok(Self { config });
                }
                Err(reason) => {
                    log::warn!(
                        "word processor probe {attempt}/{} failed: {reason}",
                        config.create_retries
                    );
                    last_reason = reason;
                    sweep_stray_processes();
                    std::thread::sleep(Duration::from_secs(attempt as u64));
                }
            }
        }
        Err(BridgeError::ProcessCreateFailed {
            binary: config.binary,
            reason: last_reason,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Cheap liveness check before reusing the bridge for another file in a
    /// batch.
    pub fn health_check(&self) -> bool {
        probe_binary(&self.config.binary).is_ok()
    }

    /// Runs one conversion command under the watchdog. `extra_args` is one
    /// of the open profiles plus the convert arguments.
    fn run_guarded(&self, args: &[&str]) -> Result<(), BridgeError> {
        let mut child = Command::new(&self.config.binary)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| BridgeError::ProcessCreateFailed {
                binary: self.config.binary.clone(),
                reason: err.to_string(),
            })?;

        let deadline = Instant::now() + self.config.export_timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(BridgeError::ExportFailed(format!(
                        "{} exited with {status}",
                        self.config.binary
                    )));
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        sweep_stray_processes();
                        return Err(BridgeError::ExportTimeout(self.config.export_timeout));
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(err) => return Err(BridgeError::ExportFailed(err.to_string())),
            }
        }
    }

    /// Tries every open profile in order. Before each retry, waits for the
    /// target file to be released by any other writer.
    fn run_with_profiles(
        &self,
        path: &Path,
        convert_args: &[&str],
    ) -> Result<(), BridgeError> {
        let mut last = None;
        for (i, profile) in OPEN_PROFILES.iter().enumerate() {
            if i > 0 {
                self.wait_for_file_release(path);
            }
            let mut args: Vec<&str> = profile.to_vec();
            args.extend_from_slice(convert_args);
            match self.run_guarded(&args) {
                Ok(()) => return Ok(()),
                Err(err @ BridgeError::ExportTimeout(_)) => return Err(err),
                Err(err) => {
                    log::warn!("open strategy {} failed: {err}", i + 1);
                    last = Some(err);
                }
            }
        }
        match last {
            Some(BridgeError::ProcessCreateFailed { binary, reason }) => {
                Err(BridgeError::ProcessCreateFailed { binary, reason })
            }
            _ => Err(BridgeError::DocumentOpenFailed {
                path: path.to_path_buf(),
                attempts: OPEN_PROFILES.len(),
            }),
        }
    }

    /// Polls until `path` can be opened for writing, bounded by the
    /// configured release wait.
    fn wait_for_file_release(&self, path: &Path) {
        let deadline = Instant::now() + self.config.release_wait;
        while Instant::now() < deadline {
            match std::fs::OpenOptions::new().write(true).open(path) {
                Ok(_) => return,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
                Err(_) => std::thread::sleep(Duration::from_millis(250)),
            }
        }
        log::warn!("file still locked after wait: {}", path.display());
    }
}

impl Drop for AutomationBridge {
    fn drop(&mut self) {
        sweep_stray_processes();
    }
}

fn probe_binary(binary: &str) -> Result<String, String> {
    let output = Command::new(binary)
        .arg("--version")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|err| err.to_string())?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(format!("version query exited with {}", output.status))
    }
}

/// Best-effort kill of leftover word-processor workers.
fn sweep_stray_processes() {
    let _ = Command::new("pkill")
        .args(["-f", "soffice.bin"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}
