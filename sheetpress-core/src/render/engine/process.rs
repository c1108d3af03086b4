//! Child processes owned by exactly one attempt

use log::{debug, warn};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{failure, unavailable};
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Kills and reaps the child when dropped, whatever path the attempt took
#[derive(Debug)]
pub struct ScopedProcess {
    engine: String,
    child: Option<Child>,
    log_path: PathBuf,
}

impl ScopedProcess {
    /// Spawn `command` with stdout and stderr captured into `<work_dir>/<engine>.log`
    pub fn spawn(engine: &str, mut command: Command, work_dir: &Path) -> Result<Self> {
        let log_path = work_dir.join(format!("{engine}.log"));
        let log = File::create(&log_path).map_err(|e| Error::write_failure(&log_path, e))?;
        let log_err = log.try_clone().map_err(|e| Error::write_failure(&log_path, e))?;

        debug!("{engine}: spawning {command:?}");
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| unavailable(engine, format!("cannot start process: {e}")))?;

        Ok(Self {
            engine: engine.to_string(),
            child: Some(child),
            log_path,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Wait for exit; past `timeout` the process is killed and `RenderTimeout` returned
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<ExitStatus> {
        let started = Instant::now();
        let engine = self.engine.clone();
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| failure(&engine, "process already reaped"))?;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    self.child = None;
                    return Ok(status);
                }
                Ok(None) if started.elapsed() >= timeout => {
                    self.terminate();
                    return Err(Error::RenderTimeout {
                        engine,
                        elapsed: started.elapsed(),
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(failure(&engine, format!("waiting for process: {e}"))),
            }
        }
    }

    /// Wait and turn a non-zero exit into `RenderFailure` carrying the log tail
    pub fn finish(&mut self, timeout: Duration) -> Result<()> {
        let status = self.wait_timeout(timeout)?;
        if status.success() {
            return Ok(());
        }
        Err(failure(
            &self.engine,
            format!("exited with {status}: {}", self.log_tail(400)),
        ))
    }

    /// Last `max` characters of the captured output
    pub fn log_tail(&self, max: usize) -> String {
        let text = fs::read_to_string(&self.log_path).unwrap_or_default();
        let text = text.trim();
        let count = text.chars().count();
        if count <= max {
            return text.to_string();
        }
        text.chars().skip(count - max).collect()
    }

    fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                warn!("{}: kill failed: {e}", self.engine);
            }
            // Reap so no zombie outlives the attempt
            let _ = child.wait();
            debug!("{}: process {} terminated", self.engine, child.id());
        }
    }
}

impl Drop for ScopedProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Run `command` to completion within `timeout`, for probes
pub fn run_probe(engine: &str, command: Command, work_dir: &Path, timeout: Duration) -> Result<()> {
    let mut process = ScopedProcess::spawn(engine, command, work_dir)?;
    match process.finish(timeout) {
        Ok(()) => Ok(()),
        Err(e) => Err(unavailable(engine, e.to_string())),
    }
}
