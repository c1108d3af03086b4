//! Headless Chromium / Chrome printing the markup with `--print-to-pdf`

use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::process::{ScopedProcess, run_probe};
use super::{RenderEngine, RenderJob, find_binary, unavailable};
use crate::error::Result;

const CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default)]
pub struct ChromiumEngine {
    binary: Option<PathBuf>,
    extra_args: Vec<String>,
}

impl ChromiumEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `binary` instead of searching `PATH`
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    fn binary(&self) -> Result<PathBuf> {
        match &self.binary {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(unavailable(self.name(), format!("{} does not exist", path.display()))),
            None => find_binary(CANDIDATES)
                .ok_or_else(|| unavailable(self.name(), "no Chromium or Chrome binary on PATH")),
        }
    }

    fn base_command(&self, binary: &Path, profile: &Path) -> Command {
        let mut command = Command::new(binary);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-first-run")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-renderer-backgrounding")
            .arg(format!("--user-data-dir={}", profile.display()))
            .args(&self.extra_args);
        command
    }
}

impl RenderEngine for ChromiumEngine {
    fn name(&self) -> &str {
        "chromium"
    }

    fn probe(&self) -> Result<()> {
        let binary = self.binary()?;
        let scratch = tempfile::tempdir().map_err(|e| unavailable(self.name(), e.to_string()))?;
        let mut command = Command::new(&binary);
        command.arg("--version");
        run_probe(self.name(), command, scratch.path(), PROBE_TIMEOUT)?;
        debug!("chromium: using {}", binary.display());
        Ok(())
    }

    fn render(&self, job: &RenderJob<'_>) -> Result<()> {
        let binary = self.binary()?;
        let document = job.write_markup()?;
        let profile = job.work_dir.join("profile");

        let mut command = self.base_command(&binary, &profile);
        command
            .arg("--no-pdf-header-footer")
            .arg("--run-all-compositor-stages-before-draw")
            .arg(format!(
                "--virtual-time-budget={}",
                job.request.load_timeout.as_millis()
            ))
            .arg(format!("--print-to-pdf={}", job.output.display()))
            .arg(file_url(&document));

        let mut process = ScopedProcess::spawn(self.name(), command, job.work_dir)?;
        process.finish(job.request.timeout)
    }
}

fn file_url(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    let encoded: String = text
        .chars()
        .map(|c| match c {
            ' ' => "%20".to_string(),
            '#' => "%23".to_string(),
            '?' => "%3F".to_string(),
            '%' => "%25".to_string(),
            other => other.to_string(),
        })
        .collect();
    if encoded.starts_with('/') {
        format!("file://{encoded}")
    } else {
        format!("file:///{encoded}")
    }
}
