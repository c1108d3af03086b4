//! Engine fallback loop: probe, attempt, validate, retry, move on

use log::{debug, info, warn};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use super::engine::{ChromiumEngine, MockEngine, RenderEngine, RenderJob, WkhtmltopdfEngine};
use super::markup::build_markup;
use super::request::{AttemptRecord, AttemptState, RenderRequest, RenderResult};
use super::sheet_table::{SheetTable, load_tables};
use super::validate::check_pdf;
use crate::error::{EngineFailure, Error, ErrorKind, Result};
use crate::package::{Archive, SheetGraph};

/// How one attempt ended
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Validated PDF of this many bytes, already moved to the requested output path
    Rendered(u64),
    /// Worth another attempt on the same engine while attempts remain
    Retryable(Error),
    /// This engine cannot be used any more during this conversion
    Unavailable(Error),
}

struct EngineSlot {
    engine: Box<dyn RenderEngine>,
    probe: OnceLock<std::result::Result<(), String>>,
}

/// Ordered engine chain. Probe results are cached for the lifetime of the orchestrator.
pub struct Orchestrator {
    engines: Vec<EngineSlot>,
    retry_backoff: Duration,
}

impl Orchestrator {
    pub fn new(engines: Vec<Box<dyn RenderEngine>>) -> Self {
        Self {
            engines: engines
                .into_iter()
                .map(|engine| EngineSlot {
                    engine,
                    probe: OnceLock::new(),
                })
                .collect(),
            retry_backoff: Duration::from_secs(1),
        }
    }

    /// chromium, then wkhtmltopdf, then the mock listing
    pub fn with_default_engines() -> Self {
        let engines: Vec<Box<dyn RenderEngine>> = vec![
            Box::new(ChromiumEngine::new()),
            Box::new(WkhtmltopdfEngine::new()),
            Box::new(MockEngine::new()),
        ];
        Self::new(engines)
    }

    /// Pause before retry `n` is `n * backoff`
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn engine_names(&self) -> Vec<&str> {
        self.engines.iter().map(|slot| slot.engine.name()).collect()
    }

    /// Names of the engines whose probe succeeds
    pub fn available_engines(&self) -> Vec<&str> {
        self.engines
            .iter()
            .filter(|slot| self.probe(slot).is_ok())
            .map(|slot| slot.engine.name())
            .collect()
    }

    pub fn convert(&self, request: &RenderRequest) -> Result<RenderResult> {
        let started = Instant::now();
        let source = &request.source_path;
        if !source.is_file() {
            return Err(Error::NotFound(source.clone()));
        }

        let archive = Archive::open(source)?;
        let graph = SheetGraph::resolve(&archive)?;
        let sheet_names = request.filter_sheets(graph.sheet_names());
        if sheet_names.is_empty() {
            return Err(Error::NoSheetsToRender {
                include: request.include_sheets.clone().unwrap_or_default(),
                exclude: request.exclude_sheets.clone().unwrap_or_default(),
            });
        }
        let tables = load_tables(source, &archive, &graph, &sheet_names)?;
        let markup = build_markup(&tables, request);
        ensure_parent(&request.output_path)?;
        info!(
            "rendering {} sheet(s) of {} to {}",
            sheet_names.len(),
            source.display(),
            request.output_path.display()
        );

        let max_attempts = request.max_retries.max(1);
        let mut attempt_log = Vec::new();
        let mut failures = Vec::new();
        let mut total_attempts = 0;

        for slot in &self.engines {
            let name = slot.engine.name();
            if let Err(reason) = self.probe(slot) {
                debug!("{name}: skipped, {reason}");
                failures.push(EngineFailure {
                    engine: name.to_string(),
                    attempts: 0,
                    kind: ErrorKind::EngineUnavailable,
                    message: reason.clone(),
                });
                continue;
            }

            let mut last_error = None;
            let mut used = 0;
            for attempt in 1..=max_attempts {
                used = attempt;
                total_attempts += 1;
                let attempt_started = Instant::now();
                let outcome = self.attempt(slot.engine.as_ref(), request, &markup, &tables)?;

                let (state, error) = match outcome {
                    AttemptOutcome::Rendered(byte_size) => {
                        attempt_log.push(record(name, attempt, AttemptState::Succeeded, None, attempt_started));
                        info!("{name}: rendered {byte_size} bytes on attempt {attempt}");
                        return Ok(RenderResult {
                            output_path: request.output_path.clone(),
                            sheet_count: sheet_names.len(),
                            sheet_names,
                            byte_size,
                            elapsed_ms: millis(started.elapsed()),
                            engine_used: name.to_string(),
                            attempts: total_attempts,
                            attempt_log,
                            warnings: slot.engine.warnings(),
                        });
                    }
                    AttemptOutcome::Retryable(e) => (AttemptState::FailedRetryable, e),
                    AttemptOutcome::Unavailable(e) => (AttemptState::FailedFatal, e),
                };

                warn!("{name}: attempt {attempt}/{max_attempts} {state}: {error}");
                attempt_log.push(record(name, attempt, state, Some(&error), attempt_started));
                last_error = Some(error);
                if state == AttemptState::FailedFatal {
                    break;
                }
                if attempt < max_attempts && !self.retry_backoff.is_zero() {
                    thread::sleep(self.retry_backoff * attempt);
                }
            }

            if let Some(error) = last_error {
                failures.push(EngineFailure {
                    engine: name.to_string(),
                    attempts: used,
                    kind: error.kind(),
                    message: error.to_string(),
                });
            }
        }

        Err(Error::EnginesExhausted { failures })
    }

    fn probe(&self, slot: &EngineSlot) -> std::result::Result<(), String> {
        slot.probe
            .get_or_init(|| {
                let result = slot.engine.probe().map_err(|e| match e {
                    Error::EngineUnavailable { reason, .. } => reason,
                    other => other.to_string(),
                });
                match &result {
                    Ok(()) => debug!("{}: available", slot.engine.name()),
                    Err(reason) => debug!("{}: unavailable, {reason}", slot.engine.name()),
                }
                result
            })
            .clone()
    }

    /// Pending -> Converting -> Validating -> outcome. `Err` aborts the whole conversion.
    fn attempt(
        &self,
        engine: &dyn RenderEngine,
        request: &RenderRequest,
        markup: &str,
        tables: &[SheetTable],
    ) -> Result<AttemptOutcome> {
        let name = engine.name();
        debug!("{name}: {}", AttemptState::Pending);
        let work_dir = tempfile::Builder::new()
            .prefix(".sheetpress-")
            .tempdir_in(output_dir(&request.output_path))
            .map_err(|e| Error::write_failure(&request.output_path, e))?;
        let staging = work_dir.path().join("output.pdf");
        let job = RenderJob {
            request: request.clone(),
            markup,
            sheets: tables,
            work_dir: work_dir.path(),
            output: staging.clone(),
        };

        debug!("{name}: {}", AttemptState::Converting);
        if let Err(e) = engine.render(&job) {
            return Ok(classify(e));
        }

        debug!("{name}: {}", AttemptState::Validating);
        let byte_size = match check_pdf(&staging, name) {
            Ok(size) => size,
            Err(e) => return Ok(AttemptOutcome::Retryable(e)),
        };

        fs::rename(&staging, &request.output_path)
            .or_else(|_| fs::copy(&staging, &request.output_path).map(|_| ()))
            .map_err(|e| Error::write_failure(&request.output_path, e))?;
        Ok(AttemptOutcome::Rendered(byte_size))
    }
}

fn classify(error: Error) -> AttemptOutcome {
    if error.is_retryable() {
        AttemptOutcome::Retryable(error)
    } else {
        AttemptOutcome::Unavailable(error)
    }
}

fn record(
    engine: &str,
    attempt: u32,
    state: AttemptState,
    error: Option<&Error>,
    started: Instant,
) -> AttemptRecord {
    AttemptRecord {
        engine: engine.to_string(),
        attempt,
        state,
        error_kind: error.map(Error::kind),
        message: error.map(ToString::to_string),
        elapsed_ms: millis(started.elapsed()),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn output_dir(output: &Path) -> &Path {
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn ensure_parent(output: &Path) -> Result<()> {
    let dir = output_dir(output);
    fs::create_dir_all(dir).map_err(|e| Error::write_failure(dir, e))
}

/// Convert with the default engine chain
pub fn convert_to_pdf(request: &RenderRequest) -> Result<RenderResult> {
    Orchestrator::with_default_engines().convert(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixture::WorkbookFixture;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Fail,
        Timeout,
        Garbage,
        GoneMidRun,
        Succeed,
    }

    /// Engine that plays back a script, one behavior per attempt, repeating the last
    struct ScriptedEngine {
        name: &'static str,
        available: bool,
        script: Mutex<Vec<Behavior>>,
        renders: AtomicU32,
        probes: AtomicU32,
    }

    impl ScriptedEngine {
        fn new(name: &'static str, script: &[Behavior]) -> Self {
            Self {
                name,
                available: true,
                script: Mutex::new(script.to_vec()),
                renders: AtomicU32::new(0),
                probes: AtomicU32::new(0),
            }
        }

        fn unavailable(name: &'static str) -> Self {
            Self {
                available: false,
                ..Self::new(name, &[Behavior::Succeed])
            }
        }
    }

    impl RenderEngine for &'static ScriptedEngine {
        fn name(&self) -> &str {
            self.name
        }

        fn probe(&self) -> Result<()> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.available {
                Ok(())
            } else {
                Err(crate::render::engine::unavailable(self.name, "not installed"))
            }
        }

        fn render(&self, job: &RenderJob<'_>) -> Result<()> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            let behavior = {
                let mut script = self.script.lock().expect("script lock");
                if script.len() > 1 { script.remove(0) } else { script[0] }
            };
            match behavior {
                Behavior::Fail => Err(crate::render::engine::failure(self.name, "crashed")),
                Behavior::Timeout => Err(Error::RenderTimeout {
                    engine: self.name.to_string(),
                    elapsed: Duration::from_millis(5),
                }),
                Behavior::Garbage => {
                    fs::write(&job.output, b"<html>not a pdf</html>").expect("write garbage");
                    Ok(())
                }
                Behavior::GoneMidRun => Err(crate::render::engine::unavailable(self.name, "crashed hard")),
                Behavior::Succeed => MockEngine.render(job),
            }
        }
    }

    fn leak(engine: ScriptedEngine) -> &'static ScriptedEngine {
        Box::leak(Box::new(engine))
    }

    fn orchestrator(engines: &[&'static ScriptedEngine]) -> Orchestrator {
        Orchestrator::new(
            engines
                .iter()
                .map(|e| Box::new(*e) as Box<dyn RenderEngine>)
                .collect(),
        )
        .with_retry_backoff(Duration::ZERO)
    }

    fn request(dir: &Path, sheets: &[&str]) -> anyhow::Result<RenderRequest> {
        let source = dir.join("order.xlsx");
        let mut fixture = WorkbookFixture::new();
        for name in sheets {
            fixture = fixture.sheet(name, &[&["Item", "Qty"], &["Bolt", "1200"]]);
        }
        fixture.write(&source)?;
        let mut request = RenderRequest::new(source, dir.join("out").join("order.pdf"));
        request.max_retries = 2;
        Ok(request)
    }

    #[test]
    fn test_fallback_reaches_third_engine() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let request = request(dir.path(), &["갑지", "을지"])?;
        let first = leak(ScriptedEngine::new("first", &[Behavior::Fail]));
        let second = leak(ScriptedEngine::new("second", &[Behavior::Timeout]));
        let third = leak(ScriptedEngine::new("third", &[Behavior::Succeed]));

        let result = orchestrator(&[first, second, third]).convert(&request)?;
        assert_eq!(result.engine_used, "third");
        assert_eq!(result.attempts, 5);
        assert_eq!(result.sheet_count, 2);
        assert_eq!(result.sheet_names, vec!["갑지", "을지"]);
        assert!(crate::render::validate::validate_pdf(&result.output_path));

        let states: Vec<(&str, AttemptState)> = result
            .attempt_log
            .iter()
            .map(|r| (r.engine.as_str(), r.state))
            .collect();
        assert_eq!(
            states,
            vec![
                ("first", AttemptState::FailedRetryable),
                ("first", AttemptState::FailedRetryable),
                ("second", AttemptState::FailedRetryable),
                ("second", AttemptState::FailedRetryable),
                ("third", AttemptState::Succeeded),
            ]
        );
        assert_eq!(result.attempt_log[2].error_kind, Some(ErrorKind::RenderTimeout));
        Ok(())
    }

    #[test]
    fn test_retry_bound_is_exact() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut request = request(dir.path(), &["A"])?;
        request.max_retries = 3;
        let always = leak(ScriptedEngine::new("always-fails", &[Behavior::Fail]));

        let err = orchestrator(&[always]).convert(&request).unwrap_err();
        assert_eq!(always.renders.load(Ordering::SeqCst), 3);
        match err {
            Error::EnginesExhausted { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].attempts, 3);
                assert_eq!(failures[0].kind, ErrorKind::RenderFailure);
            }
            other => panic!("expected EnginesExhausted, got {other:?}"),
        }
        assert!(!request.output_path.exists());
        Ok(())
    }

    #[test]
    fn test_invalid_output_is_retried_then_recovers() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let request = request(dir.path(), &["A"])?;
        let flaky = leak(ScriptedEngine::new("flaky", &[Behavior::Garbage, Behavior::Succeed]));

        let result = orchestrator(&[flaky]).convert(&request)?;
        assert_eq!(result.attempts, 2);
        assert_eq!(result.attempt_log[0].error_kind, Some(ErrorKind::ValidationFailure));
        Ok(())
    }

    #[test]
    fn test_unavailable_engines_are_probed_once_and_skipped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let request = request(dir.path(), &["A"])?;
        let missing = leak(ScriptedEngine::unavailable("missing"));
        let working = leak(ScriptedEngine::new("working", &[Behavior::Succeed]));
        let orchestrator = orchestrator(&[missing, working]);

        orchestrator.convert(&request)?;
        let result = orchestrator.convert(&request)?;
        assert_eq!(result.engine_used, "working");
        assert_eq!(result.attempts, 1);
        assert_eq!(missing.probes.load(Ordering::SeqCst), 1);
        assert_eq!(missing.renders.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.available_engines(), vec!["working"]);
        Ok(())
    }

    #[test]
    fn test_engine_lost_mid_run_is_not_retried() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let request = request(dir.path(), &["A"])?;
        let gone = leak(ScriptedEngine::new("gone", &[Behavior::GoneMidRun]));
        let skipped = leak(ScriptedEngine::unavailable("skipped"));

        let err = orchestrator(&[gone, skipped]).convert(&request).unwrap_err();
        assert_eq!(gone.renders.load(Ordering::SeqCst), 1);
        match err {
            Error::EnginesExhausted { failures } => {
                let summary: Vec<(&str, u32, ErrorKind)> = failures
                    .iter()
                    .map(|f| (f.engine.as_str(), f.attempts, f.kind))
                    .collect();
                assert_eq!(
                    summary,
                    vec![
                        ("gone", 1, ErrorKind::EngineUnavailable),
                        ("skipped", 0, ErrorKind::EngineUnavailable),
                    ]
                );
            }
            other => panic!("expected EnginesExhausted, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_empty_sheet_selection_is_rejected_up_front() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut request = request(dir.path(), &["Input", "갑지"])?;
        request.include_sheets = Some(vec!["Input".into()]);
        request.exclude_sheets = Some(vec!["Input".into()]);
        let engine = leak(ScriptedEngine::new("never", &[Behavior::Succeed]));

        let err = orchestrator(&[engine]).convert(&request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSheetsToRender);
        assert_eq!(engine.renders.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn test_missing_source() {
        let request = RenderRequest::new("/nonexistent/order.xlsx", "/tmp/order.pdf");
        let err = Orchestrator::new(vec![Box::new(MockEngine) as Box<dyn RenderEngine>]).convert(&request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
