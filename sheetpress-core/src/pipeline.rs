//! Strip then render: both artifacts of a workbook ready to hand out

use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::render::cleanup::{CleanupReport, cleanup_temp_files};
use crate::render::{Orchestrator, RenderRequest, RenderResult};
use crate::writer::{RemovalReport, SheetPredicate, ensure_distinct, remove_sheets};

/// Cleaned workbook plus its PDF, when rendering worked
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedWorkbook {
    pub removal: RemovalReport,
    pub cleaned_path: PathBuf,
    pub pdf: Option<RenderResult>,
    /// Why `pdf` is missing
    pub pdf_error: Option<String>,
}

impl ProcessedWorkbook {
    /// Files produced by the pipeline that still exist on disk
    pub fn artifacts(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.cleaned_path.clone()];
        if let Some(pdf) = &self.pdf {
            paths.push(pdf.output_path.clone());
        }
        paths
    }

    /// Delete both artifacts once they have been delivered
    pub fn cleanup(&self, grace: Duration) -> CleanupReport {
        cleanup_temp_files(self.artifacts(), grace)
    }
}

/// Strip `predicate` sheets from `source` into `work_dir`, then render the survivors
///
/// Removal failures abort. A rendering failure is logged and reported in
/// `pdf_error`; the cleaned workbook is still returned.
pub fn process_workbook<P>(
    source: impl AsRef<Path>,
    work_dir: impl AsRef<Path>,
    predicate: &P,
    template: &RenderRequest,
) -> Result<ProcessedWorkbook>
where
    P: SheetPredicate + ?Sized,
{
    process_workbook_with(
        &Orchestrator::with_default_engines(),
        source,
        work_dir,
        predicate,
        template,
    )
}

/// [`process_workbook`] on a caller-supplied engine chain
pub fn process_workbook_with<P>(
    orchestrator: &Orchestrator,
    source: impl AsRef<Path>,
    work_dir: impl AsRef<Path>,
    predicate: &P,
    template: &RenderRequest,
) -> Result<ProcessedWorkbook>
where
    P: SheetPredicate + ?Sized,
{
    let (source, work_dir) = (source.as_ref(), work_dir.as_ref());
    if !source.is_file() {
        return Err(Error::NotFound(source.to_path_buf()));
    }
    fs::create_dir_all(work_dir).map_err(|e| Error::write_failure(work_dir, e))?;

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".to_string());
    let cleaned_path = work_dir.join(format!("{stem}-cleaned.xlsx"));
    let pdf_path = work_dir.join(format!("{stem}.pdf"));
    ensure_distinct(source, &cleaned_path)?;
    ensure_distinct(source, &pdf_path)?;

    let removal = remove_sheets(source, &cleaned_path, predicate)?;
    let request = template.retarget(&cleaned_path, &pdf_path);

    let (pdf, pdf_error) = match orchestrator.convert(&request) {
        Ok(result) => {
            info!(
                "{}: {} and {} ready",
                source.display(),
                cleaned_path.display(),
                pdf_path.display()
            );
            (Some(result), None)
        }
        Err(e) => {
            warn!("{}: PDF skipped, {e}", source.display());
            (None, Some(e.to_string()))
        }
    };

    Ok(ProcessedWorkbook {
        removal,
        cleaned_path,
        pdf,
        pdf_error,
    })
}
