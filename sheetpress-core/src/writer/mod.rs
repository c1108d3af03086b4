//! Sheet removal: planning, repackaging and the file-level entry points

pub mod planner;
pub mod repackager;
pub mod selector;

pub use planner::{RemovalPlan, plan_removal};
pub use repackager::{apply_plan, renumber};
pub use selector::{SheetPredicate, SheetSelector};

use log::info;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::package::archive::copy_verbatim;
use crate::package::{Archive, ResolvedSheet, SheetGraph};

/// Outcome of a removal call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub removed_sheet_names: Vec<String>,
    pub remaining_sheet_names: Vec<String>,
    pub output_path: PathBuf,
}

/// Remove every sheet matching `predicate` from `input`, writing the result to `output`
///
/// The source file is never modified. When nothing matches, the source is copied as is.
pub fn remove_sheets<P>(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    predicate: &P,
) -> Result<RemovalReport>
where
    P: SheetPredicate + ?Sized,
{
    let (input, output) = (input.as_ref(), output.as_ref());
    let mut archive = Archive::open(input)?;
    ensure_distinct(input, output)?;
    let graph = SheetGraph::resolve(&archive)?;
    let plan = plan_removal(&graph, &archive, predicate)?;

    if plan.is_empty() {
        info!(
            "{}: {} matches no sheet, copying unchanged",
            input.display(),
            predicate.describe()
        );
        copy_verbatim(input, output)?;
    } else {
        apply_plan(&mut archive, &graph, &plan)?;
        archive.write(output)?;
        info!(
            "{}: removed {:?}, kept {:?} -> {}",
            input.display(),
            plan.removed_names(),
            plan.remaining_names(),
            output.display()
        );
    }

    Ok(RemovalReport {
        removed_sheet_names: plan.removed_names(),
        remaining_sheet_names: plan.remaining_names(),
        output_path: output.to_path_buf(),
    })
}

/// Refuse an `output` that resolves to the existing file `input`
pub(crate) fn ensure_distinct(input: &Path, output: &Path) -> Result<()> {
    let input = fs::canonicalize(input).map_err(|_| Error::NotFound(input.to_path_buf()))?;
    if canonical_target(output).is_some_and(|target| target == input) {
        return Err(Error::write_failure(
            output,
            io::Error::new(io::ErrorKind::InvalidInput, "output would overwrite the source file"),
        ));
    }
    Ok(())
}

/// Canonical form of a path that may not exist yet
fn canonical_target(path: &Path) -> Option<PathBuf> {
    if let Ok(path) = fs::canonicalize(path) {
        return Some(path);
    }
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::canonicalize(parent).ok().map(|parent| parent.join(name))
}

/// Plan a removal without writing anything
pub fn preview_removal<P>(input: impl AsRef<Path>, predicate: &P) -> Result<RemovalPlan>
where
    P: SheetPredicate + ?Sized,
{
    let archive = Archive::open(input)?;
    let graph = SheetGraph::resolve(&archive)?;
    plan_removal(&graph, &archive, predicate)
}

/// Sheets of a workbook with the parts backing them
pub fn inspect_workbook(input: impl AsRef<Path>) -> Result<Vec<ResolvedSheet>> {
    let archive = Archive::open(input)?;
    Ok(SheetGraph::resolve(&archive)?.sheets)
}
