//! Applies a removal plan to an in-memory package

use log::debug;
use std::collections::HashSet;

use super::planner::RemovalPlan;
use crate::error::Result;
use crate::package::parts::CONTENT_TYPES_PART;
use crate::package::path::content_type_part_name;
use crate::package::{Archive, ContentTypesPart, SheetDescriptor, SheetGraph};

/// Surviving sheets with `sheetId` set to `1..=N` in tab order
pub fn renumber(surviving: &[SheetDescriptor]) -> Vec<SheetDescriptor> {
    surviving
        .iter()
        .enumerate()
        .map(|(i, sheet)| SheetDescriptor {
            sheet_id: (i + 1).to_string(),
            ..sheet.clone()
        })
        .collect()
}

/// Rewrite the workbook, its relationships and the content types, then drop the parts
///
/// The three new documents are serialized before the archive is touched, so an error
/// leaves `archive` unchanged.
pub fn apply_plan(archive: &mut Archive, graph: &SheetGraph, plan: &RemovalPlan) -> Result<()> {
    if plan.is_empty() {
        return Ok(());
    }

    let survivors = renumber(&plan.surviving_sheets);
    let workbook = graph
        .workbook
        .without_sheets(&plan.removed_sheet_ids(), &survivors)?;

    let dropped: HashSet<String> = plan.relationships_to_drop.iter().cloned().collect();
    let workbook_rels = graph.workbook_rels.without_ids(&dropped)?;

    let deleted_names: HashSet<String> = plan
        .parts_to_delete
        .iter()
        .map(|part| content_type_part_name(part))
        .collect();
    let content_types =
        ContentTypesPart::parse(archive.required_part(CONTENT_TYPES_PART)?)?.without_overrides(&deleted_names)?;

    let workbook_bytes = workbook.to_bytes()?;
    let rels_bytes = workbook_rels.to_bytes()?;
    let content_types_bytes = content_types.to_bytes()?;

    for part in &plan.parts_to_delete {
        if archive.delete_part(part) {
            debug!("deleted {part}");
        }
    }
    archive.set_part(graph.workbook_part(), workbook_bytes);
    archive.set_part(workbook_rels.part_name(), rels_bytes);
    archive.set_part(CONTENT_TYPES_PART, content_types_bytes);
    Ok(())
}
