//! Computes which parts and relationships a sheet removal touches

use log::{debug, warn};
use std::collections::HashSet;

use super::selector::SheetPredicate;
use crate::error::{Error, Result};
use crate::package::parts::rel_type;
use crate::package::path::resolve_target;
use crate::package::{Archive, ResolvedSheet, SheetDescriptor, SheetGraph};

/// Everything one removal will change. Built fresh for every call and never stored.
#[derive(Debug, Clone, Default)]
pub struct RemovalPlan {
    pub sheets_to_remove: Vec<ResolvedSheet>,
    /// Worksheet parts, their rels siblings, and parts invalidated by the removal
    pub parts_to_delete: Vec<String>,
    /// Workbook relationship ids to drop (removed sheets first)
    pub relationships_to_drop: Vec<String>,
    /// Remaining sheets in their original tab order, ids not yet renumbered
    pub surviving_sheets: Vec<SheetDescriptor>,
}

impl RemovalPlan {
    pub fn is_empty(&self) -> bool {
        self.sheets_to_remove.is_empty()
    }

    pub fn removed_names(&self) -> Vec<String> {
        self.sheets_to_remove
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn remaining_names(&self) -> Vec<String> {
        self.surviving_sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Relationship ids of the removed `<sheet>` elements
    pub fn removed_sheet_ids(&self) -> HashSet<String> {
        self.sheets_to_remove
            .iter()
            .map(|s| s.descriptor.relationship_id.clone())
            .collect()
    }
}

/// Match `predicate` against every sheet and work out the edits
///
/// Shared parts (shared strings, styles, themes, drawings) stay in the package even when
/// only removed sheets referenced them.
pub fn plan_removal<P>(graph: &SheetGraph, archive: &Archive, predicate: &P) -> Result<RemovalPlan>
where
    P: SheetPredicate + ?Sized,
{
    let (removed, surviving): (Vec<&ResolvedSheet>, Vec<&ResolvedSheet>) =
        graph.sheets.iter().partition(|s| predicate.matches(s.name()));

    if removed.is_empty() {
        debug!("{} matches no sheet", predicate.describe());
        return Ok(RemovalPlan {
            surviving_sheets: graph.workbook.sheets.clone(),
            ..RemovalPlan::default()
        });
    }
    if surviving.is_empty() {
        return Err(Error::NoSheetsRemaining {
            predicate: predicate.describe(),
        });
    }

    // A part still reachable from a surviving sheet must not go, even if a removed sheet
    // points at it as well.
    let still_used: HashSet<&str> = surviving.iter().map(|s| s.part.as_str()).collect();

    let mut parts_to_delete: Vec<String> = Vec::new();
    let mut relationships_to_drop = Vec::new();
    for sheet in &removed {
        relationships_to_drop.push(sheet.descriptor.relationship_id.clone());
        if still_used.contains(sheet.part.as_str()) {
            warn!(
                "part {} of removed sheet '{}' is shared with a remaining sheet; keeping it",
                sheet.part,
                sheet.name()
            );
            continue;
        }
        push_unique(&mut parts_to_delete, &sheet.part);
        if let Some(rels) = &sheet.rels_part {
            push_unique(&mut parts_to_delete, rels);
        }
    }

    // The calculation chain addresses cells by sheet position; Excel rebuilds it on load.
    if let Some(calc_chain) = graph.workbook_rels.first_of_type(rel_type::CALC_CHAIN) {
        let part = resolve_target(graph.workbook_part(), &calc_chain.target);
        if archive.contains(&part) {
            debug!("dropping calculation chain {part}");
            push_unique(&mut parts_to_delete, &part);
        }
        relationships_to_drop.push(calc_chain.id.clone());
    }

    Ok(RemovalPlan {
        sheets_to_remove: removed.into_iter().cloned().collect(),
        parts_to_delete,
        relationships_to_drop,
        surviving_sheets: surviving.into_iter().map(|s| s.descriptor.clone()).collect(),
    })
}

fn push_unique(parts: &mut Vec<String>, part: &str) {
    if !parts.iter().any(|p| p == part) {
        parts.push(part.to_string());
    }
}
