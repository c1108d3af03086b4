//! Resolution of sheet names to worksheet parts through the workbook relationships

use log::{debug, warn};
use serde::Serialize;

use super::archive::Archive;
use super::parts::{
    DEFAULT_WORKBOOK_PART, ROOT_RELS_PART, RelationshipsPart, SheetDescriptor, WorkbookPart,
    rel_type,
};
use super::path::{rels_part_for, resolve_target};
use crate::error::{Error, Result};

/// A sheet together with the parts that hold its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSheet {
    #[serde(flatten)]
    pub descriptor: SheetDescriptor,
    /// Worksheet part, e.g. `xl/worksheets/sheet7.xml`
    pub part: String,
    /// `xl/worksheets/_rels/sheet7.xml.rels` when the package has it
    pub rels_part: Option<String>,
}

impl ResolvedSheet {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// sheet name -> `<sheet>` -> relationship id -> worksheet part -> worksheet rels part
#[derive(Debug, Clone)]
pub struct SheetGraph {
    pub workbook: WorkbookPart,
    pub workbook_rels: RelationshipsPart,
    pub sheets: Vec<ResolvedSheet>,
}

impl SheetGraph {
    pub fn resolve(archive: &Archive) -> Result<Self> {
        let workbook_part = locate_workbook_part(archive)?;
        let workbook = WorkbookPart::parse(&workbook_part, archive.required_part(&workbook_part)?)?;

        let rels_name = rels_part_for(&workbook_part);
        let workbook_rels = RelationshipsPart::parse(&rels_name, archive.required_part(&rels_name)?)?;

        let mut sheets = Vec::with_capacity(workbook.sheets.len());
        for descriptor in &workbook.sheets {
            let entry = workbook_rels.get(&descriptor.relationship_id).ok_or_else(|| {
                Error::UnresolvedRelationship {
                    sheet: descriptor.name.clone(),
                    relationship_id: descriptor.relationship_id.clone(),
                    rels_part: rels_name.clone(),
                }
            })?;
            if entry.external {
                return Err(Error::corrupt(
                    &rels_name,
                    format!("sheet '{}' points at external target {}", descriptor.name, entry.target),
                ));
            }

            let part = resolve_target(&workbook_part, &entry.target);
            if !archive.contains(&part) {
                return Err(Error::corrupt(
                    &part,
                    format!("part for sheet '{}' is missing", descriptor.name),
                ));
            }
            let rels_part = Some(rels_part_for(&part)).filter(|p| archive.contains(p));

            debug!(
                "sheet '{}' -> {} -> {}{}",
                descriptor.name,
                descriptor.relationship_id,
                part,
                rels_part.as_deref().map(|r| format!(" (+ {r})")).unwrap_or_default()
            );
            sheets.push(ResolvedSheet {
                descriptor: descriptor.clone(),
                part,
                rels_part,
            });
        }

        Ok(Self {
            workbook,
            workbook_rels,
            sheets,
        })
    }

    pub fn workbook_part(&self) -> &str {
        self.workbook.part_name()
    }

    pub fn sheet(&self, name: &str) -> Option<&ResolvedSheet> {
        self.sheets.iter().find(|s| s.name() == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name()).collect()
    }
}

/// Workbook part named by the package root relationships, `xl/workbook.xml` otherwise
pub fn locate_workbook_part(archive: &Archive) -> Result<String> {
    let Some(bytes) = archive.part(ROOT_RELS_PART) else {
        warn!("package has no {ROOT_RELS_PART}, assuming {DEFAULT_WORKBOOK_PART}");
        return Ok(DEFAULT_WORKBOOK_PART.to_string());
    };
    let root = RelationshipsPart::parse(ROOT_RELS_PART, bytes)?;
    Ok(root
        .first_of_type(rel_type::OFFICE_DOCUMENT)
        .map(|rel| resolve_target("", &rel.target))
        .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string()))
}
