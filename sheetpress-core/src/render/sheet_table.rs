//! Per-sheet tables of display text, styles and merged spans

use calamine::{Data, Range, Reader, open_workbook_auto};
use log::debug;
use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::styles::{CellStyle, Stylesheet};
use crate::error::{Error, Result};
use crate::package::path::resolve_target;
use crate::package::xml::attr;
use crate::package::{Archive, SheetGraph};

/// Rows or columns a merge may add past the last cell holding a value
const MERGE_OVERHANG: u32 = 64;

/// Inclusive, 0-based cell rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_row: u32,
    pub first_col: u32,
    pub last_row: u32,
    pub last_col: u32,
}

impl CellRange {
    /// `A1:C3`, or a single `B2`
    pub fn parse(reference: &str) -> Option<Self> {
        let (start, end) = reference.split_once(':').unwrap_or((reference, reference));
        let (first_row, first_col) = parse_cell_ref(start)?;
        let (last_row, last_col) = parse_cell_ref(end)?;
        Some(Self {
            first_row: first_row.min(last_row),
            first_col: first_col.min(last_col),
            last_row: first_row.max(last_row),
            last_col: first_col.max(last_col),
        })
    }

    fn contains(&self, row: u32, col: u32) -> bool {
        (self.first_row..=self.last_row).contains(&row) && (self.first_col..=self.last_col).contains(&col)
    }
}

/// `B12` -> (11, 1)
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let cell_ref = cell_ref.trim().replace('$', "");
    let split = cell_ref.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell_ref.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let col = letters
        .chars()
        .try_fold(0u32, |acc, ch| {
            acc.checked_mul(26)?
                .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)
        })?;
    let row: u32 = digits.parse().ok()?;
    Some((row.checked_sub(1)?, col - 1))
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableCell {
    pub row: u32,
    pub col: u32,
    pub text: String,
    pub numeric: bool,
    pub style: Option<CellStyle>,
    pub row_span: u32,
    pub col_span: u32,
}

impl TableCell {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// One sheet ready for markup. Cells covered by a merge are left out of `rows`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SheetTable {
    pub name: String,
    pub rows: Vec<Vec<TableCell>>,
    /// Column widths in Excel character units, by column offset from the first column
    pub column_widths: Vec<Option<f64>>,
}

impl SheetTable {
    pub fn cell_count(&self) -> usize {
        self.rows.iter().flatten().filter(|c| !c.is_empty()).count()
    }
}

/// Worksheet facts calamine does not expose
#[derive(Debug, Clone, Default)]
struct WorksheetLayout {
    styles: HashMap<(u32, u32), usize>,
    merges: Vec<CellRange>,
    /// (first, last, width), 0-based columns
    columns: Vec<(u32, u32, f64)>,
}

impl WorksheetLayout {
    fn parse(part_name: &str, bytes: &[u8]) -> Result<Self> {
        let mut reader = XmlReader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        let mut layout = WorksheetLayout::default();
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"c" => {
                        let position = attr(&e, b"r")?.as_deref().and_then(parse_cell_ref);
                        let style = attr(&e, b"s")?.and_then(|s| s.parse::<usize>().ok());
                        if let (Some(position), Some(style)) = (position, style) {
                            layout.styles.insert(position, style);
                        }
                    }
                    b"mergeCell" => {
                        if let Some(range) = attr(&e, b"ref")?.as_deref().and_then(CellRange::parse) {
                            layout.merges.push(range);
                        }
                    }
                    b"col" => {
                        let number = |key: &[u8]| -> Result<Option<u32>> {
                            Ok(attr(&e, key)?.and_then(|v| v.parse().ok()))
                        };
                        let width = attr(&e, b"width")?.and_then(|v| v.parse::<f64>().ok());
                        if let (Some(min), Some(max), Some(width)) = (number(b"min")?, number(b"max")?, width) {
                            if min >= 1 && max >= min {
                                layout.columns.push((min - 1, max - 1, width));
                            }
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::corrupt(part_name, e)),
                _ => {}
            }
            buf.clear();
        }
        Ok(layout)
    }

    fn width(&self, col: u32) -> Option<f64> {
        self.columns
            .iter()
            .find(|(first, last, _)| (*first..=*last).contains(&col))
            .map(|(_, _, width)| *width)
    }
}

/// Build tables for `names`, in the given order
///
/// Values come from calamine reading `source`; styles, merges and column widths come from
/// the parts in `archive`, which must be the same package.
pub fn load_tables(
    source: &Path,
    archive: &Archive,
    graph: &SheetGraph,
    names: &[String],
) -> Result<Vec<SheetTable>> {
    let mut workbook =
        open_workbook_auto(source).map_err(|e| Error::corrupt(&source.display().to_string(), e))?;

    let stylesheet = match styles_part(archive, graph) {
        Some((part, bytes)) => Stylesheet::parse(&part, bytes)?,
        None => Stylesheet::default(),
    };

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let sheet = graph
            .sheet(name)
            .ok_or_else(|| Error::corrupt(graph.workbook_part(), format!("no sheet named '{name}'")))?;
        let layout = WorksheetLayout::parse(&sheet.part, archive.required_part(&sheet.part)?)?;
        let values = workbook
            .worksheet_range(name)
            .map_err(|e| Error::corrupt(&sheet.part, e))?;

        let table = build_table(name, &values, &layout, &stylesheet);
        debug!(
            "sheet '{}': {} rows, {} non-empty cells, {} merges",
            name,
            table.rows.len(),
            table.cell_count(),
            layout.merges.len()
        );
        tables.push(table);
    }
    Ok(tables)
}

fn styles_part<'a>(archive: &'a Archive, graph: &SheetGraph) -> Option<(String, &'a [u8])> {
    let part = graph
        .workbook_rels
        .first_of_type("/styles")
        .map(|rel| resolve_target(graph.workbook_part(), &rel.target))
        .unwrap_or_else(|| "xl/styles.xml".to_string());
    let bytes = archive.part(&part)?;
    Some((part, bytes))
}

fn build_table(name: &str, values: &Range<Data>, layout: &WorksheetLayout, styles: &Stylesheet) -> SheetTable {
    let Some(bounds) = table_bounds(values, &layout.merges) else {
        return SheetTable {
            name: name.to_string(),
            ..SheetTable::default()
        };
    };

    // Merges clipped to the table, keyed by anchor; cells they cover besides the anchor
    let mut anchors: HashMap<(u32, u32), CellRange> = HashMap::new();
    let mut covered: HashSet<(u32, u32)> = HashSet::new();
    for merge in &layout.merges {
        if !bounds.contains(merge.first_row, merge.first_col) {
            continue;
        }
        let clipped = CellRange {
            last_row: merge.last_row.min(bounds.last_row),
            last_col: merge.last_col.min(bounds.last_col),
            ..*merge
        };
        if anchors.contains_key(&(clipped.first_row, clipped.first_col)) {
            continue;
        }
        for row in clipped.first_row..=clipped.last_row {
            for col in clipped.first_col..=clipped.last_col {
                if (row, col) != (clipped.first_row, clipped.first_col) {
                    covered.insert((row, col));
                }
            }
        }
        anchors.insert((clipped.first_row, clipped.first_col), clipped);
    }

    let mut rows = Vec::new();
    for row in bounds.first_row..=bounds.last_row {
        let mut cells = Vec::new();
        for col in bounds.first_col..=bounds.last_col {
            if covered.contains(&(row, col)) {
                continue;
            }
            let merge = anchors.get(&(row, col));
            let (text, numeric) = values
                .get_value((row, col))
                .map(display_value)
                .unwrap_or_default();
            cells.push(TableCell {
                row,
                col,
                text,
                numeric,
                style: layout
                    .styles
                    .get(&(row, col))
                    .and_then(|i| styles.get(*i))
                    .filter(|s| **s != CellStyle::default())
                    .cloned(),
                row_span: merge.map_or(1, |m| m.last_row - m.first_row + 1),
                col_span: merge.map_or(1, |m| m.last_col - m.first_col + 1),
            });
        }
        rows.push(cells);
    }

    SheetTable {
        name: name.to_string(),
        rows,
        column_widths: (bounds.first_col..=bounds.last_col).map(|c| layout.width(c)).collect(),
    }
}

/// The value range, grown by merges anchored inside it, at most [`MERGE_OVERHANG`] rows
/// and columns past the last value
fn table_bounds(values: &Range<Data>, merges: &[CellRange]) -> Option<CellRange> {
    let (start, end) = values.start().zip(values.end())?;
    let values = CellRange {
        first_row: start.0,
        first_col: start.1,
        last_row: end.0,
        last_col: end.1,
    };
    let row_limit = values.last_row.saturating_add(MERGE_OVERHANG);
    let col_limit = values.last_col.saturating_add(MERGE_OVERHANG);

    let mut bounds = values;
    for merge in merges.iter().filter(|m| values.contains(m.first_row, m.first_col)) {
        bounds.last_row = bounds.last_row.max(merge.last_row.min(row_limit));
        bounds.last_col = bounds.last_col.max(merge.last_col.min(col_limit));
    }
    Some(bounds)
}

/// Display text of a value and whether it reads as a number
pub fn display_value(value: &Data) -> (String, bool) {
    match value {
        Data::Int(i) => (group_thousands(&i.to_string()), true),
        Data::Float(f) => (format_number(*f), true),
        Data::String(s) => (s.clone(), false),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }.to_string(), false),
        Data::DateTime(dt) if dt.is_datetime() => (format_serial_date(dt.as_f64()), false),
        Data::DateTime(dt) => (format_number(dt.as_f64()), true),
        Data::DateTimeIso(s) | Data::DurationIso(s) => (s.clone(), false),
        Data::Error(e) => (e.to_string(), false),
        Data::Empty => (String::new(), false),
    }
}

/// Thousands separators, at most two decimals
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    let (integer, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let integer = if integer == "-0" { "0" } else { integer };
    let grouped = group_thousands(integer);
    if fraction.is_empty() {
        grouped
    } else {
        format!("{grouped}.{fraction}")
    }
}

fn group_thousands(digits: &str) -> String {
    let (sign, digits) = digits
        .strip_prefix('-')
        .map_or(("", digits), |rest| ("-", rest));
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    format!("{sign}{out}")
}

/// Last serial Excel can display as a date, 9999-12-31
pub const MAX_DATE_SERIAL: f64 = 2_958_465.0;

/// Excel 1900-system serial to `YYYY. M. D.`, with `H:MM` when there is a time part
///
/// Serials outside `0..=MAX_DATE_SERIAL` have no date form and are shown as numbers.
pub fn format_serial_date(serial: f64) -> String {
    if !(0.0..MAX_DATE_SERIAL + 1.0).contains(&serial) {
        return format_number(serial);
    }
    let mut days = serial.floor() as i64;
    // Serials before the phantom 1900-02-29 count from 1899-12-31
    if days < 60 {
        days += 1;
    }
    let (year, month, day) = civil_from_days(days - 25_569);
    let minutes = ((serial - serial.floor()) * 1440.0).round() as i64;
    if minutes == 0 || minutes == 1440 {
        format!("{year}. {month}. {day}.")
    } else {
        format!("{year}. {month}. {day}. {}:{:02}", minutes / 60, minutes % 60)
    }
}

/// Days since 1970-01-01 to (year, month, day), proleptic Gregorian
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
