//! Part-name arithmetic for OPC packages

use percent_encoding::percent_decode_str;

/// Relationships part that belongs to `part`, e.g. `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`
pub fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship `Target` against the part that owns the relationship
///
/// Targets starting with `/` are package-absolute. Anything after `#` is a fragment and
/// is not part of the part name. Targets are URIs, so `%XX` escapes are decoded into the
/// stored entry name.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or_default();
    let target = percent_decode_str(target).decode_utf8_lossy();
    let target = &*target;
    if target.is_empty() {
        return normalize(source_part);
    }
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize(absolute);
    }

    let base = source_part
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or_default();
    normalize(&format!("{base}/{target}"))
}

/// Part name as it appears in `[Content_Types].xml` overrides
pub fn content_type_part_name(part: &str) -> String {
    format!("/{}", part.trim_start_matches('/'))
}

fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
