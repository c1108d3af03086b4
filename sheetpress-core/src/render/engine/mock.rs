//! Pure-Rust engine writing a plain PDF listing of each sheet's cell values

use log::debug;
use std::fmt::Write as _;
use std::fs;

use super::{RenderEngine, RenderJob};
use crate::error::{Error, Result};
use crate::render::request::{RenderRequest, length_to_mm};
use crate::render::sheet_table::SheetTable;

const PT_PER_MM: f64 = 72.0 / 25.4;
const MARGIN_PT: f64 = 36.0;
const WATERMARK_SIZE: f64 = 48.0;
const BODY_SIZE: f64 = 9.0;
const LINE_HEIGHT: f64 = 12.0;
const PRODUCER: &str = "sheetpress mock engine";

/// Always available. Output is a readable listing, not a faithful layout; text outside
/// Latin-1 prints as `?`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockEngine;

impl MockEngine {
    pub fn new() -> Self {
        MockEngine
    }
}

impl RenderEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn probe(&self) -> Result<()> {
        Ok(())
    }

    fn render(&self, job: &RenderJob<'_>) -> Result<()> {
        let pdf = listing_pdf(job.sheets, &job.request);
        debug!("mock: writing {} bytes to {}", pdf.len(), job.output.display());
        fs::write(&job.output, pdf).map_err(|e| Error::write_failure(&job.output, e))
    }

    fn warnings(&self) -> Vec<String> {
        vec!["rendered by the mock engine: cell values only, without the workbook layout".to_string()]
    }
}

struct Page {
    title: String,
    lines: Vec<String>,
}

/// Page geometry in points
struct Frame {
    width: f64,
    height: f64,
    top: f64,
    right: f64,
    bottom: f64,
    left: f64,
}

impl Frame {
    fn new(request: &RenderRequest) -> Self {
        let (width_mm, height_mm) = request.page_size_mm();
        let (width, height) = (width_mm * PT_PER_MM, height_mm * PT_PER_MM);
        // unparsable lengths keep the default; no margin may eat more than a third of the page
        let margin = |length: &str, extent: f64| {
            length_to_mm(length)
                .map_or(MARGIN_PT, |mm| mm * PT_PER_MM)
                .clamp(0.0, extent / 3.0)
        };
        Frame {
            width,
            height,
            top: margin(&request.margin.top, height),
            right: margin(&request.margin.right, width),
            bottom: margin(&request.margin.bottom, height),
            left: margin(&request.margin.left, width),
        }
    }

    fn inner_width(&self) -> f64 {
        self.width - self.left - self.right
    }

    fn inner_height(&self) -> f64 {
        self.height - self.top - self.bottom
    }
}

/// Build the PDF bytes: one or more pages per sheet
pub fn listing_pdf(sheets: &[SheetTable], request: &RenderRequest) -> Vec<u8> {
    let frame = Frame::new(request);
    let per_page = (((frame.inner_height() - 48.0) / LINE_HEIGHT).floor() as usize).max(1);
    let max_chars = ((frame.inner_width() / (BODY_SIZE * 0.5)).floor() as usize).max(8);

    let source = request
        .source_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut pages = Vec::new();
    for table in sheets {
        let lines: Vec<String> = table
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter(|c| !c.is_empty())
                    .map(|c| c.text.replace('\n', " "))
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .filter(|line| !line.is_empty())
            .map(|line| truncate(&line, max_chars))
            .collect();
        let title = format!("{} ({} cells)", table.name, table.cell_count());
        if lines.is_empty() {
            pages.push(Page { title, lines });
            continue;
        }
        for chunk in lines.chunks(per_page) {
            pages.push(Page {
                title: title.clone(),
                lines: chunk.to_vec(),
            });
        }
    }
    if pages.is_empty() {
        pages.push(Page {
            title: "No sheets".to_string(),
            lines: Vec::new(),
        });
    }

    let total = pages.len();
    let mut objects: Vec<Vec<u8>> = Vec::new();
    let kids: Vec<String> = (0..total).map(|i| format!("{} 0 R", 6 + 2 * i)).collect();

    objects.push(b"<< /Type /Catalog /Pages 2 0 R /Metadata 5 0 R >>".to_vec());
    objects.push(format!("<< /Type /Pages /Kids [{}] /Count {total} >>", kids.join(" ")).into_bytes());
    objects.push(b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_vec());
    let watermark = request.watermark.as_deref().filter(|w| !w.trim().is_empty());
    objects.push(
        format!(
            "<< /Title ({}) /Producer ({PRODUCER}) /Creator (sheetpress) >>",
            pdf_text(&source)
        )
        .into_bytes(),
    );
    objects.push(stream(
        "/Type /Metadata /Subtype /XML",
        xmp_packet(&source, sheets).as_bytes(),
    ));

    for (index, page) in pages.iter().enumerate() {
        let content_id = 7 + 2 * index;
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>",
                frame.width, frame.height
            )
            .into_bytes(),
        );
        let content = page_content(page, index + 1, total, &source, &frame, watermark);
        objects.push(stream("", content.as_bytes()));
    }

    assemble(&objects)
}

fn page_content(
    page: &Page,
    number: usize,
    total: usize,
    source: &str,
    frame: &Frame,
    watermark: Option<&str>,
) -> String {
    let mut ops = String::new();
    if let Some(text) = watermark {
        watermark_ops(&mut ops, text, frame);
    }
    let _ = writeln!(
        ops,
        "0.5 w {:.2} {:.2} {:.2} {:.2} re S",
        frame.left,
        frame.bottom,
        frame.inner_width(),
        frame.inner_height()
    );
    let x = frame.left + 10.0;
    let top = frame.height - frame.top - 20.0;
    let _ = writeln!(
        ops,
        "BT /F1 13 Tf {x:.2} {top:.2} Td ({}) Tj ET",
        pdf_text(&page.title)
    );
    let mut y = top - 28.0;
    for line in &page.lines {
        let _ = writeln!(
            ops,
            "BT /F1 {BODY_SIZE} Tf {x:.2} {y:.2} Td ({}) Tj ET",
            pdf_text(line)
        );
        y -= LINE_HEIGHT;
    }
    let _ = writeln!(
        ops,
        "BT /F1 7 Tf {x:.2} {:.2} Td ({}: cell values only. Page {number} of {total}) Tj ET",
        (frame.bottom - 14.0).max(4.0),
        pdf_text(&format!("{source} - {PRODUCER}"))
    );
    ops
}

/// Light gray text across the page centre, drawn under the listing
fn watermark_ops(ops: &mut String, text: &str, frame: &Frame) {
    // Helvetica averages about half an em per glyph
    let half_width = text.chars().count() as f64 * WATERMARK_SIZE * 0.25;
    let (cos, sin) = (std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2);
    let x = frame.width / 2.0 - half_width * cos;
    let y = frame.height / 2.0 - half_width * sin;
    let _ = writeln!(
        ops,
        "q 0.85 g BT /F1 {WATERMARK_SIZE} Tf {cos:.4} {sin:.4} {:.4} {cos:.4} {x:.2} {y:.2} Tm ({}) Tj ET Q",
        -sin,
        pdf_text(text)
    );
}

fn xmp_packet(source: &str, sheets: &[SheetTable]) -> String {
    let names: String = sheets
        .iter()
        .map(|s| format!("<rdf:li>{}</rdf:li>", xml_text(&s.name)))
        .collect();
    format!(
        r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
<rdf:Description rdf:about="" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:pdf="http://ns.adobe.com/pdf/1.3/">
<dc:format>application/pdf</dc:format>
<dc:title><rdf:Alt><rdf:li xml:lang="x-default">{title}</rdf:li></rdf:Alt></dc:title>
<dc:subject><rdf:Bag>{names}</rdf:Bag></dc:subject>
<pdf:Producer>{PRODUCER}</pdf:Producer>
</rdf:Description>
</rdf:RDF>
</x:xmpmeta>
<?xpacket end="r"?>"#,
        title = xml_text(source)
    )
}

fn stream(dict: &str, data: &[u8]) -> Vec<u8> {
    let separator = if dict.is_empty() { "" } else { " " };
    let mut out = format!("<< {dict}{separator}/Length {} >>\nstream\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\nendstream");
    out
}

fn assemble(objects: &[Vec<u8>]) -> Vec<u8> {
    let mut pdf = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n", index + 1).as_bytes());
        pdf.extend_from_slice(body);
        pdf.extend_from_slice(b"\nendobj\n");
    }

    let xref = pdf.len();
    let mut table = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = writeln!(table, "{offset:010} 00000 n ");
    }
    let _ = write!(
        table,
        "trailer\n<< /Size {} /Root 1 0 R /Info 4 0 R >>\nstartxref\n{xref}\n%%EOF\n",
        objects.len() + 1
    );
    pdf.extend_from_slice(table.as_bytes());
    pdf
}

/// Literal-string body in WinAnsi; characters outside Latin-1 become `?`
fn pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            ' '..='~' => out.push(ch),
            '\u{a0}'..='\u{ff}' => {
                let _ = write!(out, "\\{:03o}", ch as u32);
            }
            _ => out.push('?'),
        }
    }
    out
}

fn xml_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn truncate(line: &str, max_chars: usize) -> String {
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
