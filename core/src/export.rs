use crate::api::{RawCitation, RawMessage};
use crate::session::Surface;

/// Column width the PDF body text wraps to.
const WRAP_COLUMNS: usize = 90;
/// Vertical cursor positions are tracked in the layout units of the
/// original export (millimetre-ish); a page breaks once the cursor passes
/// this offset.
const PAGE_BREAK_Y: f64 = 270.0;
/// Layout unit to PDF point scale (A4: 595x842pt).
const UNIT_TO_PT: f64 = 2.835;
const PAGE_HEIGHT_PT: f64 = 842.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Pdf,
    Text,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "txt",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "text" | "txt" => Ok(Self::Text),
            other => Err(format!("unknown export format '{other}' (pdf, text)")),
        }
    }
}

pub fn transcript_file_name(session_id: &str, format: ExportFormat) -> String {
    format!("chat_history_{session_id}.{}", format.extension())
}

fn role_label(role: &str) -> &'static str {
    if role.eq_ignore_ascii_case("user") {
        "User:"
    } else {
        "Assistant:"
    }
}

/// Last path segment, splitting on both separators the backend may emit.
fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn citation_label(surface: Surface, citation: &RawCitation) -> String {
    match surface {
        Surface::Document => format!(
            "Source:{}(Page: {})",
            basename(&citation.file_name),
            citation.page_number.unwrap_or(0)
        ),
        Surface::Wikipedia => format!("Source: {}", citation.file_name),
    }
}

/// Flat line-oriented transcript, server order (oldest first).
pub fn render_text(surface: Surface, messages: &[RawMessage]) -> String {
    let mut out = String::from("Chat History\n\n");
    for message in messages {
        out.push_str(role_label(&message.role));
        out.push('\n');
        out.push_str(&message.content);
        out.push('\n');
        for citation in &message.citation_info {
            out.push_str(&citation_label(surface, citation));
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Word-wrap one paragraph to `width` columns, hard-breaking words that are
/// longer than a full line.
fn wrap_line(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word;
        // hard-break oversized words
        while word.chars().count() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let split: String = word.chars().take(width).collect();
            word = &word[split.len()..];
            lines.push(split);
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    text.lines()
        .flat_map(|line| wrap_line(line, width))
        .collect()
}

struct TextRun {
    x: f64,
    y: f64,
    size: f64,
    text: String,
}

/// Lay the transcript out into pages, mirroring the cursor arithmetic of
/// the original export: header at y=10, labels advance 7, body lines 7,
/// citation lines 5, 3 between messages, page break checked per message.
fn layout(surface: Surface, messages: &[RawMessage]) -> Vec<Vec<TextRun>> {
    let mut pages: Vec<Vec<TextRun>> = Vec::new();
    let mut page: Vec<TextRun> = Vec::new();
    let mut y = 10.0;
    page.push(TextRun {
        x: 10.0,
        y,
        size: 14.0,
        text: "Chat History".to_string(),
    });
    y += 10.0;

    for message in messages {
        page.push(TextRun {
            x: 10.0,
            y,
            size: 12.0,
            text: role_label(&message.role).to_string(),
        });
        y += 7.0;
        for line in wrap_text(&message.content, WRAP_COLUMNS) {
            page.push(TextRun {
                x: 15.0,
                y,
                size: 12.0,
                text: line,
            });
            y += 7.0;
        }
        for citation in &message.citation_info {
            page.push(TextRun {
                x: 15.0,
                y,
                size: 10.0,
                text: citation_label(surface, citation),
            });
            y += 5.0;
        }
        y += 3.0;
        if y > PAGE_BREAK_Y {
            pages.push(std::mem::take(&mut page));
            y = 10.0;
        }
    }
    if !page.is_empty() {
        pages.push(page);
    }
    if pages.is_empty() {
        pages.push(Vec::new());
    }
    pages
}

fn escape_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\\' => out.push_str("\\\\"),
            c if c.is_ascii_graphic() || c == ' ' => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn content_stream(runs: &[TextRun]) -> Vec<u8> {
    let mut stream = String::new();
    for run in runs {
        let x = run.x * UNIT_TO_PT;
        let y = PAGE_HEIGHT_PT - run.y * UNIT_TO_PT;
        stream.push_str(&format!(
            "BT /F1 {:.1} Tf {:.1} {:.1} Td ({}) Tj ET\n",
            run.size,
            x,
            y,
            escape_pdf_text(&run.text)
        ));
    }
    stream.into_bytes()
}

/// Minimal single-font PDF: catalog, page tree, Helvetica, one content
/// stream per page, cross-reference table. The reference corpus carries no
/// PDF crate, so the writer lives here.
pub fn render_pdf(surface: Surface, messages: &[RawMessage]) -> Vec<u8> {
    let pages = layout(surface, messages);
    let page_count = pages.len();

    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects: Vec<Vec<u8>> = Vec::with_capacity(3 + 2 * page_count);
    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
    objects.push(format!("<< /Type /Pages /Kids [{kids}] /Count {page_count} >>").into_bytes());
    objects.push(b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_vec());
    for (i, runs) in pages.iter().enumerate() {
        let content_id = 5 + 2 * i;
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>"
            )
            .into_bytes(),
        );
        let stream = content_stream(runs);
        let mut object = format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
        object.extend_from_slice(&stream);
        object.extend_from_slice(b"endstream");
        objects.push(object);
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}
