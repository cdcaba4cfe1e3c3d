//! Document text extraction.
//!
//! Uploads arrive as bytes plus a content type; [`DocumentExtractor`]
//! returns plain UTF-8 text or an [`ExtractError`]. Supported formats:
//! PDF (`pdf-extract`), DOCX/PPTX/XLSX (`zip` + `quick-xml`), and plain
//! text, Markdown and CSV.
//!
//! Extraction is CPU-bound and synchronous; async callers run it on the
//! blocking pool.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use thiserror::Error;

use pdf_chat_core::RagError;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_CSV: &str = "text/csv";

const SUPPORTED: &[&str] = &[
    MIME_PDF,
    MIME_DOCX,
    MIME_PPTX,
    MIME_XLSX,
    MIME_TEXT,
    MIME_MARKDOWN,
    MIME_CSV,
];

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Zip-bomb guard: max decompressed bytes read from one archive entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("text is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

impl From<ExtractError> for RagError {
    fn from(err: ExtractError) -> Self {
        RagError::Extraction(err.to_string())
    }
}

/// Bytes + content type → text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractError>;
}

/// Built-in extractor for every format in this module.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl TextExtractor for DocumentExtractor {
    fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
        extract_text(bytes, content_type)
    }
}

pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match essence(content_type).as_str() {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_PPTX => extract_pptx(bytes),
        MIME_XLSX => extract_xlsx(bytes),
        MIME_TEXT | MIME_MARKDOWN | MIME_CSV => extract_plain(bytes),
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

/// Infer a supported content type from a file extension.
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "docx" => Some(MIME_DOCX),
        "pptx" => Some(MIME_PPTX),
        "xlsx" => Some(MIME_XLSX),
        "txt" | "text" => Some(MIME_TEXT),
        "md" | "markdown" => Some(MIME_MARKDOWN),
        "csv" => Some(MIME_CSV),
        _ => None,
    }
}

/// Pick the content type for an upload.
///
/// A declared type wins when it is one we can extract; generic types such
/// as `application/octet-stream` fall back to the file name's extension.
pub fn resolve_content_type(
    declared: Option<&str>,
    file_name: Option<&str>,
) -> Option<&'static str> {
    if let Some(declared) = declared {
        let declared = essence(declared);
        if let Some(known) = SUPPORTED.iter().find(|s| **s == declared) {
            return Some(*known);
        }
    }
    file_name.and_then(|name| content_type_for_path(Path::new(name)))
}

/// `"Text/Plain; charset=utf-8"` → `"text/plain"`.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn extract_plain(bytes: &[u8]) -> Result<String, ExtractError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Entries named `{prefix}{n}.xml`, ordered by `n`.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    collect_runs(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut out = String::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_entry(&mut archive, &name)?;
        let text = collect_runs(&xml)?;
        if text.trim().is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(text.trim_end());
    }
    Ok(out)
}

/// Text of every `<*:t>` element, one line per `<*:p>` paragraph.
///
/// Covers both WordprocessingML (`w:t`, `w:p`) and DrawingML (`a:t`, `a:p`).
fn collect_runs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if !out.is_empty() && !out.ends_with('\n') => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    // Workbooks with only numeric cells have no shared strings part.
    let shared_strings = if archive.index_for_name("xl/sharedStrings.xml").is_some() {
        read_shared_strings(&read_entry(&mut archive, "xl/sharedStrings.xml")?)?
    } else {
        Vec::new()
    };

    let mut sheets = Vec::new();
    for name in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_entry(&mut archive, &name)?;
        let rows = sheet_rows(&xml, &shared_strings)?;
        if !rows.is_empty() {
            sheets.push(rows);
        }
    }
    Ok(sheets.join("\n\n"))
}

fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = current.is_some(),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cells joined by tabs, rows by newlines. Shared strings are resolved;
/// inline and numeric values are kept as written.
fn sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut shared = false;
    let mut cells = 0usize;
    loop {
        if cells >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared = e.attributes().flatten().any(|a| {
                        a.key.local_name().as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                let value = raw.trim();
                if !value.is_empty() {
                    let cell = if shared {
                        value
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i).cloned())
                    } else {
                        Some(value.to_string())
                    };
                    if let Some(cell) = cell {
                        row.push(cell);
                        cells += 1;
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => shared = false,
                b"row" if !row.is_empty() => rows.push(std::mem::take(&mut row).join("\t")),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join("\t"));
    }
    Ok(rows.join("\n"))
}
