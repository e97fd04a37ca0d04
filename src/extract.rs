//! Text extraction from uploaded document bytes.
//!
//! Ingestion hands raw bytes plus a content type to [`extract_text`] and
//! gets plain UTF-8 text back. Unsupported or unreadable input yields an
//! empty string rather than an error, so the orchestrator's no-op path
//! applies uniformly to corrupt, empty, and unknown files.

use std::io::Read;

use tracing::warn;

pub const MIME_PLAIN: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Decompressed-size cap per ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Map a file extension to the content type [`extract_text`] understands.
pub fn content_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "pptx" => MIME_PPTX,
        "xlsx" => MIME_XLSX,
        "md" | "markdown" => MIME_MARKDOWN,
        _ => MIME_PLAIN,
    }
}

/// Extract plain text from document bytes.
///
/// Returns an empty string for unsupported content types and for documents
/// the format parsers reject; the failure is logged, not propagated.
pub fn extract_text(bytes: &[u8], content_type: &str) -> String {
    let result = match content_type {
        MIME_PLAIN | MIME_MARKDOWN => Ok(String::from_utf8_lossy(bytes).into_owned()),
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_ooxml(bytes, OoxmlKind::Docx),
        MIME_PPTX => extract_ooxml(bytes, OoxmlKind::Pptx),
        MIME_XLSX => extract_xlsx(bytes),
        other => {
            warn!(content_type = other, "unsupported content type, skipping");
            return String::new();
        }
    };

    match result {
        Ok(text) => text,
        Err(reason) => {
            warn!(content_type, %reason, "extraction failed, treating as empty");
            String::new()
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())
}

enum OoxmlKind {
    Docx,
    Pptx,
}

/// DOCX keeps body text in `word/document.xml`; PPTX spreads it across
/// `ppt/slides/slideN.xml`. Both store runs inside `<t>` elements.
fn extract_ooxml(bytes: &[u8], kind: OoxmlKind) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())?;

    let entry_names: Vec<String> = match kind {
        OoxmlKind::Docx => vec!["word/document.xml".to_string()],
        OoxmlKind::Pptx => {
            let mut slides: Vec<String> = archive
                .file_names()
                .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
                .map(|s| s.to_string())
                .collect();
            slides.sort_by_key(|name| {
                name.trim_start_matches("ppt/slides/slide")
                    .trim_end_matches(".xml")
                    .parse::<u32>()
                    .unwrap_or(u32::MAX)
            });
            slides
        }
    };

    let mut out = String::new();
    for name in entry_names {
        let xml = read_zip_entry(&mut archive, &name)?;
        let text = collect_tag_text(&xml, b"t")?;
        if !out.is_empty() && !text.is_empty() {
            out.push(' ');
        }
        out.push_str(&text);
    }
    Ok(out)
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())?;
    // Cell values of type "s" index into the shared-strings pool; that pool
    // holds effectively all human-readable text in the workbook.
    let shared = read_zip_entry(&mut archive, "xl/sharedStrings.xml")?;
    let text = collect_tag_text(&shared, b"t")?;
    Ok(text)
}

fn read_zip_entry(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, String> {
    let entry = archive.by_name(name).map_err(|e| e.to_string())?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(format!("ZIP entry {name} exceeds size limit"));
    }
    Ok(out)
}

/// Gather the text content of every `<tag>` element, space-separated.
fn collect_tag_text(xml: &[u8], tag: &[u8]) -> Result<String, String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_tag = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == tag {
                    in_tag = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_tag => {
                let piece = te.unescape().unwrap_or_default();
                if !piece.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(piece.as_ref());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == tag {
                    in_tag = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
