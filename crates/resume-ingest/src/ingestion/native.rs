//! Native PDF and DOCX text decoding

use async_trait::async_trait;
use lopdf::{Document, Object};
use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::config::ParserConfig;
use crate::error::{Error, Result};
use crate::providers::TextDecoder;
use crate::types::DocumentKind;

/// Common Unicode glyph name mappings for PDF fonts
fn unicode_glyph_map() -> HashMap<&'static str, char> {
    let mut map = HashMap::new();
    // Hyphens and dashes
    map.insert("uni2010", '\u{2010}');
    map.insert("uni2011", '\u{2011}');
    map.insert("uni2013", '\u{2013}');
    map.insert("uni2014", '\u{2014}');
    // Quotation marks
    map.insert("uni2018", '\u{2018}');
    map.insert("uni2019", '\u{2019}');
    map.insert("uni201C", '\u{201C}');
    map.insert("uni201D", '\u{201D}');
    // Bullets and spaces
    map.insert("uni2022", '\u{2022}');
    map.insert("uni2026", '\u{2026}');
    map.insert("uni00A0", '\u{00A0}');
    // Ligatures
    map.insert("f_i", '\u{FB01}');
    map.insert("f_l", '\u{FB02}');
    map.insert("f_f", '\u{FB00}');
    map.insert("f_f_i", '\u{FB03}');
    map.insert("f_f_l", '\u{FB04}');
    map
}

/// Replace leaked glyph names and typographic characters with plain ASCII,
/// then drop blank lines
pub(crate) fn cleanup_pdf_text(text: &str) -> String {
    let mut result = text.replace('\0', "");

    for (glyph_name, char_value) in unicode_glyph_map() {
        for pattern in [format!("({})", glyph_name), format!("<{}>", glyph_name)] {
            result = result.replace(&pattern, &char_value.to_string());
        }
    }

    result = result
        .replace(['\u{2010}', '\u{2011}', '\u{2013}'], "-")
        .replace('\u{2014}', "--")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{2022}', "* ")
        .replace('\u{2026}', "...")
        .replace('\u{00A0}', " ")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl");

    result
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decoder backed by `pdf-extract`/`lopdf` for PDF and `docx-rs` for DOCX
#[derive(Debug, Clone)]
pub struct NativeDecoder {
    pdf_timeout: Duration,
    append_hyperlinks: bool,
}

impl NativeDecoder {
    pub fn new(pdf_timeout: Duration, append_hyperlinks: bool) -> Self {
        Self {
            pdf_timeout,
            append_hyperlinks,
        }
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        Self::new(
            Duration::from_secs(config.pdf_extract_timeout_secs),
            config.append_hyperlinks,
        )
    }

    /// Blocking decode; callers on the runtime go through [`TextDecoder`]
    pub fn decode_blocking(&self, data: &[u8], kind: DocumentKind) -> Result<String> {
        match kind {
            DocumentKind::Pdf => self.decode_pdf(data),
            DocumentKind::Docx => decode_docx(data),
        }
    }

    fn decode_pdf(&self, data: &[u8]) -> Result<String> {
        let mut text = cleanup_pdf_text(&self.extract_pdf_with_timeout(data)?);

        if self.append_hyperlinks {
            let links = pdf_link_uris(data);
            if !links.is_empty() {
                tracing::debug!("Appending {} hyperlinks from PDF annotations", links.len());
                text.push('\n');
                text.push_str(&links.join("\n"));
            }
        }

        Ok(text)
    }

    /// Run `pdf-extract` on a helper thread so a pathological font cannot hang the
    /// worker. Errors and timeouts fall back to a raw content-stream scan.
    fn extract_pdf_with_timeout(&self, data: &[u8]) -> Result<String> {
        let data_vec = data.to_vec();
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let result = pdf_extract::extract_text_from_mem(&data_vec);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.pdf_timeout) {
            Ok(Ok(text)) => {
                let _ = handle.join();
                Ok(text)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                tracing::warn!("pdf-extract failed: {}, trying fallback", e);
                extract_pdf_text_fallback(data)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // The thread keeps running; its result is dropped when it finishes
                tracing::error!(
                    "PDF extraction timeout after {}s, trying fallback",
                    self.pdf_timeout.as_secs()
                );
                extract_pdf_text_fallback(data)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!("PDF extraction thread crashed");
                extract_pdf_text_fallback(data)
            }
        }
    }
}

impl Default for NativeDecoder {
    fn default() -> Self {
        Self::from_config(&ParserConfig::default())
    }
}

#[async_trait]
impl TextDecoder for NativeDecoder {
    async fn decode_text(&self, data: &[u8], kind: DocumentKind) -> Result<String> {
        let decoder = self.clone();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || decoder.decode_blocking(&data, kind))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    fn name(&self) -> &str {
        "native"
    }
}

/// Fallback PDF text extraction using lopdf directly.
///
/// Returns an empty string for image-only documents; the parser decides
/// whether that warrants OCR.
fn extract_pdf_text_fallback(data: &[u8]) -> Result<String> {
    let doc = Document::load_mem(data)
        .map_err(|e| Error::file_parse("document.pdf", format!("Failed to load PDF: {}", e)))?;

    let mut all_text = String::new();
    for (page_num, page_id) in doc.get_pages() {
        match doc.get_page_content(page_id) {
            Ok(content) => {
                let text = extract_text_from_content(&content);
                if !text.is_empty() {
                    all_text.push_str(&text);
                    all_text.push('\n');
                }
            }
            Err(e) => {
                tracing::debug!("Could not get content for page {}: {}", page_num, e);
            }
        }
    }

    if all_text.trim().is_empty() {
        tracing::warn!("Fallback extraction produced no text, PDF may be image-based");
    }

    Ok(cleanup_pdf_text(&all_text))
}

/// Pull `Tj`/`TJ` string operands out of BT..ET blocks
fn extract_text_from_content(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;
    let mut current_text = String::new();

    for line in content_str.lines() {
        let line = line.trim();

        if line == "BT" {
            in_text_block = true;
            continue;
        }

        if line == "ET" {
            in_text_block = false;
            if !current_text.is_empty() {
                text.push_str(&current_text);
                text.push('\n');
                current_text.clear();
            }
            continue;
        }

        if in_text_block && (line.ends_with("Tj") || line.ends_with("TJ")) {
            if let (Some(start), Some(end)) = (line.find('('), line.rfind(')')) {
                if start < end {
                    let decoded = line[start + 1..end]
                        .replace("\\n", "\n")
                        .replace("\\r", "\r")
                        .replace("\\t", "\t")
                        .replace("\\(", "(")
                        .replace("\\)", ")")
                        .replace("\\\\", "\\");
                    current_text.push_str(&decoded);
                }
            }
        }
    }

    text
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// URI targets of link annotations, in page order, without duplicates.
///
/// Resumes often carry profile links only as clickable annotations.
fn pdf_link_uris(data: &[u8]) -> Vec<String> {
    let doc = match Document::load_mem(data) {
        Ok(doc) => doc,
        Err(_) => return Vec::new(),
    };

    let mut uris: Vec<String> = Vec::new();
    for (_, page_id) in doc.get_pages() {
        let annots = doc
            .get_object(page_id)
            .ok()
            .and_then(|page| page.as_dict().ok())
            .and_then(|page| page.get(b"Annots").ok())
            .and_then(|annots| resolve(&doc, annots))
            .and_then(|annots| annots.as_array().ok());

        let Some(annots) = annots else { continue };

        for annot in annots {
            let uri = resolve(&doc, annot)
                .and_then(|a| a.as_dict().ok())
                .and_then(|a| a.get(b"A").ok())
                .and_then(|action| resolve(&doc, action))
                .and_then(|action| action.as_dict().ok())
                .and_then(|action| action.get(b"URI").ok())
                .and_then(|uri| resolve(&doc, uri))
                .and_then(|uri| uri.as_str().ok())
                .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string());

            if let Some(uri) = uri {
                if !uri.is_empty() && !uris.contains(&uri) {
                    uris.push(uri);
                }
            }
        }
    }

    uris
}

/// DOCX text: paragraphs (including hyperlink runs and table cells) joined with newlines
fn decode_docx(data: &[u8]) -> Result<String> {
    let doc = docx_rs::read_docx(data)
        .map_err(|e| Error::file_parse("document.docx", e.to_string()))?;

    let mut lines = Vec::new();
    for child in &doc.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(p) => lines.push(paragraph_text(p)),
            docx_rs::DocumentChild::Table(table) => table_text(table, &mut lines),
            _ => {}
        }
    }

    Ok(lines.join("\n"))
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    push_paragraph_children(&paragraph.children, &mut text);
    text
}

fn push_paragraph_children(children: &[docx_rs::ParagraphChild], text: &mut String) {
    for child in children {
        match child {
            docx_rs::ParagraphChild::Run(run) => push_run(run, text),
            docx_rs::ParagraphChild::Hyperlink(link) => {
                push_paragraph_children(&link.children, text)
            }
            _ => {}
        }
    }
}

fn push_run(run: &docx_rs::Run, text: &mut String) {
    for child in &run.children {
        if let docx_rs::RunChild::Text(t) = child {
            text.push_str(&t.text);
        }
    }
}

#[allow(irrefutable_let_patterns)]
fn table_text(table: &docx_rs::Table, lines: &mut Vec<String>) {
    for row in &table.rows {
        let docx_rs::TableChild::TableRow(row) = row;
        for cell in &row.cells {
            let docx_rs::TableRowChild::TableCell(cell) = cell;
            for content in &cell.children {
                if let docx_rs::TableCellContent::Paragraph(p) = content {
                    lines.push(paragraph_text(p));
                }
            }
        }
    }
}
