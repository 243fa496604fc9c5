//! Per-format text extraction.
//!
//! Turns raw bytes plus a path into plain text, dispatching on the file
//! extension. Extraction is deliberately forgiving: every failure path falls
//! back to interpreting the bytes as (lossy) UTF-8, because a badly decoded
//! document is still more useful to the index than no document.

use std::io::Read;
use std::path::Path;

/// Extract plain text from `content` for the format implied by `path`.
pub fn extract(path: &Path, content: &[u8]) -> String {
    let fallback = || String::from_utf8_lossy(content).into_owned();
    match extension(path).as_str() {
        "html" | "htm" => strip_html(&String::from_utf8_lossy(content)),
        "csv" => extract_csv(content),
        "docx" => extract_docx(content).unwrap_or_else(fallback),
        "pptx" => extract_pptx(content).unwrap_or_else(fallback),
        "xlsx" => extract_xlsx(content).unwrap_or_else(fallback),
        "pdf" => extract_pdf(content).unwrap_or_else(fallback),
        // txt, md, markdown, json, xml, log, and everything unknown.
        _ => fallback(),
    }
}

/// MIME type for a path, by extension.
pub fn content_type(path: &Path) -> &'static str {
    match extension(path).as_str() {
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// Short type tag used in chunk metadata and search filters.
pub fn file_type(path: &Path) -> &'static str {
    match extension(path).as_str() {
        "txt" => "text",
        "md" | "markdown" => "markdown",
        "html" | "htm" => "html",
        "json" => "json",
        "xml" => "xml",
        "csv" => "csv",
        "pdf" => "pdf",
        "docx" | "doc" => "word",
        "pptx" => "slides",
        "xlsx" => "sheet",
        "log" => "log",
        _ => "unknown",
    }
}

/// Extensions the watcher schedules automatically.
pub fn is_indexable(path: &Path) -> bool {
    matches!(
        extension(path).as_str(),
        "txt" | "md" | "markdown" | "html" | "htm" | "json" | "xml" | "csv" | "log"
    )
}

/// Document-node properties derived from the filesystem entry.
pub fn metadata(path: &Path, size: u64, mtime: i64) -> serde_json::Map<String, serde_json::Value> {
    let mut props = serde_json::Map::new();
    props.insert(
        "filename".into(),
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
            .into(),
    );
    props.insert(
        "extension".into(),
        path.extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default()
            .into(),
    );
    props.insert("size".into(), size.into());
    props.insert("modified".into(), mtime.into());
    props.insert("size_display".into(), size_display(size).into());
    props.insert("content_type".into(), content_type(path).into());
    props.insert("file_type".into(), file_type(path).into());
    props
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn size_display(size: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let size = size as f64;
    if size < MB {
        format!("{:.2} KB", size / KB)
    } else if size < GB {
        format!("{:.2} MB", size / MB)
    } else {
        format!("{:.2} GB", size / GB)
    }
}

/// Drop everything between `<` and `>`, then tidy the leftover whitespace.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }

    out.replace("\n ", "\n").replace("  ", " ")
}

fn extract_csv(content: &[u8]) -> String {
    let text = String::from_utf8_lossy(content);
    let mut out = String::with_capacity(text.len());

    for line in text.lines() {
        for field in line.split(',') {
            let cleaned = field.trim();
            if !cleaned.is_empty() {
                out.push_str(cleaned);
                out.push(' ');
            }
        }
        out.push('\n');
    }
    out
}

/// Concatenated `<w:t>` runs from `word/document.xml`, with paragraph
/// breaks. `None` when the archive or XML is unreadable.
fn extract_docx(content: &[u8]) -> Option<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(content)).ok()?;
    let mut doc_xml = Vec::new();
    archive
        .by_name("word/document.xml")
        .ok()?
        .read_to_end(&mut doc_xml)
        .ok()?;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(doc_xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Slide text from `ppt/slides/slideN.xml` entries, in slide order.
fn extract_pptx(content: &[u8]) -> Option<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(content)).ok()?;

    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut out = String::new();
    for name in slide_names {
        let mut xml = Vec::new();
        archive.by_name(&name).ok()?.read_to_end(&mut xml).ok()?;
        let text = collect_t_elements(&xml)?;
        if !out.is_empty() && !text.is_empty() {
            out.push('\n');
        }
        out.push_str(&text);
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Shared-string cell values across all worksheets.
fn extract_xlsx(content: &[u8]) -> Option<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(content)).ok()?;

    let mut shared_xml = Vec::new();
    archive
        .by_name("xl/sharedStrings.xml")
        .ok()?
        .read_to_end(&mut shared_xml)
        .ok()?;
    let strings = collect_shared_strings(&shared_xml)?;

    if strings.is_empty() {
        return None;
    }
    Some(strings.join(" "))
}

/// Text of every `<t>` element in an OOXML fragment.
fn collect_t_elements(xml: &[u8]) -> Option<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        if !out.is_empty() {
                            out.push(' ');
                        }
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
    Some(out)
}

fn collect_shared_strings(xml: &[u8]) -> Option<Vec<String>> {
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        strings.push(te.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
    Some(strings)
}

fn extract_pdf(content: &[u8]) -> Option<String> {
    pdf_extract::extract_text_from_mem(content).ok()
}
