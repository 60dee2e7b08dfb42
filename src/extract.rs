//! PDF text extraction
//!
//! Pulls plain text out of uploaded PDF bytes with lopdf. Extraction is
//! tolerant on purpose: pages that fail to parse are skipped with a warning,
//! and only a document with no extractable text at all is reported as a
//! data failure.

use regex_lite::Regex;
use tracing::{debug, warn};

use crate::errors::PipelineError;

/// Extract the text content of a PDF document.
pub fn extract_text(bytes: &[u8]) -> Result<String, PipelineError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| PipelineError::Data(format!("failed to parse PDF: {e}")))?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "extracting text from PDF");

    let mut text = String::new();
    for (page_num, page_id) in pages {
        match doc.get_page_content(page_id) {
            Ok(content) => {
                let page_text = page_text(&content);
                if !page_text.trim().is_empty() {
                    text.push_str(&format!("\n--- Page {page_num} ---\n"));
                    text.push_str(&page_text);
                    text.push('\n');
                }
            }
            Err(e) => {
                warn!(page = page_num, error = %e, "failed to read page content, skipping");
            }
        }
    }

    if text.trim().is_empty() {
        return Err(PipelineError::Data(
            "no text could be extracted from the document".into(),
        ));
    }

    let cleaned = clean_text(&text);
    debug!(
        raw_len = text.len(),
        cleaned_len = cleaned.len(),
        "text extraction complete"
    );

    Ok(cleaned)
}

/// Pull the shown text out of a page content stream. Scans BT/ET text
/// blocks for the Tj/TJ/quote operators; one line per text block so
/// paragraph structure survives into chunking.
fn page_text(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut block = String::new();
    let mut in_text_block = false;

    for line in content_str.lines() {
        let trimmed = line.trim();
        match trimmed {
            "BT" => in_text_block = true,
            "ET" => {
                in_text_block = false;
                if !block.is_empty() {
                    text.push_str(block.trim_end());
                    text.push('\n');
                    block.clear();
                }
            }
            _ if in_text_block => {
                if let Some(shown) = shown_text(trimmed) {
                    block.push_str(&shown);
                    block.push(' ');
                }
            }
            _ => {}
        }
    }

    text
}

/// Text operand of a single content-stream line, if it is a text-showing
/// operator (`(..) Tj`, `[..] TJ`, `'` or `"`).
fn shown_text(line: &str) -> Option<String> {
    let is_show = line.ends_with("Tj") || line.ends_with("TJ") || line.ends_with('\'') || line.ends_with('"');
    if !is_show {
        return None;
    }

    let mut result = String::new();
    let mut literal = String::new();
    let mut in_literal = false;
    let mut escaped = false;

    for ch in line.chars() {
        if in_literal {
            if escaped {
                literal.push(ch);
                escaped = false;
            } else if ch == '\\' {
                literal.push(ch);
                escaped = true;
            } else if ch == ')' {
                in_literal = false;
                result.push_str(&decode_literal(&literal));
                literal.clear();
            } else {
                literal.push(ch);
            }
        } else if ch == '(' {
            in_literal = true;
        }
    }

    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

/// Decode PDF string escape sequences.
fn decode_literal(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some(c) => result.push(c),
                None => {}
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Cleanup pass over extracted text. Keeps line structure (the chunker
/// splits on paragraph and line breaks) while collapsing runs of spaces
/// and stripping control characters.
fn clean_text(text: &str) -> String {
    let control = Regex::new(r"[\x00-\x08\x0b-\x1f\x7f]").expect("valid regex");
    let spaces = Regex::new(r"[ \t]+").expect("valid regex");
    let blank_lines = Regex::new(r"\n{3,}").expect("valid regex");

    let text = control.replace_all(text, " ");
    let text = spaces.replace_all(&text, " ");
    let text = blank_lines.replace_all(&text, "\n\n");

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_escape_sequences() {
        assert_eq!(decode_literal("Hello\\nWorld"), "Hello\nWorld");
        assert_eq!(decode_literal("Test\\(paren\\)"), "Test(paren)");
        assert_eq!(decode_literal("plain"), "plain");
    }

    #[test]
    fn extracts_tj_operand() {
        assert_eq!(shown_text("(Hello World) Tj"), Some("Hello World".into()));
        assert_eq!(shown_text("0 -14 Td"), None);
    }

    #[test]
    fn extracts_tj_array_operands() {
        assert_eq!(
            shown_text("[(Hel) -20 (lo)] TJ"),
            Some("Hello".to_string())
        );
    }

    #[test]
    fn clean_preserves_paragraph_breaks() {
        let input = "one   two\n\n\n\nthree\tfour";
        assert_eq!(clean_text(input), "one two\n\nthree four");
    }

    #[test]
    fn garbage_bytes_are_a_data_error() {
        let err = extract_text(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));
    }
}
