//! JSON payload extraction from free-form agent output.
//!
//! Agents reply in natural language and usually embed their structured
//! payload either in a fenced code block or as a bare JSON object mixed
//! into prose. Extraction tries, in order:
//!
//! 1. the first fenced code block (with or without a language tag),
//! 2. the first balanced `{...}` span,
//! 3. the whole trimmed text, if it already parses as JSON.
//!
//! The extractor only locates a candidate string; whether it is valid
//! JSON for the expected record is the validator's concern. The one
//! exception is the whole-text fallback, which must parse to avoid
//! treating arbitrary prose as a payload.

/// Extract the most plausible JSON payload from agent output.
///
/// Returns `None` when the text contains no fenced block, no balanced
/// brace span, and does not itself parse as JSON.
pub fn extract_payload(text: &str) -> Option<String> {
    if let Some(block) = first_fenced_block(text) {
        return Some(block);
    }

    if let Some(span) = balanced_brace_span(text) {
        return Some(span.to_string());
    }

    let trimmed = text.trim();
    if !trimmed.is_empty() && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }

    None
}

/// Content of the first ``` fenced block, language tag stripped.
fn first_fenced_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let end = after_fence.find("```")?;
    let mut block = &after_fence[..end];

    // Drop a leading language tag like "json" or "jsonc". The tag may
    // share a line with the payload, so any whitespace ends it.
    if let Some(tag_end) = block.find(char::is_whitespace) {
        let tag = &block[..tag_end];
        let is_tag = !tag.is_empty()
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if is_tag {
            block = &block[tag_end..];
        }
    }

    let block = block.trim();
    if block.is_empty() {
        None
    } else {
        Some(block.to_string())
    }
}

/// First span of text with balanced braces, starting at the first `{`.
///
/// Counts brace depth while skipping string literals and escape
/// sequences, so braces inside JSON strings do not terminate the span.
fn balanced_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
