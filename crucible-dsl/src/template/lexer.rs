//! Segmentation of template source into text, outputs, and tags

use crate::parser::ParseError;

/// A raw template segment before expression parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSegment {
    Text(String),
    /// `{{ expression }}`
    Output { expr: String, line: usize },
    /// `{% tag ... %}`
    Tag { content: String, line: usize },
}

/// Split template source into raw segments.
pub fn segment(source: &str) -> Result<Vec<RawSegment>, ParseError> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut line = 1;
    let bytes = source.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' && i + 1 < bytes.len() && (bytes[i + 1] == b'{' || bytes[i + 1] == b'%')
        {
            let is_output = bytes[i + 1] == b'{';
            let close = if is_output { "}}" } else { "%}" };
            let start_line = line;
            if !text.is_empty() {
                segments.push(RawSegment::Text(std::mem::take(&mut text)));
            }
            let body_start = i + 2;
            let Some(rel) = source[body_start..].find(close) else {
                return Err(ParseError {
                    message: format!(
                        "Unterminated '{}' block",
                        if is_output { "{{" } else { "{%" }
                    ),
                    line: start_line,
                    column: 1,
                });
            };
            let body = &source[body_start..body_start + rel];
            line += body.matches('\n').count();
            let content = body.trim().to_string();
            if is_output {
                segments.push(RawSegment::Output {
                    expr: content,
                    line: start_line,
                });
            } else {
                segments.push(RawSegment::Tag {
                    content,
                    line: start_line,
                });
            }
            i = body_start + rel + 2;
        } else {
            let c = source[i..].chars().next().unwrap();
            if c == '\n' {
                line += 1;
            }
            text.push(c);
            i += c.len_utf8();
        }
    }
    if !text.is_empty() {
        segments.push(RawSegment::Text(text));
    }
    Ok(segments)
}
