//! The two source forms of an expectation literal.
//!
//! Single-line text becomes an ordinary quoted string. Multi-line text becomes
//! a raw string block opened with `r#"` on the call line and closed with `"#`,
//! with the body indented one level past the call site so rewritten files stay
//! readable. [`dedent`] is the comparison-time inverse: a literal that starts
//! with a newline has the uniform indentation of its first line stripped
//! again, so a block written by the rewriter compares equal on the next run.

/// Closing delimiter of the raw block form. Text containing this sequence
/// cannot live inside a raw block and is forced into the quoted form.
pub const RAW_CLOSE: &str = "\"#";

/// Spaces per indentation level in rewritten literals.
const INDENT: usize = 4;

/// Encode a replacement as literal source text.
///
/// `column` is the 0-based column of the call expression the literal belongs
/// to; the raw-block body is indented one level past it and the closing
/// delimiter sits at the call's own column when it gets a line of its own.
pub fn encode(text: &str, column: usize) -> String {
    if !text.contains('\n') || text.contains(RAW_CLOSE) {
        return format!("{text:?}");
    }
    let body_indent = " ".repeat(column + INDENT);
    let mut lines: Vec<String> = text
        .split('\n')
        .enumerate()
        .map(|(i, line)| {
            if i > 0 && line.is_empty() {
                String::new()
            } else {
                format!("{body_indent}{line}")
            }
        })
        .collect();
    // A trailing newline in the text leaves an empty last line; that line
    // carries the closing delimiter, indented one level less than the body.
    if text.ends_with('\n') {
        if let Some(last) = lines.last_mut() {
            *last = " ".repeat(column);
        }
    }
    format!("r#\"\n{}\"#", lines.join("\n"))
}

/// Strip the uniform leading indentation from a multi-line literal.
///
/// Only literals that start with a newline are touched; the indentation of
/// the first line after it is the unit removed from every line. A final line
/// holding nothing but indentation (the closing delimiter's line) is dropped.
pub fn dedent(literal: &str) -> String {
    if !literal.starts_with('\n') {
        return literal.to_string();
    }
    let indent_len = literal[1..].chars().take_while(|&c| c == ' ').count();
    let prefix = &literal[..1 + indent_len];
    let replaced = literal.replace(prefix, "\n");
    let trimmed = match replaced.rfind('\n') {
        Some(i)
            if !replaced[i + 1..].is_empty()
                && replaced[i + 1..].chars().all(|c| c == ' ') =>
        {
            &replaced[..i + 1]
        }
        _ => replaced.as_str(),
    };
    trimmed.strip_prefix('\n').unwrap_or(trimmed).to_string()
}
