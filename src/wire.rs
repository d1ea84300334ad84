//! The replacement stream between parent and rewriter child.
//!
//! One record per line, three whitespace-separated tokens: the quoted absolute
//! file path, the decimal line number, and the quoted replacement text. The
//! quoting is JSON string syntax, which keeps records single-line (newlines
//! and quotes are escaped) and round-trips any text exactly. The stream is
//! terminated by end of input.

use std::io::BufRead;
use std::path::PathBuf;

use crate::errors::RetellError;

/// One parsed replacement record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub file: PathBuf,
    pub line: u32,
    pub text: String,
}

/// Encode one record, newline-terminated.
pub fn encode_record(file: &std::path::Path, line: u32, text: &str) -> String {
    format!(
        "{} {} {}\n",
        quote(&file.to_string_lossy()),
        line,
        quote(text)
    )
}

/// Read records until end of input. Blank lines are ignored; anything else
/// that does not parse as exactly three tokens is a protocol error naming the
/// offending record.
pub fn decode_records<R: BufRead>(reader: R) -> Result<Vec<Record>, RetellError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| bad_record(index, format!("read failed: {err}")))?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse_record(index, &line)?);
    }
    Ok(records)
}

fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn unquote(index: usize, token: &str) -> Result<String, RetellError> {
    serde_json::from_str::<String>(token)
        .map_err(|err| bad_record(index, format!("bad quoted token {token}: {err}")))
}

fn bad_record(index: usize, message: String) -> RetellError {
    RetellError::BadRecord {
        record: index + 1,
        message,
    }
}

fn parse_record(index: usize, line: &str) -> Result<Record, RetellError> {
    let (file_token, rest) = next_token(index, line)?;
    let (line_token, rest) = next_token(index, rest)?;
    let (text_token, rest) = next_token(index, rest)?;
    if !rest.trim().is_empty() {
        return Err(bad_record(index, format!("trailing input {rest:?}")));
    }
    Ok(Record {
        file: PathBuf::from(unquote(index, file_token)?),
        line: line_token
            .parse()
            .map_err(|err| bad_record(index, format!("bad line number {line_token:?}: {err}")))?,
        text: unquote(index, text_token)?,
    })
}

/// Split off the next token: either a quoted string (escape-aware) or a bare
/// run of non-whitespace. Returns the token and the remaining input.
fn next_token<'a>(index: usize, input: &'a str) -> Result<(&'a str, &'a str), RetellError> {
    let input = input.trim_start();
    if input.is_empty() {
        return Err(bad_record(index, "missing token".to_string()));
    }
    if let Some(rest) = input.strip_prefix('"') {
        let mut escaped = false;
        for (i, c) in rest.char_indices() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                let end = 1 + i + c.len_utf8();
                return Ok((&input[..end], &input[end..]));
            }
        }
        Err(bad_record(index, "unterminated quoted token".to_string()))
    } else {
        let end = input
            .find(char::is_whitespace)
            .unwrap_or(input.len());
        Ok((&input[..end], &input[end..]))
    }
}
