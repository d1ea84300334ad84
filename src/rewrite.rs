//! Format-preserving rewriting of expectation literals in Rust source.
//!
//! The file is parsed with `syn` (with `proc-macro2` span locations), but the
//! tree is only used to *locate* byte ranges: the output is produced by
//! splicing the encoded replacement text into the original source, so every
//! byte outside the touched literals round-trips exactly, comments and
//! formatting included.
//!
//! Two call shapes are recognized, forming a closed set:
//!
//! - the two-stage form `session.effect(..).equals(<literal>)` (and
//!   `fatal_effect`), where the literal is the acceptor's argument;
//! - the single-call form `session.expect(.., <literal>)` (and `check`),
//!   where the literal is the final argument.
//!
//! A bare two-stage marker in statement position is a stub and gets the
//! acceptor appended after the call. A marker in any other position that no
//! acceptor reaches is left alone, so its line stays unmatched and fails the
//! file rather than getting a guessed patch spliced mid-expression. The match
//! key is the line of the marker method's identifier, which is also the line
//! `#[track_caller]` reports for the call at record time.
//!
//! Per-file batches are all-or-nothing: any location that no recognized call
//! accounts for, a non-literal in a literal slot, or a parse failure abandons
//! the whole file before anything is written.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use miette::NamedSource;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{Expr, ExprLit, ExprMethodCall, Lit, Stmt};

use crate::errors::{display_path, RetellError};
use crate::literal;

/// Marker methods whose literal arrives through a later `.equals(..)` call.
const TWO_STAGE: [&str; 2] = ["effect", "fatal_effect"];
/// Marker methods that carry the literal as their final argument.
const SINGLE_CALL: [&str; 2] = ["expect", "check"];
/// The deferred literal acceptor of the two-stage form.
const ACCEPTOR: &str = "equals";

/// One byte-range splice. An empty range is an insertion.
#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

struct MarkerVisitor<'a> {
    file: &'a str,
    source: &'a str,
    pending: &'a mut BTreeMap<u32, String>,
    edits: Vec<Edit>,
    failure: Option<RetellError>,
}

/// Strip parentheses and macro groups around an expression.
fn peel(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(paren) => peel(&paren.expr),
        Expr::Group(group) => peel(&group.expr),
        _ => expr,
    }
}

impl MarkerVisitor<'_> {
    fn replace_literal(&mut self, column: usize, slot: &Expr, replacement: String) {
        match slot {
            Expr::Lit(ExprLit {
                lit: Lit::Str(lit), ..
            }) => {
                let range = lit.span().byte_range();
                self.edits.push(Edit {
                    start: range.start,
                    end: range.end,
                    text: literal::encode(&replacement, column),
                });
            }
            other => {
                let range = other.span().byte_range();
                self.failure = Some(RetellError::NotALiteral {
                    file: self.file.to_string(),
                    src: NamedSource::new(self.file, self.source.to_string()),
                    span: (range.start, range.end.saturating_sub(range.start)).into(),
                });
            }
        }
    }
}

impl<'ast> Visit<'ast> for MarkerVisitor<'_> {
    fn visit_stmt(&mut self, node: &'ast Stmt) {
        if self.failure.is_some() {
            return;
        }
        // A bare marker call as a whole statement is a stub expectation: the
        // acceptor is appended after the call, leaving any trailing comment
        // untouched because the splice inserts directly after the closing
        // parenthesis. Markers in any other position (bound to a variable,
        // nested in a larger expression) stay untouched and leave their line
        // unmatched, which fails the whole file.
        if let Stmt::Expr(expr, Some(_)) = node {
            if let Expr::MethodCall(call) = peel(expr) {
                if TWO_STAGE.contains(&call.method.to_string().as_str()) {
                    let line = call.method.span().start().line as u32;
                    if let Some(replacement) = self.pending.remove(&line) {
                        let column = call.span().start().column;
                        let at = call.span().byte_range().end;
                        self.edits.push(Edit {
                            start: at,
                            end: at,
                            text: format!(".equals({})", literal::encode(&replacement, column)),
                        });
                    }
                }
            }
        }
        visit::visit_stmt(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast ExprMethodCall) {
        if self.failure.is_some() {
            return;
        }
        let method = node.method.to_string();
        if method == ACCEPTOR && node.args.len() == 1 {
            if let Expr::MethodCall(marker) = peel(&node.receiver) {
                if TWO_STAGE.contains(&marker.method.to_string().as_str()) {
                    let line = marker.method.span().start().line as u32;
                    if let Some(replacement) = self.pending.remove(&line) {
                        let column = marker.span().start().column;
                        self.replace_literal(column, &node.args[0], replacement);
                    }
                }
            }
        } else if SINGLE_CALL.contains(&method.as_str()) && node.args.len() >= 2 {
            // Two arguments minimum keeps unrelated calls that share a marker
            // name, like `Option::expect(msg)`, out of the match.
            let line = node.method.span().start().line as u32;
            if let Some(replacement) = self.pending.remove(&line) {
                let column = node.span().start().column;
                if let Some(slot) = node.args.last() {
                    self.replace_literal(column, slot, replacement);
                }
            }
        }
        visit::visit_expr_method_call(self, node);
    }
}

/// Rewrite `source` in memory, consuming matched lines from `pending`.
///
/// `file` is only a display name for errors. On success every pending line
/// was matched and the returned text differs from `source` only inside the
/// rewritten literal ranges.
pub fn rewrite_source(
    file: &str,
    source: &str,
    pending: &mut BTreeMap<u32, String>,
) -> Result<String, RetellError> {
    if pending.is_empty() {
        return Ok(source.to_string());
    }
    let ast = syn::parse_file(source).map_err(|err| RetellError::ParseSource {
        file: file.to_string(),
        message: err.to_string(),
    })?;
    let mut visitor = MarkerVisitor {
        file,
        source,
        pending: &mut *pending,
        edits: Vec::new(),
        failure: None,
    };
    visitor.visit_file(&ast);
    let MarkerVisitor {
        mut edits, failure, ..
    } = visitor;
    if let Some(failure) = failure {
        return Err(failure);
    }
    if !pending.is_empty() {
        return Err(RetellError::UnmatchedLines {
            file: base_name(file),
            lines: pending.keys().copied().collect(),
        });
    }
    // Back-to-front so earlier offsets stay valid while splicing.
    edits.sort_by(|a, b| b.start.cmp(&a.start));
    let mut output = source.to_string();
    for edit in edits {
        output.replace_range(edit.start..edit.end, &edit.text);
    }
    Ok(output)
}

fn base_name(file: &str) -> String {
    Path::new(file)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}

/// Apply one file's batch. Returns whether the file was rewritten; a clean
/// no-op (already up to date) reports `false` without touching the file.
pub fn apply(path: &Path, pending: &mut BTreeMap<u32, String>) -> Result<bool, RetellError> {
    if pending.is_empty() {
        return Ok(false);
    }
    let file = display_path(path);
    let source = fs::read_to_string(path).map_err(|err| RetellError::ReadSource {
        file: file.clone(),
        source: err,
    })?;
    let rewritten = rewrite_source(&file, &source, pending)?;
    if rewritten == source {
        return Ok(false);
    }
    write_atomic(path, &rewritten)?;
    Ok(true)
}

/// Apply every file's batch. Files are independent: a failure in one leaves
/// the others to proceed. Returns the number of files rewritten and every
/// error encountered, in file order.
pub fn apply_all(
    batches: BTreeMap<PathBuf, BTreeMap<u32, String>>,
) -> (usize, Vec<RetellError>) {
    let mut rewritten = 0;
    let mut failures = Vec::new();
    for (path, mut pending) in batches {
        match apply(&path, &mut pending) {
            Ok(true) => rewritten += 1,
            Ok(false) => {}
            Err(err) => failures.push(err),
        }
    }
    (rewritten, failures)
}

/// Group raw `(file, line, replacement)` entries into per-file batches,
/// keeping the first entry for a duplicated location.
pub fn batch<I>(entries: I) -> BTreeMap<PathBuf, BTreeMap<u32, String>>
where
    I: IntoIterator<Item = (PathBuf, u32, String)>,
{
    let mut batches: BTreeMap<PathBuf, BTreeMap<u32, String>> = BTreeMap::new();
    for (file, line, text) in entries {
        batches.entry(file).or_default().entry(line).or_insert(text);
    }
    batches
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), RetellError> {
    let file = display_path(path);
    let tmp_name = match path.file_name() {
        Some(name) => format!(".{}.retell-tmp", name.to_string_lossy()),
        None => ".retell-tmp".to_string(),
    };
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, contents).map_err(|err| RetellError::WriteBack {
        file: file.clone(),
        source: err,
    })?;
    fs::rename(&tmp, path).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        RetellError::WriteBack { file, source: err }
    })
}
