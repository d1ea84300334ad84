//! Minimal `-want +got` diff rendering for mismatch reports.
//!
//! Built on line-level changesets from the `difference` crate. The only
//! contract is that equal inputs render empty and unequal inputs render the
//! changed lines prefixed `-`/`+` with up to [`CONTEXT`] common lines kept on
//! either side of a change; longer common runs are elided behind a `...`
//! line.

use difference::{Changeset, Difference};

/// Common lines shown before and after each changed region.
pub const CONTEXT: usize = 2;

/// Render the line diff between the expected and the computed text.
/// Empty when the inputs are equal.
pub fn render(want: &str, got: &str) -> String {
    if want == got {
        return String::new();
    }
    let changeset = Changeset::new(want, got, "\n");
    let total = changeset.diffs.len();
    let mut out: Vec<String> = Vec::new();
    for (i, diff) in changeset.diffs.iter().enumerate() {
        match diff {
            Difference::Same(block) => {
                let lines: Vec<&str> = block.split('\n').collect();
                let lead = if i > 0 { CONTEXT } else { 0 };
                let tail = if i + 1 < total { CONTEXT } else { 0 };
                if lines.len() <= lead + tail {
                    out.extend(lines.iter().map(|line| format!(" {line}")));
                } else {
                    out.extend(lines[..lead].iter().map(|line| format!(" {line}")));
                    out.push("...".to_string());
                    out.extend(
                        lines[lines.len() - tail..]
                            .iter()
                            .map(|line| format!(" {line}")),
                    );
                }
            }
            Difference::Rem(block) => {
                out.extend(block.split('\n').map(|line| format!("-{line}")));
            }
            Difference::Add(block) => {
                out.extend(block.split('\n').map(|line| format!("+{line}")));
            }
        }
    }
    out.join("\n") + "\n"
}
