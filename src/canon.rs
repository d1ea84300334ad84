//! Canonicalization: turning runtime values into the deterministic strings
//! that expectations are compared against.
//!
//! Every value is first converted into a [`Canon`], an explicit tagged variant
//! that fixes the capability dispatch order: self-described text, numbers,
//! booleans, nil, error messages, and finally structural JSON for everything
//! else. [`canonicalize`] then folds one or more `Canon` values into a single
//! string, eliding a trailing success flag (`true` or a nil error) so the
//! common `(value, ok)` / `(value, err)` shapes read as just the value.
//!
//! Canonicalization is pure: the same value always produces the same string
//! within a run, which is what makes rewritten expectations stable across
//! reruns.

use serde::Serialize;
use std::fmt;

/// A runtime value reduced to one of the canonical categories.
#[derive(Debug, Clone, PartialEq)]
pub enum Canon {
    /// Self-describing values and raw text or bytes, used verbatim.
    Text(String),
    /// Numeric primitives in their minimal decimal form.
    Number(String),
    Bool(bool),
    /// Absent values: `None`, `()`, a nil error slot.
    Nil,
    /// Error-like values, reduced to their message.
    Error(String),
    /// Everything else, rendered as indented structural notation.
    Structural(serde_json::Value),
}

impl Canon {
    /// Canonicalize a value through its human-readable self-description.
    pub fn display(value: impl fmt::Display) -> Canon {
        Canon::Text(value.to_string())
    }

    /// Canonicalize an error-like value; only its message survives.
    pub fn error(err: impl fmt::Display) -> Canon {
        Canon::Error(err.to_string())
    }

    /// Canonicalize a serializable value as structural notation.
    /// Serialization failure degrades to the failure's message, so the
    /// result is still a comparable string rather than a hard error.
    pub fn structural<T: Serialize>(value: &T) -> Canon {
        match serde_json::to_value(value) {
            Ok(json) => Canon::Structural(json),
            Err(err) => Canon::Error(err.to_string()),
        }
    }

    /// Single-value rendering of this canonical value.
    fn render(&self) -> String {
        match self {
            Canon::Text(s) => s.clone(),
            Canon::Number(s) => s.clone(),
            Canon::Bool(b) => b.to_string(),
            Canon::Nil => "null".to_string(),
            Canon::Error(msg) => msg.clone(),
            Canon::Structural(json) => pretty(json),
        }
    }

    /// This value's slot inside a rendered sequence.
    fn json_value(&self) -> serde_json::Value {
        match self {
            Canon::Text(s) => serde_json::Value::String(s.clone()),
            Canon::Number(s) => s
                .parse::<serde_json::Value>()
                .unwrap_or_else(|_| serde_json::Value::String(s.clone())),
            Canon::Bool(b) => serde_json::Value::Bool(*b),
            Canon::Nil => serde_json::Value::Null,
            Canon::Error(msg) => serde_json::Value::String(msg.clone()),
            Canon::Structural(json) => json.clone(),
        }
    }
}

fn pretty(json: &serde_json::Value) -> String {
    serde_json::to_string_pretty(json).unwrap_or_else(|err| err.to_string())
}

fn render_sequence(values: &[Canon]) -> String {
    let items = values.iter().map(Canon::json_value).collect();
    pretty(&serde_json::Value::Array(items))
}

/// Fold one or more canonical values into the comparison string.
///
/// A trailing `Bool` or `Nil` is treated as a success flag and elided unless
/// it signals failure or eliding would lose information; a trailing `Error`
/// renders the whole result as just its message. The exact table:
///
/// - `[a, Bool(true)]` → `a`
/// - `[a, .., Bool(true)]` → sequence of everything but the flag
/// - `[.., Bool(false)]` → sequence of everything, flag included
/// - `[.., Error(msg)]` → `msg`
/// - `[a, Nil]` → `a`
/// - `[a, .., Nil]` → sequence of everything but the nil
/// - any other tail → sequence of everything
pub fn canonicalize(values: &[Canon]) -> String {
    match values {
        [] => String::new(),
        [single] => single.render(),
        _ => {
            let n = values.len();
            match &values[n - 1] {
                Canon::Bool(false) => render_sequence(values),
                Canon::Bool(true) if n == 2 => values[0].render(),
                Canon::Bool(true) => render_sequence(&values[..n - 1]),
                Canon::Error(msg) => msg.clone(),
                Canon::Nil if n == 2 => values[0].render(),
                Canon::Nil => render_sequence(&values[..n - 1]),
                _ => render_sequence(values),
            }
        }
    }
}

// ============================================================================
// CONVERSIONS: the Subject seam the entry points accept
// ============================================================================

/// Anything a comparison entry point can take: a single value, a `canon![]`
/// list, or a `Result`/`Option` whose success flag participates in tail
/// elision.
pub trait Subject {
    fn into_canon(self) -> Vec<Canon>;
}

impl Subject for Canon {
    fn into_canon(self) -> Vec<Canon> {
        vec![self]
    }
}

impl Subject for Vec<Canon> {
    fn into_canon(self) -> Vec<Canon> {
        self
    }
}

/// `Ok(v)` reads as just `v`; `Err(e)` reads as the error message.
impl<T: Into<Canon>, E: fmt::Display> Subject for Result<T, E> {
    fn into_canon(self) -> Vec<Canon> {
        match self {
            Ok(value) => vec![value.into(), Canon::Nil],
            Err(err) => vec![Canon::Error(err.to_string())],
        }
    }
}

impl<T: Into<Canon>> Subject for Option<T> {
    fn into_canon(self) -> Vec<Canon> {
        match self {
            Some(value) => vec![value.into()],
            None => vec![Canon::Nil],
        }
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),+) => {$(
        impl From<$ty> for Canon {
            fn from(value: $ty) -> Canon {
                Canon::Number(value.to_string())
            }
        }
    )+};
}

impl_from_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<bool> for Canon {
    fn from(value: bool) -> Canon {
        Canon::Bool(value)
    }
}

impl From<()> for Canon {
    fn from(_: ()) -> Canon {
        Canon::Nil
    }
}

impl From<&str> for Canon {
    fn from(value: &str) -> Canon {
        Canon::Text(value.to_string())
    }
}

impl From<String> for Canon {
    fn from(value: String) -> Canon {
        Canon::Text(value)
    }
}

impl From<&[u8]> for Canon {
    fn from(value: &[u8]) -> Canon {
        Canon::Text(String::from_utf8_lossy(value).into_owned())
    }
}

impl From<Vec<u8>> for Canon {
    fn from(value: Vec<u8>) -> Canon {
        Canon::Text(String::from_utf8_lossy(&value).into_owned())
    }
}

impl From<serde_json::Value> for Canon {
    fn from(value: serde_json::Value) -> Canon {
        Canon::Structural(value)
    }
}

/// `None` is the nil slot, so `canon![maybe_value, ok]` works unwrapped.
impl<T: Into<Canon>> From<Option<T>> for Canon {
    fn from(value: Option<T>) -> Canon {
        match value {
            Some(inner) => inner.into(),
            None => Canon::Nil,
        }
    }
}

/// `Err` collapses to its message, `Ok` to the contained value.
impl<T: Into<Canon>, E: fmt::Display> From<Result<T, E>> for Canon {
    fn from(value: Result<T, E>) -> Canon {
        match value {
            Ok(inner) => inner.into(),
            Err(err) => Canon::Error(err.to_string()),
        }
    }
}

macro_rules! impl_subject_via_from {
    ($($ty:ty),+) => {$(
        impl Subject for $ty {
            fn into_canon(self) -> Vec<Canon> {
                vec![Canon::from(self)]
            }
        }
    )+};
}

impl_subject_via_from!(
    i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, (), &str, String, &[u8],
    Vec<u8>, serde_json::Value
);

/// Build a `Vec<Canon>` from a list of values, for multi-value comparisons:
/// `canon![parts, ok]` mirrors a function returning `(parts, ok)`.
#[macro_export]
macro_rules! canon {
    () => { ::std::vec::Vec::<$crate::Canon>::new() };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Canon::from($value)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn canon_of(subject: impl Subject) -> String {
        canonicalize(&subject.into_canon())
    }

    #[test]
    fn empty_input_is_empty_string() {
        assert_eq!(canonicalize(&[]), "");
    }

    #[test]
    fn numbers_use_minimal_decimal_form() {
        assert_eq!(canon_of(5), "5");
        assert_eq!(canon_of(3.14_f64), "3.14");
        assert_eq!(canon_of(5.0_f64), "5");
        assert_eq!(canon_of(-2_i8), "-2");
    }

    #[test]
    fn text_and_bytes_pass_through_verbatim() {
        assert_eq!(canon_of("hello\nworld"), "hello\nworld");
        assert_eq!(canon_of(b"bytes".as_slice()), "bytes");
    }

    #[test]
    fn structural_values_render_as_indented_json() {
        let canon = Canon::structural(&vec![1, 2, 3]);
        assert_eq!(canonicalize(&[canon]), "[\n  1,\n  2,\n  3\n]");
    }

    #[test]
    fn struct_fields_keep_their_declared_order() {
        #[derive(serde::Serialize)]
        struct Sample {
            name: &'static str,
            count: u32,
        }
        let canon = Canon::structural(&Sample { name: "b", count: 2 });
        assert_eq!(
            canonicalize(&[canon]),
            "{\n  \"name\": \"b\",\n  \"count\": 2\n}"
        );
    }

    #[test]
    fn display_capability_takes_precedence() {
        assert_eq!(canonicalize(&[Canon::display(7)]), "7");
    }

    #[test]
    fn tail_elision_truth_table() {
        let a = Canon::from("a");
        let b = Canon::from("b");

        // (a, true) == (a)
        assert_eq!(
            canonicalize(&[a.clone(), Canon::Bool(true)]),
            canonicalize(&[a.clone()])
        );
        // (a, false) renders as a sequence including the flag
        assert_eq!(
            canonicalize(&[a.clone(), Canon::Bool(false)]),
            "[\n  \"a\",\n  false\n]"
        );
        // (a, nil-error) == (a)
        assert_eq!(
            canonicalize(&[a.clone(), Canon::Nil]),
            canonicalize(&[a.clone()])
        );
        // (a, err) == err.message
        assert_eq!(
            canonicalize(&[a.clone(), Canon::error("boom")]),
            "boom"
        );
        // (a, b, nil-error) == sequence of (a, b)
        assert_eq!(
            canonicalize(&[a.clone(), b.clone(), Canon::Nil]),
            canonicalize(&[Canon::structural(&vec!["a", "b"])])
        );
        // more than two leading values plus a false flag keeps everything
        assert_eq!(
            canonicalize(&[a, b, Canon::from("c"), Canon::Bool(false)]),
            "[\n  \"a\",\n  \"b\",\n  \"c\",\n  false\n]"
        );
    }

    #[test]
    fn result_subjects_follow_the_tail_rules() {
        let ok: Result<i32, String> = Ok(42);
        assert_eq!(canon_of(ok), "42");
        let err: Result<i32, String> = Err("broken pipe".to_string());
        assert_eq!(canon_of(err), "broken pipe");
        let unit: Result<(), String> = Ok(());
        assert_eq!(canon_of(unit), "null");
    }

    #[test]
    fn option_subjects() {
        assert_eq!(canon_of(Some(9)), "9");
        assert_eq!(canon_of(None::<i32>), "null");
    }

    #[test]
    fn canonicalization_is_pure() {
        let values = canon!["x", 1, true];
        assert_eq!(canonicalize(&values), canonicalize(&values));
    }

    #[test]
    fn canon_list_macro_builds_sequences() {
        assert_eq!(canon_of(canon!["left", false]), "[\n  \"left\",\n  false\n]");
        assert_eq!(canon_of(canon![7]), "7");
    }
}
