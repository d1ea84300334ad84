//! Expectation testing with self-updating literals.
//!
//! A test records an *effect* (any runtime value, canonicalized to a stable
//! string) and compares it against a literal written at the call site. When
//! the code's behavior changes, you don't edit the literals by hand: rerun
//! the tests with `RETELL_UPDATE=1` and the mismatching literals are
//! rewritten in place in the test source, everything else in the file left
//! byte-for-byte untouched.
//!
//! ```
//! let rt = retell::Session::begin();
//! rt.effect(2 + 3).equals("5");
//! rt.expect("tükör".chars().count(), "5");
//! rt.finish();
//! ```
//!
//! Multi-value results canonicalize through [`canon!`], and a trailing
//! success flag is elided when it carries no information:
//!
//! ```
//! let rt = retell::Session::begin();
//! rt.effect(retell::canon!["hello world".strip_prefix("hello"), true])
//!     .equals(" world");
//! rt.finish();
//! ```
//!
//! A brand-new expectation can be left as a stub, `rt.effect(value);` with
//! no literal at all, and the update run writes the `.equals(..)` call for
//! you. Stubs always fail outside update mode: an empty expectation is never
//! accidentally correct.

pub mod canon;
pub mod diff;
pub mod errors;
pub mod literal;
pub mod rewrite;
pub mod session;
pub mod store;
pub mod wire;

pub use canon::{canonicalize, Canon, Subject};
pub use errors::RetellError;
pub use session::{Effect, Session, REWRITE_ENV, UPDATE_ENV};
pub use store::Location;
