//! Call-site locations and the pending-replacement store.
//!
//! A [`Location`] is the identity of one expectation: the absolute source file
//! plus the 1-based line of the marker call. It is captured through
//! `#[track_caller]`: every public entry point between user test code and
//! [`Location::of_caller`] carries the attribute, so the captured location is
//! the call site in the test, never a frame inside this crate. That attribute
//! chain is a contract: adding an unannotated wrapper layer silently shifts
//! every recorded location.
//!
//! The [`Replacer`] is the store those locations index: a mutex-guarded map of
//! pending replacement texts plus the set of locations whose literal has not
//! been matched yet. The lock is held only for the map mutation, never across
//! I/O, so comparisons may come from concurrent threads within one test.

use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// A file + line identity for one expectation call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub file: PathBuf,
    pub line: u32,
}

impl Location {
    /// Capture the caller's location. The compile-time file path is relative
    /// to the directory cargo compiled from, which is also the directory
    /// cargo runs tests in, so relative paths are absolutized against the
    /// current directory.
    #[track_caller]
    pub fn of_caller() -> Location {
        let caller = std::panic::Location::caller();
        Location {
            file: absolutize(Path::new(caller.file())),
            line: caller.line(),
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

#[derive(Debug, Default)]
struct State {
    replacements: HashMap<Location, String>,
    incomplete: HashSet<Location>,
}

/// Thread-safe store of pending replacements and incomplete expectations for
/// one run.
#[derive(Debug, Default)]
pub struct Replacer {
    state: Mutex<State>,
}

impl Replacer {
    /// Record a replacement candidate for `location`. The first recorded
    /// value for a location wins; a duplicate call at the same line within
    /// the run is a no-op and returns `false`. Recording also marks the
    /// location incomplete until [`Replacer::resolve`] clears it.
    pub fn record(&self, location: Location, replacement: String) -> bool {
        let mut state = self.lock();
        if state.replacements.contains_key(&location) {
            return false;
        }
        state.incomplete.insert(location.clone());
        state.replacements.insert(location, replacement);
        true
    }

    /// A literal (even an unchanged one) has been matched against this
    /// location's comparison; it is no longer incomplete.
    pub fn resolve(&self, location: &Location) {
        self.lock().incomplete.remove(location);
    }

    /// The comparison matched; drop the pending replacement.
    pub fn discard(&self, location: &Location) {
        self.lock().replacements.remove(location);
    }

    /// `(pending, incomplete)` sizes, for finalization reporting.
    pub fn counts(&self) -> (usize, usize) {
        let state = self.lock();
        (state.replacements.len(), state.incomplete.len())
    }

    /// Drain every pending entry in location order and clear the store.
    pub fn take_all(&self) -> Vec<(Location, String)> {
        let mut state = self.lock();
        state.incomplete.clear();
        let mut entries: Vec<_> = state.replacements.drain().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32) -> Location {
        Location {
            file: PathBuf::from("/tmp/sample.rs"),
            line,
        }
    }

    #[test]
    fn of_caller_points_at_the_call_line() {
        let location = Location::of_caller();
        assert_eq!(location.line, line!() - 1);
        assert!(
            location.file.ends_with("src/store.rs"),
            "unexpected file: {}",
            location.file.display()
        );
        assert!(location.file.is_absolute() || env::current_dir().is_err());
    }

    #[test]
    fn first_recorded_value_wins() {
        let store = Replacer::default();
        assert!(store.record(loc(7), "first".into()));
        assert!(!store.record(loc(7), "second".into()));
        let entries = store.take_all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, "first");
    }

    #[test]
    fn resolve_and_discard_bracket_a_comparison() {
        let store = Replacer::default();
        store.record(loc(3), "got".into());
        assert_eq!(store.counts(), (1, 1));
        store.resolve(&loc(3));
        assert_eq!(store.counts(), (1, 0));
        store.discard(&loc(3));
        assert_eq!(store.counts(), (0, 0));
    }

    #[test]
    fn take_all_is_location_ordered() {
        let store = Replacer::default();
        store.record(loc(9), "c".into());
        store.record(loc(2), "a".into());
        store.record(loc(5), "b".into());
        let lines: Vec<u32> = store.take_all().into_iter().map(|(l, _)| l.line).collect();
        assert_eq!(lines, vec![2, 5, 9]);
    }

    #[test]
    fn record_is_thread_safe() {
        let store = Replacer::default();
        std::thread::scope(|scope| {
            for i in 0..8u32 {
                let store = &store;
                scope.spawn(move || {
                    store.record(loc(i % 4), format!("value {i}"));
                });
            }
        });
        assert_eq!(store.take_all().len(), 4);
    }
}
