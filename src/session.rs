//! The lifecycle of one expectation run.
//!
//! A [`Session`] is the explicit run context every comparison goes through:
//! begin it at the top of a test, compare effects against literal
//! expectations, and finish it (explicitly or by drop) at the end. Only one
//! session may be active in the process at a time; beginning a second is a
//! usage bug and panics.
//!
//! In normal mode a mismatch queues a failure that surfaces when the session
//! finishes (the strict variants abort immediately). In update mode,
//! `RETELL_UPDATE=1`, mismatches are tolerated and scheduled for rewrite
//! instead: at finalization the session streams its pending replacements to
//! a single process-wide rewriter child, the test binary re-executed with
//! `RETELL_REWRITE=1`. The child reads records until its stdin closes, which
//! happens when this process exits, and only then rewrites the files. One
//! apply pass after the whole run keeps every streamed line number valid
//! against the source the binary was compiled from even when an earlier
//! rewrite changes a file's length, and no file is overwritten by the
//! process whose compiled binary is still executing.

use std::env;
use std::fmt;
use std::io::{self, Write};
use std::mem;
use std::process::{self, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Once, PoisonError};
use std::thread;

use once_cell::sync::Lazy;

use crate::canon::{canonicalize, Subject};
use crate::errors::RetellError;
use crate::store::{Location, Replacer};
use crate::{diff, literal, rewrite, wire};

/// Update-mode switch, read once at first use.
pub const UPDATE_ENV: &str = "RETELL_UPDATE";
/// Self-exec marker, set only on the spawned rewriter child.
pub const REWRITE_ENV: &str = "RETELL_REWRITE";

static UPDATE_MODE: Lazy<bool> = Lazy::new(|| env::var(UPDATE_ENV).as_deref() == Ok("1"));
static ACTIVE: AtomicBool = AtomicBool::new(false);
static REWRITE_CHECK: Once = Once::new();

/// One expectation run. See the module docs for the lifecycle.
pub struct Session {
    store: Replacer,
    failures: Mutex<Vec<String>>,
    finished: bool,
}

impl Session {
    /// Start a session. Panics if another session is already active;
    /// nested or parallel runs are not supported.
    ///
    /// In a process carrying the rewrite marker this is the point where the
    /// replacement stream is read from stdin, applied, and the process exits;
    /// by the crate's usage contract `begin` is the first statement of every
    /// expectation test, so the child never runs a test body past it.
    pub fn begin() -> Session {
        REWRITE_CHECK.call_once(maybe_apply_and_exit);
        if ACTIVE.swap(true, Ordering::SeqCst) {
            panic!(
                "retell: a session is already active; \
                 nested or parallel sessions are not supported"
            );
        }
        Session {
            store: Replacer::default(),
            failures: Mutex::new(Vec::new()),
            finished: false,
        }
    }

    /// Record an effect for comparison. The returned [`Effect`] must be given
    /// its expected literal through [`Effect::equals`]; one left without a
    /// literal is a stub and fails the run (or, in update mode, has the
    /// acceptor written into the source).
    #[track_caller]
    pub fn effect(&self, subject: impl Subject) -> Effect<'_> {
        self.start(subject, false, Location::of_caller())
    }

    /// [`Session::effect`], but a mismatch aborts the test immediately
    /// instead of queueing the failure for the end of the run.
    #[track_caller]
    pub fn fatal_effect(&self, subject: impl Subject) -> Effect<'_> {
        self.start(subject, true, Location::of_caller())
    }

    /// Single-call convenience form of [`Session::effect`].
    #[track_caller]
    pub fn expect(&self, subject: impl Subject, literal: &str) {
        self.start(subject, false, Location::of_caller()).equals(literal)
    }

    /// Single-call convenience form of [`Session::fatal_effect`].
    #[track_caller]
    pub fn check(&self, subject: impl Subject, literal: &str) {
        self.start(subject, true, Location::of_caller()).equals(literal)
    }

    /// Unwrap a `Result`, aborting the test with the error's message on
    /// `Err`. Saves the usual match boilerplate around fallible setup.
    #[track_caller]
    pub fn must<T, E: fmt::Display>(&self, result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!(
                "retell: unexpected error at {}: {}",
                Location::of_caller(),
                err
            ),
        }
    }

    fn start(&self, subject: impl Subject, fatal: bool, location: Location) -> Effect<'_> {
        let got = canonicalize(&subject.into_canon());
        let tracked = self.store.record(location.clone(), got.clone());
        Effect {
            session: self,
            got,
            location,
            fatal,
            tracked,
        }
    }

    fn note_failure(&self, message: String) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    /// Finish the run: report queued failures and outstanding expectations,
    /// or, in update mode, hand the pending replacements to the rewriter
    /// child. Dropping an unfinished session does the same, except that it
    /// never panics over an already-panicking thread.
    pub fn finish(mut self) {
        self.finalize();
    }

    fn finalize(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        ACTIVE.store(false, Ordering::SeqCst);

        let failures = mem::take(
            &mut *self.failures.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let (pending, incomplete) = self.store.counts();
        let panicking = thread::panicking();

        if !*UPDATE_MODE {
            let mut messages = failures;
            if incomplete > 0 {
                messages.push(format!(
                    "incomplete expectations: rerun with {UPDATE_ENV}=1 to fill them in"
                ));
            }
            if pending > incomplete {
                messages.push(format!(
                    "wrong expectations: rerun with {UPDATE_ENV}=1 to fix them"
                ));
            }
            if messages.is_empty() {
                return;
            }
            let report = messages.join("\n");
            if panicking {
                eprintln!("retell: {report}");
            } else {
                panic!("retell: {report}");
            }
            return;
        }

        for message in &failures {
            eprintln!("retell: {message} (will update)");
        }
        let entries = self.store.take_all();
        if entries.is_empty() {
            return;
        }
        match stream_to_rewriter(&entries) {
            Ok(()) => eprintln!(
                "retell: {} expectation(s) queued; files rewrite when the test process exits",
                entries.len()
            ),
            Err(err) => {
                if panicking {
                    eprintln!("retell: expectation update failed: {err}");
                } else {
                    panic!("retell: expectation update failed: {err}");
                }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.finalize();
    }
}

/// A recorded effect waiting for its expected literal.
pub struct Effect<'a> {
    session: &'a Session,
    got: String,
    location: Location,
    fatal: bool,
    /// False when another comparison at the same location already owns the
    /// store slot; this one still compares but must not touch the slot.
    tracked: bool,
}

impl Effect<'_> {
    /// Compare the recorded effect against the expected literal. Multi-line
    /// literals written as indented raw blocks are dedented first, so blocks
    /// produced by the rewriter compare equal as written.
    pub fn equals(self, expected: &str) {
        let want = literal::dedent(expected);
        if self.tracked {
            self.session.store.resolve(&self.location);
        }
        if self.got == want {
            if self.tracked {
                self.session.store.discard(&self.location);
            }
            return;
        }
        let report = format!(
            "expectation diff at {} -want +got:\n{}",
            self.location,
            diff::render(&want, &self.got)
        );
        if *UPDATE_MODE {
            self.session.note_failure(report);
        } else if self.fatal {
            panic!("retell: {report}rerun with {UPDATE_ENV}=1 to update expectations");
        } else {
            self.session.note_failure(report);
        }
    }
}

/// The one rewriter child for the whole process. Every session streams into
/// the same child, so all entries land in a single apply pass keyed to the
/// line numbers of the source this binary was compiled from. A child per
/// session would invalidate later sessions' lines as soon as one rewrite
/// changed a file's length.
static REWRITER: Lazy<Mutex<Option<RewriterPipe>>> = Lazy::new(|| Mutex::new(None));

struct RewriterPipe {
    /// Never waited on: the child blocks reading stdin until this process
    /// exits, then applies and reports on the inherited stderr.
    _child: process::Child,
    stdin: process::ChildStdin,
}

/// Stream pending entries into the process-wide rewriter child, spawning it
/// on first use. The pipe stays open until process exit; closing it is what
/// tells the child the run is over.
fn stream_to_rewriter(entries: &[(Location, String)]) -> Result<(), RetellError> {
    let mut slot = REWRITER.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        *slot = Some(spawn_rewriter()?);
    }
    if let Some(pipe) = slot.as_mut() {
        for (location, text) in entries {
            let record = wire::encode_record(&location.file, location.line, text);
            pipe.stdin
                .write_all(record.as_bytes())
                .map_err(|err| RetellError::StreamRecords { source: err })?;
        }
    }
    Ok(())
}

/// Spawn the self-exec rewriter child. Only the stdin pipe crosses the
/// process boundary; stderr is inherited so the child's report is visible
/// after the run.
fn spawn_rewriter() -> Result<RewriterPipe, RetellError> {
    let exe = env::current_exe().map_err(|err| RetellError::SpawnRewriter { source: err })?;
    let mut child = Command::new(exe)
        .args(["--test-threads=1", "--nocapture"])
        .env(REWRITE_ENV, "1")
        .env_remove(UPDATE_ENV)
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|err| RetellError::SpawnRewriter { source: err })?;
    let stdin = child.stdin.take().ok_or_else(|| RetellError::SpawnRewriter {
        source: io::Error::new(io::ErrorKind::BrokenPipe, "child stdin unavailable"),
    })?;
    Ok(RewriterPipe {
        _child: child,
        stdin,
    })
}

/// Child-side entry: with the rewrite marker set, read the replacement
/// stream, apply it per file, report, and exit without running anything else.
fn maybe_apply_and_exit() {
    if env::var(REWRITE_ENV).as_deref() != Ok("1") {
        return;
    }
    let stdin = io::stdin();
    let records = match wire::decode_records(stdin.lock()) {
        Ok(records) => records,
        Err(err) => {
            eprintln!("retell: bad replacement stream: {err}");
            process::exit(1);
        }
    };
    let batches = rewrite::batch(
        records
            .into_iter()
            .map(|record| (record.file, record.line, record.text)),
    );
    let (rewritten, failures) = rewrite::apply_all(batches);
    if failures.is_empty() {
        eprintln!("retell: rewrote {rewritten} file(s)");
        process::exit(0);
    }
    for failure in &failures {
        eprintln!("retell: {failure}");
    }
    process::exit(1);
}
