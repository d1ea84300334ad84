//! End-to-end rewriter scenarios: whole-file batches applied to real files,
//! byte-level neighborhood checks, idempotence, and failure atomicity.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use indoc::indoc;
use pretty_assertions::assert_eq;
use retell::rewrite;
use retell::RetellError;

/// A scratch file under the system temp dir, removed on drop.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(name: &str, contents: &str) -> ScratchFile {
        let path = std::env::temp_dir().join(format!(
            "retell-{}-{name}.rs",
            std::process::id()
        ));
        fs::write(&path, contents).unwrap();
        ScratchFile { path }
    }

    fn read(&self) -> String {
        fs::read_to_string(&self.path).unwrap()
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn pending(entries: &[(u32, &str)]) -> BTreeMap<u32, String> {
    entries
        .iter()
        .map(|(line, text)| (*line, text.to_string()))
        .collect()
}

const FIXTURE: &str = indoc! {r#"
    use retell::Session;

    // exercises the sample module
    fn sample_test() {
        let rt = Session::begin();
        let parts = vec!["a", "b"];
        rt.effect(parts.len()).equals("1");
        rt.finish();
    }
"#};

#[test]
fn rewrites_only_the_target_line() {
    let scratch = ScratchFile::new("target-line", FIXTURE);
    let mut batch = pending(&[(7, "2")]);
    let written = rewrite::apply(&scratch.path, &mut batch).unwrap();
    assert!(written);

    let before: Vec<&str> = FIXTURE.lines().collect();
    let after_text = scratch.read();
    let after: Vec<&str> = after_text.lines().collect();
    assert_eq!(before.len(), after.len());
    for (i, (old, new)) in before.iter().zip(&after).enumerate() {
        if i == 6 {
            assert_eq!(*new, r#"    rt.effect(parts.len()).equals("2");"#);
        } else {
            assert_eq!(old, new, "line {} must be byte-identical", i + 1);
        }
    }
}

#[test]
fn rewriting_an_already_updated_file_is_a_no_op() {
    let scratch = ScratchFile::new("idempotent", FIXTURE);
    let mut batch = pending(&[(7, "2")]);
    assert!(rewrite::apply(&scratch.path, &mut batch).unwrap());
    let once = scratch.read();

    let mut batch = pending(&[(7, "2")]);
    assert!(!rewrite::apply(&scratch.path, &mut batch).unwrap());
    assert_eq!(scratch.read(), once);
}

#[test]
fn unmatched_location_fails_the_whole_file_batch() {
    let scratch = ScratchFile::new("unmatched", FIXTURE);
    // line 7 is resolvable, line 8 holds `rt.finish()` which is no marker
    let mut batch = pending(&[(7, "2"), (8, "ghost")]);
    let err = rewrite::apply(&scratch.path, &mut batch).unwrap_err();
    match err {
        RetellError::UnmatchedLines { file, lines } => {
            assert!(file.ends_with(".rs"));
            assert_eq!(lines, vec![8]);
        }
        other => panic!("expected UnmatchedLines, got {other:?}"),
    }
    assert_eq!(scratch.read(), FIXTURE, "failed batch must not touch the file");
}

#[test]
fn multiline_replacement_becomes_a_dedentable_raw_block() {
    let scratch = ScratchFile::new("raw-block", FIXTURE);
    let replacement = "[\n  \"a\",\n  \"b\"\n]";
    let mut batch = pending(&[(7, replacement)]);
    rewrite::apply(&scratch.path, &mut batch).unwrap();

    let after = scratch.read();
    assert!(after.contains(".equals(r#\""), "raw block expected:\n{after}");

    // read the literal back out of the rewritten source and dedent it
    let start = after.find("r#\"").unwrap() + 3;
    let end = after.find("\"#").unwrap();
    assert_eq!(retell::literal::dedent(&after[start..end]), replacement);
}

#[test]
fn existing_raw_block_literals_are_replaced_whole() {
    let source = indoc! {r##"
        fn sample_test() {
            let rt = retell::Session::begin();
            rt.effect(words())
                .equals(r#"
                    [
                      "old"
                    ]"#);
            rt.finish();
        }
    "##};
    let mut batch = pending(&[(3, "fresh")]);
    let output = rewrite::rewrite_source("sample.rs", source, &mut batch).unwrap();
    assert_eq!(
        output,
        indoc! {r#"
            fn sample_test() {
                let rt = retell::Session::begin();
                rt.effect(words())
                    .equals("fresh");
                rt.finish();
            }
        "#}
    );
}

#[test]
fn stub_calls_get_an_acceptor_with_their_trailing_comment_kept() {
    let source = indoc! {r#"
        fn sample_test() {
            let rt = retell::Session::begin();
            rt.effect(total()); // still a stub
            rt.finish();
        }
    "#};
    let mut batch = pending(&[(3, "17")]);
    let output = rewrite::rewrite_source("sample.rs", source, &mut batch).unwrap();
    assert!(
        output.contains(r#"rt.effect(total()).equals("17"); // still a stub"#),
        "{output}"
    );
}

#[test]
fn replacement_containing_the_raw_delimiter_is_always_quoted() {
    let scratch = ScratchFile::new("delimiter", FIXTURE);
    let replacement = "first\nsecond with \"# inside\nthird";
    let mut batch = pending(&[(7, replacement)]);
    rewrite::apply(&scratch.path, &mut batch).unwrap();
    let after = scratch.read();
    assert!(!after.contains(".equals(r#\""), "must not use a raw block:\n{after}");
    assert!(after.contains(".equals(\""), "{after}");
    // the quoted form still spans a single source line
    assert_eq!(after.lines().count(), FIXTURE.lines().count());
}

#[test]
fn independent_files_proceed_past_a_failing_one() {
    let good = ScratchFile::new("multi-good", FIXTURE);
    let bad = ScratchFile::new("multi-bad", "fn broken( {");
    let batches = rewrite::batch(vec![
        (bad.path.clone(), 1, "x".to_string()),
        (good.path.clone(), 7, "2".to_string()),
    ]);
    let (rewritten, failures) = rewrite::apply_all(batches);
    assert_eq!(rewritten, 1);
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], RetellError::ParseSource { .. }));
    assert!(good.read().contains(r#".equals("2")"#));
}
