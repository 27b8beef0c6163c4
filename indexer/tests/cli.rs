//! CLI contract tests for the `indexer` binary.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const MOVIES: &str = r#"{"movies": [
    {"id": 1, "title": "The Matrix", "description": "a hacker discovers reality is simulated"},
    {"id": 2, "title": "The Notebook", "description": "two lovers reunite"}
]}"#;

fn indexer(cache: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("indexer");
    cmd.env_remove("RUST_LOG").arg("--cache").arg(cache);
    cmd
}

fn built(root: &Path) -> std::path::PathBuf {
    let corpus = root.join("movies.json");
    fs::write(&corpus, MOVIES).expect("write corpus");
    let cache = root.join("cache");
    indexer(&cache).args(["build", "--input"]).arg(&corpus).assert().success();
    cache
}

#[test]
fn queries_before_build_ask_for_a_build() {
    let tmp = tempfile::tempdir().expect("tempdir");
    indexer(&tmp.path().join("cache"))
        .args(["search", "matrix"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Index not found. Please build first."));
}

#[test]
fn build_then_query() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cache = built(tmp.path());

    indexer(&cache)
        .args(["search", "matrix"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. The Matrix : 1"));

    indexer(&cache)
        .args(["tf", "1", "matrix"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Term frequency of 'matrix' in document '1': 1"));

    indexer(&cache)
        .args(["idf", "matrix"])
        .assert()
        .success()
        .stdout(predicate::str::contains(": 0.41"));

    indexer(&cache)
        .args(["bm25search", "lovers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. (2) The Notebook"))
        .stdout(predicate::str::contains("2. (1) The Matrix - Score: 0.00"));

    indexer(&cache)
        .args(["bm25tf", "1", "hacker", "--k1", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains(": 1.00"));
}

#[test]
fn multi_word_term_is_rejected() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cache = built(tmp.path());
    indexer(&cache)
        .args(["tf", "1", "the matrix"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected a single term"));
}

#[test]
fn out_of_range_bm25_parameters_are_rejected() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cache = built(tmp.path());
    indexer(&cache)
        .args(["bm25tf", "1", "hacker", "--k1", "-1", "--b", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid BM25 parameters"))
        .stdout(predicate::str::contains("NaN").not());

    indexer(&cache)
        .args(["bm25tf", "1", "hacker", "--b", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("b must be within [0, 1]"));
}

#[test]
fn malformed_corpus_fails_the_build_and_keeps_the_old_index() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cache = built(tmp.path());
    let bad = tmp.path().join("bad.json");
    fs::write(&bad, r#"[{"id": 3, "title": "No description"}]"#).expect("write corpus");

    indexer(&cache)
        .args(["build", "--input"])
        .arg(&bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("corpus load error"));

    indexer(&cache)
        .args(["search", "matrix"])
        .assert()
        .success()
        .stdout(predicate::str::contains("The Matrix"));
}
