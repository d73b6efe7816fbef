use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn triage_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("triage");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    // Knowledge base: category folders plus one root-level file.
    let kb = root.join("kb");
    fs::create_dir_all(kb.join("faq")).unwrap();
    fs::create_dir_all(kb.join("policies")).unwrap();
    fs::create_dir_all(kb.join("guide")).unwrap();

    let password_body = "If you forgot your password, open the login page and use the reset \
         link to set a new password. You cannot sign in until the reset completes, so check \
         your inbox for the reset email and follow the instructions. "
        .repeat(4);
    fs::write(kb.join("faq/password.txt"), password_body).unwrap();
    fs::write(
        kb.join("policies/refunds.md"),
        "# Refund policy\n\nRefunds are processed within five business days of receiving the \
         returned item. Original shipping fees are not refundable.",
    )
    .unwrap();
    fs::write(
        kb.join("guide/setup.txt"),
        "To set up the desktop application download the installer and follow the setup wizard.",
    )
    .unwrap();
    fs::write(
        kb.join("notes.txt"),
        "Miscellaneous notes that belong to no category folder.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/triage.sqlite"

[corpus]
root = "{}/kb"

[embedding]
provider = "hash"
dims = 64
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("triage.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_triage(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = triage_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run triage binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_triage(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_triage(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_triage(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_builds_index() {
    let (_tmp, config_path) = setup_test_env();

    run_triage(&config_path, &["init"]);
    let (stdout, stderr, success) = run_triage(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Ingested 4 documents"));
    assert!(stdout.contains("generation 1"));
}

#[test]
fn test_ingest_is_deterministic_across_runs() {
    let (_tmp, config_path) = setup_test_env();

    run_triage(&config_path, &["init"]);
    let (stdout1, _, _) = run_triage(&config_path, &["ingest"]);
    let (stdout2, _, success) = run_triage(&config_path, &["ingest"]);

    assert!(success);
    // Same corpus, same counts; only the generation moves.
    let chunks = |s: &str| {
        s.split("into ")
            .nth(1)
            .and_then(|t| t.split(" chunks").next())
            .map(str::to_string)
    };
    assert_eq!(chunks(&stdout1), chunks(&stdout2));
    assert!(stdout2.contains("generation 2"));
}

#[test]
fn test_ingest_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();

    run_triage(&config_path, &["init"]);
    let (stdout, _, success) = run_triage(&config_path, &["ingest", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("Dry run"));

    // Retrieval still has no index to serve.
    let (_, stderr, success) = run_triage(&config_path, &["retrieve", "password"]);
    assert!(!success);
    assert!(stderr.contains("no vector index"), "stderr={}", stderr);
}

#[test]
fn test_ingest_empty_corpus_fails() {
    let (tmp, config_path) = setup_test_env();

    // Replace the corpus with an empty directory.
    let empty = tmp.path().join("empty-kb");
    fs::create_dir_all(&empty).unwrap();
    let config = fs::read_to_string(&config_path).unwrap();
    let config = config.replace("/kb", "/empty-kb");
    fs::write(&config_path, config).unwrap();

    run_triage(&config_path, &["init"]);
    let (_, stderr, success) = run_triage(&config_path, &["ingest"]);
    assert!(!success);
    assert!(stderr.contains("produced no chunks"), "stderr={}", stderr);
}

#[test]
fn test_answer_without_index_escalates() {
    let (_tmp, config_path) = setup_test_env();

    run_triage(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_triage(&config_path, &["answer", "I forgot my password", "--json"]);
    assert!(success, "answer must not fail: stderr={}", stderr);

    let response: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(response["decision"], "ESCALATE");
    assert_eq!(response["reason"], "no match");
    assert_eq!(response["confidence"], 0.0);
    assert!(!response["response"].as_str().unwrap().is_empty());
}

#[test]
fn test_answer_grounded_ticket_approves() {
    let (_tmp, config_path) = setup_test_env();

    run_triage(&config_path, &["init"]);
    run_triage(&config_path, &["ingest"]);

    let (stdout, stderr, success) = run_triage(
        &config_path,
        &[
            "answer",
            "I forgot my password and cannot sign in",
            "--json",
        ],
    );
    assert!(success, "answer failed: stderr={}", stderr);

    let response: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(response["decision"], "APPROVE", "stdout={}", stdout);
    assert_eq!(response["reason"], "sufficient confidence");
    assert!(response["confidence"].as_f64().unwrap() >= 0.6);
    assert_eq!(response["sources"][0], "faq/password.txt");
    assert!(response["response"]
        .as_str()
        .unwrap()
        .starts_with("Thank you"));
}

#[test]
fn test_answer_is_deterministic() {
    let (_tmp, config_path) = setup_test_env();

    run_triage(&config_path, &["init"]);
    run_triage(&config_path, &["ingest"]);

    let args = ["answer", "I forgot my password and cannot sign in", "--json"];
    let (stdout1, _, _) = run_triage(&config_path, &args);
    let (stdout2, _, _) = run_triage(&config_path, &args);
    assert_eq!(stdout1, stdout2);
}

#[test]
fn test_answer_negative_sentiment_escalates() {
    let (_tmp, config_path) = setup_test_env();

    run_triage(&config_path, &["init"]);
    run_triage(&config_path, &["ingest"]);

    let (stdout, _, success) = run_triage(
        &config_path,
        &[
            "answer",
            "I forgot my password and cannot sign in",
            "--sentiment",
            "-0.9",
            "--json",
        ],
    );
    assert!(success);

    let response: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(response["decision"], "ESCALATE");
    assert_eq!(response["reason"], "negative sentiment detected");
}

#[test]
fn test_retrieve_ranks_relevant_source_first() {
    let (_tmp, config_path) = setup_test_env();

    run_triage(&config_path, &["init"]);
    run_triage(&config_path, &["ingest"]);

    let (stdout, stderr, success) =
        run_triage(&config_path, &["retrieve", "forgot password reset login"]);
    assert!(success, "retrieve failed: stderr={}", stderr);

    let first_line = stdout.lines().next().unwrap_or_default();
    assert!(
        first_line.contains("faq/password.txt"),
        "stdout={}",
        stdout
    );
}

#[test]
fn test_cache_warms_on_ingest_and_invalidates_by_source() {
    let (_tmp, config_path) = setup_test_env();

    run_triage(&config_path, &["init"]);
    run_triage(&config_path, &["ingest"]);

    let (stdout, _, success) = run_triage(&config_path, &["cache", "stats"]);
    assert!(success);
    assert!(!stdout.contains("Cache entries: 0 "), "stdout={}", stdout);

    let (stdout, _, success) = run_triage(
        &config_path,
        &["cache", "invalidate", "--source", "faq/password.txt"],
    );
    assert!(success);
    assert!(stdout.contains("Removed"), "stdout={}", stdout);
    assert!(!stdout.contains("Removed 0 "), "stdout={}", stdout);
}

#[test]
fn test_cache_invalidate_requires_exactly_one_selector() {
    let (_tmp, config_path) = setup_test_env();

    run_triage(&config_path, &["init"]);
    let (_, _, success) = run_triage(&config_path, &["cache", "invalidate"]);
    assert!(!success);
}

#[test]
fn test_stats_reports_categories() {
    let (_tmp, config_path) = setup_test_env();

    run_triage(&config_path, &["init"]);
    run_triage(&config_path, &["ingest"]);

    let (stdout, stderr, success) = run_triage(&config_path, &["stats"]);
    assert!(success, "stats failed: stderr={}", stderr);
    assert!(stdout.contains("Generation:  1"));
    assert!(stdout.contains("faq"));
    assert!(stdout.contains("policies"));
    assert!(stdout.contains("guide"));
    assert!(stdout.contains("uncategorized"));
}
