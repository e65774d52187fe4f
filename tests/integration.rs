use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn dv_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("dv");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Sample uploads. The PDF is deliberately junk bytes so extraction
    // produces a deterministic failure marker regardless of what OCR
    // tooling the host has installed.
    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(files_dir.join("report.pdf"), b"not really a pdf").unwrap();
    fs::write(files_dir.join("notes.txt"), b"plain text is not accepted").unwrap();
    fs::write(files_dir.join("huge.pdf"), vec![0u8; 2 * 1024 * 1024]).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/dv.sqlite"

[storage]
upload_dir = "{root}/uploads"
max_file_size_mb = 1

[server]
bind = "127.0.0.1:7431"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("dv.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_dv(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = dv_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        // Force the keyword fallback so `ask` output is deterministic
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run dv binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Run `dv upload` and return the new document's id.
fn upload(config_path: &Path, file: &Path, extra: &[&str]) -> String {
    let mut args = vec!["upload", file.to_str().unwrap()];
    args.extend_from_slice(extra);
    let (stdout, stderr, success) = run_dv(config_path, &args);
    assert!(success, "upload failed: stdout={}, stderr={}", stdout, stderr);

    // First line: "Uploaded <id> (<n> bytes)"
    let line = stdout.lines().next().unwrap();
    line.strip_prefix("Uploaded ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_else(|| panic!("unexpected upload output: {}", stdout))
        .to_string()
}

fn sample_pdf(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("files")
        .join("report.pdf")
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_dv(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_dv(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_dv(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_upload_rejects_unknown_extension() {
    let (_tmp, config_path) = setup_test_env();
    run_dv(&config_path, &["init"]);

    let txt = sample_pdf(&config_path).with_file_name("notes.txt");
    let (stdout, stderr, success) = run_dv(&config_path, &["upload", txt.to_str().unwrap()]);
    assert!(!success, "txt upload should fail: stdout={}", stdout);
    assert!(stderr.contains("not allowed"), "stderr={}", stderr);

    // Nothing was stored
    let (stdout, _, _) = run_dv(&config_path, &["list"]);
    assert!(stdout.contains("No documents found"));
}

#[test]
fn test_upload_rejects_oversized_file() {
    let (_tmp, config_path) = setup_test_env();
    run_dv(&config_path, &["init"]);

    let huge = sample_pdf(&config_path).with_file_name("huge.pdf");
    let (stdout, stderr, success) = run_dv(&config_path, &["upload", huge.to_str().unwrap()]);
    assert!(!success, "oversized upload should fail: stdout={}", stdout);
    assert!(stderr.contains("File too large"), "stderr={}", stderr);
}

#[test]
fn test_upload_and_get() {
    let (_tmp, config_path) = setup_test_env();
    run_dv(&config_path, &["init"]);

    let pdf = sample_pdf(&config_path);
    let id = upload(&config_path, &pdf, &["--tags", "finance,q3"]);

    let (stdout, stderr, success) = run_dv(&config_path, &["get", &id]);
    assert!(success, "get failed: stdout={}, stderr={}", stdout, stderr);
    // Title defaults to the original filename
    assert!(stdout.contains("Title:    report.pdf"));
    assert!(stdout.contains("finance"));
    assert!(stdout.contains("q3"));
    // Junk bytes cannot parse, so the stored text is the failure marker
    assert!(stdout.contains("[extraction failed:"), "stdout={}", stdout);
}

#[test]
fn test_list_filters_by_tag_case_insensitively() {
    let (_tmp, config_path) = setup_test_env();
    run_dv(&config_path, &["init"]);

    let pdf = sample_pdf(&config_path);
    let id = upload(&config_path, &pdf, &["--tags", "Finance"]);

    let (stdout, _, success) = run_dv(&config_path, &["list", "--tag", "FINANCE"]);
    assert!(success);
    assert!(stdout.contains(&id));

    let (stdout, _, success) = run_dv(&config_path, &["list", "--tag", "legal"]);
    assert!(success);
    assert!(stdout.contains("No documents found"));
}

#[test]
fn test_search_matches_title() {
    let (_tmp, config_path) = setup_test_env();
    run_dv(&config_path, &["init"]);

    let pdf = sample_pdf(&config_path);
    let id = upload(&config_path, &pdf, &["--title", "Quarterly revenue report"]);

    let (stdout, _, success) = run_dv(&config_path, &["search", "revenue"]);
    assert!(success);
    assert!(stdout.contains(&id));

    let (stdout, _, success) = run_dv(&config_path, &["search", "payroll"]);
    assert!(success);
    assert!(stdout.contains("No documents found"));
}

#[test]
fn test_update_title_and_tags() {
    let (_tmp, config_path) = setup_test_env();
    run_dv(&config_path, &["init"]);

    let pdf = sample_pdf(&config_path);
    let id = upload(&config_path, &pdf, &["--tags", "draft"]);

    let (stdout, stderr, success) = run_dv(
        &config_path,
        &["update", &id, "--title", "Final report", "--tags", "final"],
    );
    assert!(success, "update failed: stdout={}, stderr={}", stdout, stderr);

    let (stdout, _, _) = run_dv(&config_path, &["get", &id]);
    assert!(stdout.contains("Title:    Final report"));
    assert!(stdout.contains("final"));
    assert!(!stdout.contains("draft"));
}

#[test]
fn test_update_requires_ownership() {
    let (_tmp, config_path) = setup_test_env();
    run_dv(&config_path, &["init"]);

    let pdf = sample_pdf(&config_path);
    let id = upload(&config_path, &pdf, &[]);

    let (_, stderr, success) = run_dv(
        &config_path,
        &["update", &id, "--title", "Hijacked", "--user", "mallory"],
    );
    assert!(!success, "non-owner update should fail");
    assert!(stderr.contains("your own documents"), "stderr={}", stderr);

    // Admins bypass the ownership check
    let (_, _, success) = run_dv(
        &config_path,
        &[
            "update", &id, "--title", "Renamed", "--user", "mallory", "--role", "admin",
        ],
    );
    assert!(success, "admin update should succeed");
}

#[test]
fn test_delete_hides_document() {
    let (_tmp, config_path) = setup_test_env();
    run_dv(&config_path, &["init"]);

    let pdf = sample_pdf(&config_path);
    let id = upload(&config_path, &pdf, &[]);

    let (_, stderr, success) = run_dv(&config_path, &["delete", &id]);
    assert!(success, "delete failed: stderr={}", stderr);

    let (stdout, _, _) = run_dv(&config_path, &["list"]);
    assert!(stdout.contains("No documents found"));

    let (_, _, success) = run_dv(&config_path, &["get", &id]);
    assert!(!success, "deleted document should not resolve");

    // Deleting again stays successful
    let (_, _, success) = run_dv(&config_path, &["delete", &id]);
    assert!(success, "delete should be idempotent");
}

#[test]
fn test_ask_fallback_without_api_key() {
    let (_tmp, config_path) = setup_test_env();
    run_dv(&config_path, &["init"]);

    let pdf = sample_pdf(&config_path);
    let id = upload(&config_path, &pdf, &[]);

    // The failure-marker text mentions "extraction", so a question with
    // that keyword yields an excerpt from the fallback
    let (stdout, stderr, success) = run_dv(
        &config_path,
        &["ask", &id, "what went wrong during extraction"],
    );
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("AI is not configured"), "stdout={}", stdout);
    assert!(stdout.contains("(session "));
}

#[test]
fn test_ask_unknown_document() {
    let (_tmp, config_path) = setup_test_env();
    run_dv(&config_path, &["init"]);

    let (_, stderr, success) = run_dv(&config_path, &["ask", "no-such-id", "anything"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr={}", stderr);
}

#[test]
fn test_stats_counts_uploads_and_deletions() {
    let (_tmp, config_path) = setup_test_env();
    run_dv(&config_path, &["init"]);

    let pdf = sample_pdf(&config_path);
    let first = upload(&config_path, &pdf, &[]);
    let _second = upload(&config_path, &pdf, &[]);
    run_dv(&config_path, &["delete", &first]);

    let (stdout, _, success) = run_dv(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:      1"), "stdout={}", stdout);
    assert!(stdout.contains("Deleted:        1"), "stdout={}", stdout);
    // Today's count only covers live documents
    assert!(stdout.contains("Uploads today:  1"), "stdout={}", stdout);
}
