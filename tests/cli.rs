//! Runs the `pdf-rag` binary against a scratch data directory. Only commands
//! that never reach a model backend are exercised here.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn pdf_rag_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pdf-rag"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("files")).unwrap();

    let config_content = format!(
        r#"[storage]
catalog_path = "{root}/data/document_info.json"
index_path = "{root}/data/index.sqlite"
temp_dir = "{root}/spool"

[chunking]
chunk_size = 500
chunk_overlap = 100

[logging]
level = "warn"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("pdf-rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_pdf_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pdf_rag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pdf-rag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn documents_on_fresh_store() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_pdf_rag(&config_path, &["documents"]);
    assert!(success, "documents failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("No documents uploaded."));
}

#[test]
fn clear_requires_confirmation() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_pdf_rag(&config_path, &["clear"]);
    assert!(!success);
    assert!(stderr.contains("--yes"), "stderr: {}", stderr);

    let (stdout, stderr, success) = run_pdf_rag(&config_path, &["clear", "--yes"]);
    assert!(success, "clear failed: {}", stderr);
    assert!(stdout.contains("Cleared 0 documents."));
}

#[test]
fn upload_rejects_non_pdf() {
    let (tmp, config_path) = setup_test_env();
    let notes = tmp.path().join("files/notes.txt");
    fs::write(&notes, "plain notes").unwrap();

    let (_, stderr, success) = run_pdf_rag(&config_path, &["upload", notes.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Only PDF files are supported"), "stderr: {}", stderr);
}

#[test]
fn upload_reports_extraction_failure_and_leaves_no_temp_files() {
    let (tmp, config_path) = setup_test_env();
    let broken = tmp.path().join("files/broken.pdf");
    fs::write(&broken, b"not a valid pdf").unwrap();

    let (_, stderr, success) = run_pdf_rag(&config_path, &["upload", broken.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("PDF extraction failed"), "stderr: {}", stderr);

    let spool = tmp.path().join("spool");
    let leftover = fs::read_dir(&spool).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftover, 0);

    let (stdout, _, _) = run_pdf_rag(&config_path, &["documents"]);
    assert!(stdout.contains("No documents uploaded."));
}

#[test]
fn invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(
        &config_path,
        "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
    )
    .unwrap();

    let (_, stderr, success) = run_pdf_rag(&config_path, &["documents"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr: {}", stderr);
}

#[test]
fn missing_explicit_config_is_an_error() {
    let (tmp, _) = setup_test_env();
    let missing = tmp.path().join("config/absent.toml");
    let (_, stderr, success) = run_pdf_rag(&missing, &["documents"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}
