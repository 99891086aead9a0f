use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn peval_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("peval");
    path
}

/// A port nothing listens on.
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

const DATASET: &str = concat!(
    "id,input,expected_output\n",
    r#"1,"{""id"": ""post_123"", ""caption"": ""Concertos de abril 12.04.24 @javierturnes"", ""date"": ""2024-04-01""}","{""artistas"": [""javierturnes""], ""fecha"": [""2024-04-12""], ""ubicacion"": [""Riquela Club""]}""#,
    "\n",
    r#"2,"{""id"": ""post_456"", ""caption"": ""Este viernes tenemos a @insaniam"", ""date"": ""2024-05-05""}","{""artistas"": [""insaniam""], ""fecha"": [""2024-05-10""], ""ubicacion"": [""Clandestino""]}""#,
    "\n"
);

fn setup_test_env(dataset: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("dataset.csv"), dataset).unwrap();

    let config_content = format!(
        r#"[run]
run_name = "posts-eval-cli"
dataset = "{root}/dataset.csv"

[workflow]
url = "http://127.0.0.1:{port}/v1/workflows/run"
timeout_secs = 2
api_key_env = "PEVAL_CLI_TEST_UNSET_KEY"

[tracking]
provider = "disabled"

[db]
path = "{root}/data/peval.sqlite"
"#,
        root = root.display(),
        port = closed_port()
    );

    let config_path = config_dir.join("peval.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_peval(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = peval_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run peval binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env(DATASET);

    let (stdout, stderr, success) = run_peval(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/peval.sqlite").exists());
}

#[test]
fn test_init_seed_idempotent() {
    let (_tmp, config_path) = setup_test_env(DATASET);

    let (_, _, success1) = run_peval(&config_path, &["init", "--seed"]);
    assert!(success1, "First init failed");
    let (_, _, success2) = run_peval(&config_path, &["init", "--seed"]);
    assert!(success2, "Second init failed (not idempotent)");

    let (stdout, stderr, success) = run_peval(&config_path, &["events"]);
    assert!(success, "events failed: {}", stderr);
    assert!(stdout.contains("insaniam"));
    assert!(stdout.contains("Riquela Club"));
    assert!(stdout.contains("8 event(s)"));
}

#[test]
fn test_run_with_unreachable_workflow_falls_back() {
    let (tmp, config_path) = setup_test_env(DATASET);
    let summary_path = tmp.path().join("summary.json");

    let (stdout, stderr, success) = run_peval(
        &config_path,
        &["run", "--output", summary_path.to_str().unwrap()],
    );
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Run: posts-eval-cli"));
    assert!(stdout.contains("2 fallback(s)"));
    assert!(stdout.contains("WARNING"));
    assert!(stderr.contains("extraction service unreachable"));
    assert_eq!(stderr.matches("dataset loaded").count(), 1, "stderr={}", stderr);

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert_eq!(summary["total_items"], 2);
    assert_eq!(summary["fallbacks"], 2);
    assert_eq!(summary["results"][0]["post_id"], "post_123");
    assert_eq!(summary["results"][0]["status"], "fallback");
    assert_eq!(summary["results"][1]["similarity"], 1.0);
}

#[test]
fn test_run_name_flag_overrides_config() {
    let (_tmp, config_path) = setup_test_env(DATASET);

    let (stdout, stderr, success) =
        run_peval(&config_path, &["run", "--run-name", "from-flag"]);
    assert!(success, "run failed: {}", stderr);
    assert!(stdout.contains("Run: from-flag"));
}

#[test]
fn test_run_with_unavailable_db_still_completes() {
    let (tmp, config_path) = setup_test_env(DATASET);
    // A regular file where the database directory should be.
    fs::write(tmp.path().join("data"), "not a directory").unwrap();

    let (stdout, stderr, success) = run_peval(&config_path, &["run", "--save-to-db"]);
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stderr.contains("persistence disabled"));
    assert!(stdout.contains("2 total"));
}

#[test]
fn test_malformed_dataset_exits_non_zero() {
    let (_tmp, config_path) =
        setup_test_env("id,input,expected_output\n1,\"{not json\",\"{}\"\n");

    let (stdout, stderr, success) = run_peval(&config_path, &["run"]);
    assert!(!success, "run should fail: stdout={}", stdout);
    assert!(stderr.contains("not valid JSON"), "stderr={}", stderr);
    assert!(!stdout.contains("Evaluation Summary"));
}

#[test]
fn test_missing_dataset_exits_non_zero() {
    let (_tmp, config_path) = setup_test_env(DATASET);

    let (_, stderr, success) =
        run_peval(&config_path, &["run", "--dataset", "/nonexistent/dataset.csv"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read dataset"), "stderr={}", stderr);
}

#[test]
fn test_unknown_metric_rejected() {
    let (_tmp, config_path) = setup_test_env(DATASET);

    let (_, stderr, success) = run_peval(&config_path, &["run", "--metrics", "bleu"]);
    assert!(!success);
    assert!(stderr.contains("Unknown metric"));
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("peval.toml");
    fs::write(&config_path, "[tracking]\nprovider = \"mlflow\"\n").unwrap();

    let (_, stderr, success) = run_peval(&config_path, &["posts"]);
    assert!(!success);
    assert!(stderr.contains("mlflow"));
}

#[test]
fn test_posts_lists_connector_posts() {
    let (_tmp, config_path) = setup_test_env(DATASET);

    let (stdout, stderr, success) = run_peval(&config_path, &["posts"]);
    assert!(success, "posts failed: {}", stderr);
    assert!(stdout.contains("post_123"));
    assert!(stdout.contains("img/post_456.jpg"));
    assert!(stdout.contains("2 post(s)"));
}

#[test]
fn test_extract_unreachable_exits_non_zero() {
    let (_tmp, config_path) = setup_test_env(DATASET);

    let (_, stderr, success) =
        run_peval(&config_path, &["extract", "--caption", "hola", "--date", "2024-05-05"]);
    assert!(!success);
    assert!(stderr.contains("unreachable"));
}
