use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use archive_sync_core::profile::doc_id;

fn esync_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("esync");
    path
}

fn setup_test_env(url: &str, blocksize: usize) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let lists_dir = root.join("lists");
    fs::create_dir_all(&lists_dir).unwrap();
    fs::write(lists_dir.join("spot-a.txt"), "/a/x.nc\n/a/y.nc\n").unwrap();

    let config_content = format!(
        r#"[index]
url = "{url}"
name = "ceda-fbi"
timeout_secs = 5

[batch]
blocksize = {blocksize}

[output]
dir = "{root}/out"
"#,
        url = url,
        blocksize = blocksize,
        root = root.display(),
    );

    let config_path = config_dir.join("esync.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_esync(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = esync_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run esync binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_report_needs_no_config() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("spot-a_log.txt"),
        "Summary: Total Files in Spot: 3 Total Indexed: 2 Total Missing: 1 Percentage Missing: 33.33%\n/a/y.nc\n",
    )
    .unwrap();

    let missing_config = tmp.path().join("nope.toml");
    let dir = tmp.path().to_str().unwrap();
    let (stdout, stderr, success) = run_esync(&missing_config, &["report", "--directory", dir]);
    assert!(success, "report failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("spot-a"));
    assert!(stdout.contains("Total Files: 3 Total Indexed: 2 Total Missing: 1"));
}

#[test]
fn test_missing_config_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_esync(
        &tmp.path().join("nope.toml"),
        &["check", "--file", "whatever.txt"],
    );
    assert!(!success);
    assert!(stderr.contains("nope.toml"), "stderr={}", stderr);
}

#[test]
fn test_zero_blocksize_is_rejected() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9", 0);
    let list = tmp.path().join("lists/spot-a.txt");
    let (_, stderr, success) = run_esync(&config_path, &["check", "--file", list.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("blocksize"), "stderr={}", stderr);
}

#[test]
fn test_location_needs_a_target() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9", 800);
    let list = tmp.path().join("lists/spot-a.txt");
    let (_, stderr, success) =
        run_esync(&config_path, &["location", "--file", list.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("--on-disk"), "stderr={}", stderr);
}

#[test]
fn test_checksums_needs_one_source() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9", 800);
    let (_, stderr, success) = run_esync(&config_path, &["checksums"]);
    assert!(!success);
    assert!(stderr.contains("exactly one of --log"), "stderr={}", stderr);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_check_against_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ceda-fbi/_msearch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"responses": [
            {"hits": {"total": {"value": 1}, "hits": [
                {"_id": doc_id("/a/x.nc"), "_source": {"info": {"location": "on_disk"}}}
            ]}},
            {"hits": {"total": {"value": 0}, "hits": []}}
        ]})))
        .expect(1)
        .mount(&server)
        .await;

    let (tmp, config_path) = setup_test_env(&server.uri(), 800);
    let list = tmp.path().join("lists/spot-a.txt");
    let list_arg = list.to_str().unwrap().to_string();

    let (stdout, stderr, success) = tokio::task::spawn_blocking(move || {
        run_esync(&config_path, &["check", "--file", &list_arg])
    })
    .await
    .unwrap();
    assert!(success, "check failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("1 units: 1 ok, 0 skipped, 0 failed"), "stdout={}", stdout);

    let log = fs::read_to_string(tmp.path().join("out/spot-a_log.txt")).unwrap();
    assert_eq!(
        log,
        "Summary: Total Files in Spot: 2 Total Indexed: 1 Total Missing: 1 Percentage Missing: 50.00%\n/a/y.nc\n"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_errors_fail_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ceda-fbi/_msearch"))
        .respond_with(ResponseTemplate::new(500).set_body_string("cluster unavailable"))
        .mount(&server)
        .await;

    let (tmp, config_path) = setup_test_env(&server.uri(), 800);
    let list = tmp.path().join("lists/spot-a.txt");
    let list_arg = list.to_str().unwrap().to_string();

    let (_, stderr, success) = tokio::task::spawn_blocking(move || {
        run_esync(&config_path, &["check", "--file", &list_arg])
    })
    .await
    .unwrap();
    assert!(!success);
    assert!(stderr.contains("cluster unavailable"), "stderr={}", stderr);
    assert!(!tmp.path().join("out/spot-a_log.txt").exists());
}
