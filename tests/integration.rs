use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn chatbot_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_chatbot"))
}

const PLUGIN_CHUNKS: &str = r#"{"id": "git-1", "chunk_text": "Use the git step to check out a repository: [[CODE_BLOCK_0]]", "metadata": {"title": "git", "data_source": "jenkins_plugins_documentation"}, "code_blocks": ["git url: 'https://github.com/jenkinsci/git-plugin'"]}
{"id": "docker-1", "chunk_text": "The docker-workflow plugin lets pipelines run steps inside containers.", "metadata": {"title": "docker-workflow", "data_source": "jenkins_plugins_documentation"}, "code_blocks": []}
{"id": "broken-1", "chunk_text": "Git credentials are configured with [[CODE_BLOCK_3]]", "metadata": {"title": "git"}, "code_blocks": []}
"#;

fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("plugin_docs.jsonl"), PLUGIN_CHUNKS).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/chatbot.sqlite"

[pipeline]
max_reformulations = 1
{}
"#,
        root.display(),
        extra
    );

    let config_path = config_dir.join("chatbot.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_chatbot(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = chatbot_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("CHATBOT_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run chatbot binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn ingest_plugins(tmp: &TempDir, config_path: &Path) {
    let file = tmp.path().join("plugin_docs.jsonl");
    let (stdout, stderr, ok) = run_chatbot(config_path, &["ingest", "plugin_docs", file.to_str().unwrap()]);
    assert!(ok, "ingest failed: {}", stderr);
    assert!(stdout.contains("written: 3"), "{}", stdout);
}

#[test]
fn test_init_is_idempotent() {
    let (tmp, config_path) = setup_test_env("");

    let (stdout, stderr, ok) = run_chatbot(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/chatbot.sqlite").exists());

    let (_, stderr, ok) = run_chatbot(&config_path, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_ingest_then_search_reconstructs_code() {
    let (tmp, config_path) = setup_test_env("");
    run_chatbot(&config_path, &["init"]);
    ingest_plugins(&tmp, &config_path);

    let (stdout, stderr, ok) = run_chatbot(
        &config_path,
        &["search", "check out a repository", "--tool", "search_plugin_docs"],
    );
    assert!(ok, "search failed: {}", stderr);
    assert!(stdout.contains("git url: 'https://github.com/jenkinsci/git-plugin'"), "{}", stdout);
    assert!(!stdout.contains("[[CODE_BLOCK_0]]"));
}

#[test]
fn test_reingest_skips_unchanged() {
    let (tmp, config_path) = setup_test_env("");
    run_chatbot(&config_path, &["init"]);
    ingest_plugins(&tmp, &config_path);

    let file = tmp.path().join("plugin_docs.jsonl");
    let (stdout, _, ok) = run_chatbot(&config_path, &["ingest", "plugin_docs", file.to_str().unwrap()]);
    assert!(ok);
    assert!(stdout.contains("unchanged: 3"), "{}", stdout);
    assert!(stdout.contains("partition total: 3"), "{}", stdout);
}

#[test]
fn test_plugin_filter_uses_ingested_titles() {
    let (tmp, config_path) = setup_test_env("");
    run_chatbot(&config_path, &["init"]);
    ingest_plugins(&tmp, &config_path);

    let (stdout, stderr, ok) = run_chatbot(
        &config_path,
        &["search", "git steps", "--tool", "search_plugin_docs", "--plugin", "Docker Workflow"],
    );
    assert!(ok, "search failed: {}", stderr);
    assert!(stdout.contains("inside containers"), "{}", stdout);
    assert!(!stdout.contains("git step"), "{}", stdout);
}

#[test]
fn test_missing_code_block_renders_marker() {
    let (tmp, config_path) = setup_test_env("");
    run_chatbot(&config_path, &["init"]);
    ingest_plugins(&tmp, &config_path);

    let (stdout, _, ok) = run_chatbot(
        &config_path,
        &["search", "credentials", "--tool", "search_plugin_docs", "--plugin", "git"],
    );
    assert!(ok);
    assert!(stdout.contains("[MISSING_CODE]"), "{}", stdout);
}

#[test]
fn test_search_empty_partition_returns_no_context() {
    let (_tmp, config_path) = setup_test_env("");
    run_chatbot(&config_path, &["init"]);

    let (stdout, _, ok) = run_chatbot(&config_path, &["search", "agents"]);
    assert!(ok);
    assert_eq!(stdout.trim(), "No context available.");
}

#[test]
fn test_ask_without_llm_cannot_answer() {
    let (_tmp, config_path) = setup_test_env("");
    run_chatbot(&config_path, &["init"]);

    let (stdout, stderr, ok) = run_chatbot(&config_path, &["ask", "How do I add an agent?"]);
    assert!(ok, "ask failed: {}", stderr);
    assert!(stdout.contains("How do I add an agent?"), "{}", stdout);
    assert!(stdout.contains("not able to answer"), "{}", stdout);
}

#[test]
fn test_unknown_tool_and_partition_fail() {
    let (tmp, config_path) = setup_test_env("");
    run_chatbot(&config_path, &["init"]);

    let (_, stderr, ok) = run_chatbot(&config_path, &["search", "x", "--tool", "search_everything"]);
    assert!(!ok);
    assert!(stderr.contains("Unknown tool"), "{}", stderr);

    let file = tmp.path().join("plugin_docs.jsonl");
    let (_, stderr, ok) = run_chatbot(&config_path, &["ingest", "wiki", file.to_str().unwrap()]);
    assert!(!ok);
    assert!(stderr.contains("Unknown partition"), "{}", stderr);
}

#[test]
fn test_missing_max_reformulations_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("chatbot.toml");
    fs::write(
        &config_path,
        format!("[db]\npath = \"{}/chatbot.sqlite\"\n\n[pipeline]\n", tmp.path().display()),
    )
    .unwrap();

    let (_, stderr, ok) = run_chatbot(&config_path, &["init"]);
    assert!(!ok);
    assert!(stderr.contains("max_reformulations"), "{}", stderr);
}

#[test]
fn test_invalid_semantic_weight_is_rejected() {
    let (_tmp, config_path) = setup_test_env("\n[retrieval]\nsemantic_weight = 2.0\n");
    let (_, stderr, ok) = run_chatbot(&config_path, &["init"]);
    assert!(!ok);
    assert!(stderr.contains("semantic_weight"), "{}", stderr);
}
