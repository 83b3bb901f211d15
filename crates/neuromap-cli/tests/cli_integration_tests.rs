//! CLI integration tests for neuromap
//!
//! Runs the neuromap binary end-to-end against graph files in temporary
//! directories, with configuration isolated per test.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const RESEARCH_GRAPH: &str = r#"{
  "nodes": [
    {"id": "ml", "label": "machine learning"},
    {"id": "dl", "label": "deep learning"},
    {"id": "stats", "label": "statistics", "weight": 2.0},
    {"id": "viz", "label": "data visualization"}
  ],
  "edges": [
    {"source": "ml", "target": "dl", "statement": "deep learning is machine learning"},
    {"source": "ml", "target": "stats"},
    {"source": "stats", "target": "viz"},
    {"source": "ml", "target": "missing"}
  ]
}"#;

/// Command with its configuration directory pointed at `config_dir`
#[allow(deprecated)]
fn neuromap_cmd(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("neuromap").unwrap();
    cmd.env("NEUROMAP_CONFIG_DIR", config_dir.path());
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_graph(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn single_node(id: &str) -> String {
    format!(r#"{{"nodes":[{{"id":"{id}","label":"{id}"}}],"edges":[]}}"#)
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "command failed: {:?}", output);
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_generate_prints_summary() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(&dir, "research.json", RESEARCH_GRAPH);

    neuromap_cmd(&dir)
        .args(["generate", "--graph"])
        .arg(&graph)
        .assert()
        .success()
        .stdout(predicate::str::contains("context 'research'"))
        .stdout(predicate::str::contains("Concepts:    4"))
        .stdout(predicate::str::contains("1 dangling edges"))
        .stdout(predicate::str::contains("Insights:"));
}

#[test]
fn test_generate_json_output() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(&dir, "research.json", RESEARCH_GRAPH);

    let value = json_stdout(
        neuromap_cmd(&dir)
            .args(["--format", "json", "generate", "--visualize", "--graph"])
            .arg(&graph),
    );

    assert_eq!(value["map"]["context"], "research");
    assert_eq!(value["map"]["nodes"].as_array().unwrap().len(), 4);
    assert!(value["insights"].as_array().is_some());
    assert_eq!(value["visualization"]["nodes"].as_array().unwrap().len(), 4);
}

#[test]
fn test_generate_and_evolve_single_node() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(&dir, "seed.json", &single_node("node1"));

    let value = json_stdout(
        neuromap_cmd(&dir)
            .args([
                "--format",
                "json",
                "generate",
                "--user",
                "user123",
                "--context",
                "testContext",
                "--evolve",
                "1",
                "--creativity",
                "0.8",
                "--new-concepts",
                "1",
                "--graph",
            ])
            .arg(&graph),
    );

    let map = &value["map"];
    assert_eq!(map["context"], "testContext");
    assert_eq!(map["nodes"].as_array().unwrap().len(), 2);
    assert!(map["id"].as_str().unwrap().contains("evolved"));
    assert_eq!(map["evolution_metrics"]["original_size"], 1);
}

#[test]
fn test_quiet_generate_prints_only_id() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(&dir, "research.json", RESEARCH_GRAPH);

    let output = neuromap_cmd(&dir)
        .args(["-q", "generate", "--graph"])
        .arg(&graph)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 1);
}

#[test]
fn test_merge_two_graph_files() {
    let dir = TempDir::new().unwrap();
    let first = write_graph(&dir, "context1.json", &single_node("node1"));
    let second = write_graph(&dir, "context2.json", &single_node("node2"));

    let value = json_stdout(
        neuromap_cmd(&dir)
            .args(["--format", "json", "merge", "--target", "mergedContext", "--graph"])
            .arg(&first)
            .arg("--graph")
            .arg(&second),
    );

    let map = &value["map"];
    assert_eq!(map["context"], "mergedContext");
    assert!(map["id"].as_str().unwrap().starts_with("merged-"));
    let ids: Vec<&str> = map["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"node1"));
    assert!(ids.contains(&"node2"));
}

#[test]
fn test_merge_of_one_context_fails() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(&dir, "only.json", &single_node("a"));

    neuromap_cmd(&dir)
        .args(["merge", "--graph"])
        .arg(&graph)
        .arg("--graph")
        .arg(&graph)
        .assert()
        .failure()
        .stderr(predicate::str::contains("E100"))
        .stderr(predicate::str::contains("At least two context names"));
}

#[test]
fn test_merge_into_a_source_context_fails() {
    let dir = TempDir::new().unwrap();
    let merged = write_graph(&dir, "merged.json", &single_node("a"));
    let other = write_graph(&dir, "other.json", &single_node("b"));

    neuromap_cmd(&dir)
        .args(["merge", "--graph"])
        .arg(&merged)
        .arg("--graph")
        .arg(&other)
        .assert()
        .failure()
        .stderr(predicate::str::contains("E100"))
        .stderr(predicate::str::contains("cannot also be a merge source"));
}

#[test]
fn test_missing_graph_file_fails() {
    let dir = TempDir::new().unwrap();

    neuromap_cmd(&dir)
        .args(["generate", "--graph"])
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read graph file"));
}

#[test]
fn test_invalid_graph_file_fails() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(&dir, "broken.json", "{\"nodes\": 3}");

    neuromap_cmd(&dir)
        .args(["generate", "--graph"])
        .arg(&graph)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid graph file"));
}

#[test]
fn test_config_set_get_and_reset() {
    let dir = TempDir::new().unwrap();

    neuromap_cmd(&dir)
        .args(["config", "set", "engine.network_depth", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set engine.network_depth = 5"));

    neuromap_cmd(&dir)
        .args(["config", "get", "engine.network_depth"])
        .assert()
        .success()
        .stdout(predicate::str::diff("5\n"));

    neuromap_cmd(&dir)
        .args(["config", "reset"])
        .assert()
        .success();

    neuromap_cmd(&dir)
        .args(["config", "get", "engine.network_depth"])
        .assert()
        .success()
        .stdout(predicate::str::diff("3\n"));
}

#[test]
fn test_config_rejects_invalid_value() {
    let dir = TempDir::new().unwrap();

    neuromap_cmd(&dir)
        .args(["config", "set", "engine.min_similarity_threshold", "2"])
        .assert()
        .failure();

    neuromap_cmd(&dir)
        .args(["config", "get", "engine.colour"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_config_list_json() {
    let dir = TempDir::new().unwrap();

    let value = json_stdout(neuromap_cmd(&dir).args(["--format", "json", "config", "list"]));
    assert_eq!(value.as_object().unwrap().len(), 16);
    assert_eq!(value["engine.embedding_dimension"], "64");
    assert_eq!(value["cache.ttl_secs"], "(not set)");
}

#[test]
fn test_config_path_uses_config_dir() {
    let dir = TempDir::new().unwrap();

    neuromap_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_configured_depth_shapes_generated_map() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(&dir, "research.json", RESEARCH_GRAPH);

    neuromap_cmd(&dir)
        .args(["config", "set", "engine.network_depth", "2"])
        .assert()
        .success();

    let value = json_stdout(
        neuromap_cmd(&dir)
            .args(["--format", "json", "generate", "--graph"])
            .arg(&graph),
    );
    assert_eq!(value["map"]["network_depth"], 2);
}
