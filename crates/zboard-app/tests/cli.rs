//! 命令行端到端测试

use std::path::Path;
use std::process::{Command, Output};

const INSTRUCTIONS: &str = r#"[
    {"type": "point", "name": "A", "x": 0, "y": 0},
    {"type": "point", "name": "B", "x": 100, "y": 0},
    {"type": "point", "name": "C", "x": 0, "y": 100},
    {"type": "triangle", "name": "T", "points": ["A", "B", "C"]},
    {"type": "point", "name": "P", "x": 50, "y": 50},
    {"type": "line", "name": "AP", "start_point": "A", "end_point": "P"}
]"#;

fn zboard(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_zboard"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run zboard")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "zboard failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn setup() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("zboard.json");
    std::fs::write(&config, r#"{ "autosave": false, "animation": { "default_duration_ms": 500 } }"#)
        .unwrap();
    std::fs::write(dir.path().join("shapes.json"), INSTRUCTIONS).unwrap();
    (dir, config)
}

#[test]
fn test_build_then_info() {
    let (dir, config) = setup();
    let input = dir.path().join("shapes.json");
    let board = dir.path().join("shapes.zboard");

    let out = stdout(&zboard(&config, &["build", input.to_str().unwrap()]));
    assert!(out.contains("applied 6 instructions"));
    assert!(board.exists());

    let out = stdout(&zboard(&config, &["info", board.to_str().unwrap()]));
    assert!(out.starts_with("shapes ("));
    assert!(out.contains("4 points"));
    assert!(out.contains("= 5000.000"));
}

#[test]
fn test_animate_saves_final_position() {
    let (dir, config) = setup();
    let input = dir.path().join("shapes.json");
    let board = dir.path().join("shapes.json.zboard");
    let moved = dir.path().join("moved.json");

    stdout(&zboard(
        &config,
        &["build", input.to_str().unwrap(), "-o", board.to_str().unwrap()],
    ));
    let out = stdout(&zboard(
        &config,
        &[
            "animate",
            board.to_str().unwrap(),
            "--point",
            "P",
            "--path",
            "B,C",
            "-o",
            moved.to_str().unwrap(),
        ],
    ));
    // 500ms，20fps
    assert_eq!(out.lines().filter(|l| l.contains('(')).count(), 10);

    let out = stdout(&zboard(&config, &["info", moved.to_str().unwrap()]));
    assert!(out.contains("P (0.00, 100.00)"));
}

#[test]
fn test_plot_csv() {
    let (dir, config) = setup();
    let out = stdout(&zboard(
        &config,
        &["plot", "1/x", "--from", "-1", "--to", "1", "--resolution", "4"],
    ));
    // x = 0 处断开
    let runs: Vec<&str> = out.split("\n\n").collect();
    assert_eq!(runs.len(), 2);
    assert!(out.starts_with("-1,-1"));

    let board = dir.path().join("plots.json");
    stdout(&zboard(
        &config,
        &["plot", "x^2", "--into", board.to_str().unwrap()],
    ));
    let out = stdout(&zboard(&config, &["info", board.to_str().unwrap()]));
    assert!(out.contains("f1: y = x^2 on [-10, 10]"));
}

#[test]
fn test_errors_exit_nonzero() {
    let (dir, config) = setup();
    assert!(!zboard(&config, &["frobnicate"]).status.success());
    let missing = dir.path().join("missing.zboard");
    assert!(!zboard(&config, &["info", missing.to_str().unwrap()]).status.success());

    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, r#"[{"type": "line", "start_point": "X", "end_point": "Y"}]"#).unwrap();
    let output = zboard(&config, &["build", bad.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Instruction 0"));
}

#[test]
fn test_out_of_bounds_arguments_rejected() {
    let (dir, config) = setup();
    let output = zboard(&config, &["plot", "x", "--resolution", "0"]);
    assert!(!output.status.success());

    let input = dir.path().join("shapes.json");
    let board = dir.path().join("shapes.zboard");
    stdout(&zboard(&config, &["build", input.to_str().unwrap()]));
    let output = zboard(
        &config,
        &[
            "animate",
            board.to_str().unwrap(),
            "--point",
            "P",
            "--path",
            "B,C",
            "--duration",
            "18446744073709551615",
        ],
    );
    assert!(!output.status.success());
}

#[test]
fn test_analyze_functions() {
    let (_dir, config) = setup();
    let out = stdout(&zboard(
        &config,
        &["analyze", "x^2", "--with", "x+2", "--from", "-5", "--to", "5"],
    ));
    assert!(out.contains("range: ["));
    assert!(out.contains("25.0000]"));
    assert!(out.contains("minimum: ("));
    assert!(out.contains("intersection: (-1.0000, 1.0000)"));
    assert!(out.contains("intersection: (2.0000, 4.0000)"));
}

#[test]
fn test_check_and_fix() {
    let (dir, config) = setup();
    let input = dir.path().join("messy.json");
    std::fs::write(
        &input,
        r#"[
            {"type": "point", "name": "A", "x": 0, "y": 0},
            {"type": "point", "name": "B", "x": 100, "y": 0},
            {"type": "point", "name": "C", "x": 100.5, "y": 0},
            {"type": "line", "name": "AB", "start_point": "A", "end_point": "B"},
            {"type": "line", "name": "BC", "start_point": "B", "end_point": "C"}
        ]"#,
    )
    .unwrap();
    let board = dir.path().join("messy.zboard");
    let clean = dir.path().join("clean.zboard");
    stdout(&zboard(&config, &["build", input.to_str().unwrap()]));

    let out = stdout(&zboard(&config, &["check", board.to_str().unwrap()]));
    assert!(out.contains("1 issues"));
    assert!(out.contains("segment BC is too short"));
    assert!(out.contains("segments AB and BC are parallel"));
    assert!(out.contains("hint: "));

    let out = stdout(&zboard(
        &config,
        &["check", board.to_str().unwrap(), "--fix", "-o", clean.to_str().unwrap()],
    ));
    assert!(out.contains("removed 1 entities"));
    let out = stdout(&zboard(&config, &["check", clean.to_str().unwrap()]));
    // 删除 BC 后 C 不再被引用
    assert!(out.contains("point C is not used by anything"));
}
