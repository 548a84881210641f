use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::{tempdir, NamedTempFile};

fn write_scene(xml: &str) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("temp scene");
    tmp.write_all(xml.as_bytes()).expect("write scene");
    tmp
}

const SCENE: &str = r#"<scene>
  <surface>
    <name>Grey</name>
    <variant>vertex_color</variant>
    <color>255 255 255</color>
  </surface>
  <surface>
    <name>Ball</name>
    <variant>textured</variant>
  </surface>
  <probe>
    <surface>Grey</surface>
    <position>0 0 -1</position>
    <normal>0 0 1</normal>
  </probe>
  <preview>
    <width>16</width>
    <height>16</height>
  </preview>
</scene>
"#;

#[test]
fn cli_prints_summary_and_probe_results() {
    let scene = write_scene(SCENE);
    let mut cmd = Command::cargo_bin("lit-surface").expect("binary exists");
    cmd.arg(scene.path()).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 2 surface(s) and 1 probe(s)"))
        .stdout(contains(" - Grey (vertex_color) power=3.00 shininess=15.0"))
        .stdout(contains(" - Ball (textured) power=5.00 shininess=15.0 ambient=scaled 0.02"))
        .stdout(contains(
            " - Grey @ (0.00, 0.00, -1.00) rgba=(0.7528, 0.7528, 0.7528, 1.0000)",
        ));
}

#[test]
fn cli_writes_previews() {
    let scene = write_scene(SCENE);
    let output = tempdir().expect("temp dir");
    let mut cmd = Command::cargo_bin("lit-surface").expect("binary exists");
    cmd.arg(scene.path())
        .arg("--output")
        .arg(output.path())
        .args(["--width", "8", "--height", "4"]);
    cmd.assert()
        .success()
        .stdout(contains("Wrote preview Grey"))
        .stdout(contains("Wrote preview Ball"));

    let preview = image::open(output.path().join("Ball.png")).expect("preview written");
    assert_eq!((preview.width(), preview.height()), (8, 4));
    assert!(output.path().join("Grey.png").exists());
}

#[test]
fn cli_rejects_unknown_arguments() {
    let scene = write_scene(SCENE);
    let mut cmd = Command::cargo_bin("lit-surface").expect("binary exists");
    cmd.arg(scene.path()).arg("--fullscreen");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --fullscreen"));
}

#[test]
fn cli_reports_scene_errors() {
    let scene = write_scene("<scene><surface><variant>textured</variant></surface></scene>");
    let mut cmd = Command::cargo_bin("lit-surface").expect("binary exists");
    cmd.arg(scene.path()).arg("--summary-only");
    cmd.assert()
        .failure()
        .stderr(contains("failed to parse scene XML"));
}

#[test]
fn cli_gpu_preview_runs_or_reports_missing_adapter() {
    let scene = write_scene(SCENE);
    let output = tempdir().expect("temp dir");
    let mut cmd = Command::cargo_bin("lit-surface").expect("binary exists");
    cmd.arg(scene.path())
        .arg("--output")
        .arg(output.path())
        .args(["--width", "8", "--height", "8", "--gpu"]);
    let result = cmd.output().expect("binary runs");
    if result.status.success() {
        let preview = image::open(output.path().join("Grey.png")).expect("preview written");
        assert_eq!((preview.width(), preview.height()), (8, 8));
    } else {
        let stderr = String::from_utf8_lossy(&result.stderr);
        assert!(stderr.contains("failed to start GPU renderer"), "{stderr}");
    }
}

#[test]
fn cli_rejects_duplicate_surface_names() {
    let scene = write_scene(
        "<scene><surface><name>A</name></surface><surface><name>A</name></surface></scene>",
    );
    let mut cmd = Command::cargo_bin("lit-surface").expect("binary exists");
    cmd.arg(scene.path()).arg("--summary-only");
    cmd.assert()
        .failure()
        .stderr(contains("duplicate surface name A"));
}
