use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn orrery(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_orrery"))
        .env("ORRERY_CONFIG_DIR", config_dir)
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run orrery")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn check_renders_builtin_shaders_without_textures() {
    let root = TempDir::new().unwrap();
    let textures = root.path().join("textures");
    fs::create_dir_all(&textures).unwrap();

    let output = orrery(
        root.path(),
        &[
            "check",
            "--frames",
            "4",
            "--size",
            "320x180",
            "--textures",
            textures.to_str().unwrap(),
        ],
    );

    assert!(output.status.success(), "{output:?}");
    let text = stdout(&output);
    assert!(text.contains("frames rendered: 4"), "{text}");
    assert!(text.contains("draw calls:      4"), "{text}");
    assert!(text.contains("surface:         320x180"), "{text}");
    // Nothing exists under the texture root, so every body keeps its placeholder.
    assert!(text.contains("earth    failed"), "{text}");
    assert!(text.contains("check passed"), "{text}");
}

#[test]
fn check_fails_on_broken_fragment_shader() {
    let root = TempDir::new().unwrap();
    let fragment = root.path().join("broken.frag");
    fs::write(&fragment, "void main() { fragColor = ; }\n").unwrap();

    let output = orrery(
        root.path(),
        &["check", "--fragment", fragment.to_str().unwrap()],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("shaders failed to build"), "{stderr}");
}

#[test]
fn config_overrides_are_reported_by_where() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("orrery.toml"),
        "[textures]\nroot = \"planets\"\n[textures.overrides]\nearth = \"earth_night.png\"\n",
    )
    .unwrap();

    let output = orrery(root.path(), &["where"]);

    assert!(output.status.success(), "{output:?}");
    let text = stdout(&output);
    assert!(text.contains("(found)"), "{text}");
    assert!(text.contains("earth_night.png"), "{text}");
    assert!(text.contains("textures/mars_texture.jpg"), "{text}");
    assert!(
        text.contains(&root.path().join("planets").display().to_string()),
        "{text}"
    );
}

#[test]
fn unknown_texture_override_is_rejected() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("orrery.toml"),
        "[textures.overrides]\npluto = \"pluto.png\"\n",
    )
    .unwrap();

    let output = orrery(root.path(), &["where"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("pluto"));
}
