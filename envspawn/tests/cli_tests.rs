use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// The binary with a scratch home and no inherited envspawn settings.
fn envspawn(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_envspawn"));
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("ZDOTDIR", home)
        .env_remove("ENVSPAWN")
        .env_remove("ENVSPAWN_SHELL")
        .env_remove("ENVSPAWN_CONFIG")
        .env_remove("ENVSPAWN_DEFAULT_ENV")
        .env_remove("RUST_LOG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[cfg(unix)]
#[test]
fn test_hook_prints_posix_script() {
    let home = TempDir::new().unwrap();
    let output = envspawn(home.path())
        .args(["--hook", "--shell", "bash", "/opt/envs/demo"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let script = stdout(&output);
    assert!(script.starts_with("export ENVSPAWN=1\n"), "script: {script}");
    assert!(script.contains("export ENVSPAWN_PREFIX=/opt/envs/demo\n"));
    assert!(script.contains("export PATH=/opt/envs/demo/bin"));
    assert!(script.ends_with("PS1=\"(demo) ${PS1:-}\"\n"), "script: {script}");
}

#[cfg(unix)]
#[test]
fn test_hook_output_evaluates_in_sh() {
    let Ok(sh) = which::which("sh") else { return };
    let home = TempDir::new().unwrap();
    let output = envspawn(home.path())
        .args(["--hook", "--shell", "sh", "/opt/env"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let eval = Command::new(sh)
        .arg("-c")
        .arg(format!("{}printf '%s:%s' \"$ENVSPAWN\" \"$PATH\"", stdout(&output)))
        .output()
        .unwrap();
    assert!(stdout(&eval).starts_with("1:/opt/env/bin:"), "{}", stdout(&eval));
}

#[cfg(unix)]
#[test]
fn test_unknown_shell_warns_and_falls_back() {
    let home = TempDir::new().unwrap();
    let output = envspawn(home.path())
        .args(["--hook", "--shell", "nonexistent", "/opt/env"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("export ENVSPAWN=1\n"));
    assert!(stderr(&output).contains("unknown shell 'nonexistent'"), "stderr: {}", stderr(&output));
}

#[cfg(unix)]
#[test]
fn test_quiet_silences_fallback_warning() {
    let home = TempDir::new().unwrap();
    let output = envspawn(home.path())
        .args(["-q", "--hook", "--shell", "fish", "/opt/env"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stderr(&output), "");
}

#[cfg(unix)]
#[test]
fn test_config_file_sets_prompt() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("envspawn.yaml");
    std::fs::write(&config, "env_prompt: \"[{name}] \"\n").unwrap();
    let output = envspawn(home.path())
        .args(["--hook", "--shell", "sh", "/opt/envs/demo"])
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).ends_with("PS1=\"[demo] ${PS1:-}\"\n"));
}

#[cfg(unix)]
#[test]
fn test_xdg_config_is_found() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".config").join("envspawn");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.yaml"), "changeps1: false\n").unwrap();
    let output = envspawn(home.path())
        .args(["--hook", "--shell", "sh", "/opt/env"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(!stdout(&output).contains("PS1="));
}

#[test]
fn test_invalid_config_fails() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("bad.yaml");
    std::fs::write(&config, "handshake_timeout: soon\n").unwrap();
    let output = envspawn(home.path())
        .args(["--hook", "/opt/env"])
        .env("ENVSPAWN_CONFIG", &config)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid config"), "stderr: {}", stderr(&output));
}

#[cfg(unix)]
#[test]
fn test_one_shot_command_exit_code() {
    if which::which("bash").is_err() {
        return;
    }
    let home = TempDir::new().unwrap();
    let output = envspawn(home.path())
        .args(["--shell", "bash", "--handshake-timeout", "20", "/opt/env", "--"])
        .args(["sh", "-c", "printf 'marker=%s\\n' \"$ENVSPAWN\"; exit 3"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("marker=1"), "stdout: {}", stdout(&output));
}

#[cfg(windows)]
#[test]
fn test_cmd_set_shows_marker() {
    let home = TempDir::new().unwrap();
    let output = envspawn(home.path())
        .args(["--shell", "cmd", "C:\\envs\\demo", "--", "SET"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("ENVSPAWN=1"), "stdout: {out}");
    assert!(out.contains("ENVSPAWN_PREFIX=C:\\envs\\demo"), "stdout: {out}");
}
