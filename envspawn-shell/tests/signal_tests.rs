#![cfg(unix)]

//! Signals are process-wide, so these tests live in their own binary and
//! take turns.

use envspawn_shell::{ExpectOutcome, TerminalBridge};
use portable_pty::PtySize;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGWINCH};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(20);

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sh(script: &str) -> Option<TerminalBridge> {
    if !Path::new("/bin/sh").exists() {
        eprintln!("skipping: /bin/sh not found");
        return None;
    }
    let env: BTreeMap<OsString, OsString> = std::env::vars_os().collect();
    Some(
        TerminalBridge::spawn(
            Path::new("/bin/sh"),
            &["-c".to_string(), script.to_string()],
            &env,
            PtySize::default(),
        )
        .unwrap(),
    )
}

fn handler_of(signal: libc::c_int) -> libc::sighandler_t {
    let mut current: libc::sigaction = unsafe { std::mem::zeroed() };
    assert_eq!(unsafe { libc::sigaction(signal, std::ptr::null(), &mut current) }, 0);
    current.sa_sigaction
}

fn size(rows: u16, cols: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

#[test]
fn test_dispositions_restored_after_session() {
    let _serial = serial();
    let signals = [SIGWINCH, SIGINT, SIGTERM, SIGHUP, SIGQUIT];
    let before: Vec<_> = signals.iter().map(|&s| handler_of(s)).collect();

    for _ in 0..2 {
        let Some(mut bridge) = sh("true") else { return };
        let mut out = Vec::new();
        assert_eq!(bridge.relay_output(&mut out).unwrap(), 0);
        drop(bridge);

        let after: Vec<_> = signals.iter().map(|&s| handler_of(s)).collect();
        assert_eq!(before, after);
    }
}

#[test]
fn test_sigwinch_resizes_pty() {
    let _serial = serial();
    // Twice, so a session after a finished one is covered as well.
    for (rows, cols) in [(40, 120), (30, 100)] {
        let Some(mut bridge) = sh("read _; stty size") else { return };
        bridge.follow_size(move || Some(size(rows, cols)));

        signal_hook::low_level::raise(SIGWINCH).unwrap();
        assert_eq!(
            bridge.expect(b"never printed", Some(Duration::from_millis(300))).unwrap(),
            ExpectOutcome::TimedOut
        );
        assert_eq!((bridge.size().rows, bridge.size().cols), (rows, cols));

        bridge.send_line("go").unwrap();
        let expected = format!("{rows} {cols}");
        assert_eq!(
            bridge.expect(expected.as_bytes(), Some(TIMEOUT)).unwrap(),
            ExpectOutcome::Matched
        );
        assert_eq!(bridge.wait().unwrap(), 0);
    }
}

#[test]
fn test_unknown_size_keeps_current() {
    let _serial = serial();
    let Some(mut bridge) = sh("sleep 5") else { return };
    let initial = bridge.size();
    bridge.follow_size(|| None);
    signal_hook::low_level::raise(SIGWINCH).unwrap();
    bridge.service_signals();
    assert_eq!((bridge.size().rows, bridge.size().cols), (initial.rows, initial.cols));
    bridge.kill().unwrap();
}

#[test]
fn test_sigint_forwarded_to_child() {
    let _serial = serial();
    let Some(mut bridge) = sh("trap 'echo interrupted; exit 42' INT; echo ready; while :; do sleep 1; done") else {
        return;
    };
    assert_eq!(
        bridge.expect(b"ready", Some(TIMEOUT)).unwrap(),
        ExpectOutcome::Matched
    );

    // Caught by the session, so this process keeps running.
    signal_hook::low_level::raise(SIGINT).unwrap();

    let mut out = Vec::new();
    let code = bridge.relay_output(&mut out).unwrap();
    let out = String::from_utf8_lossy(&out);
    assert_eq!(code, 42, "output: {out}");
    assert!(out.contains("interrupted"), "output: {out}");
}
