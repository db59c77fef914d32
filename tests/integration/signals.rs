#[path = "common/mod.rs"]
mod common;

use std::{
    io::Read,
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use common::{
    forkpool_bin, read_lines, read_pids, send_signal, wait_for_lines, wait_for_process_exit,
    wait_with_timeout,
};
use nix::sys::signal::Signal;
use tempfile::{TempDir, tempdir};

fn spawn_pool(dir: &TempDir, args: &[&str]) -> Child {
    Command::new(forkpool_bin())
        .current_dir(dir.path())
        .args(["--log-level", "info", "run", "--debug"])
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start forkpool")
}

fn stderr_of(child: &mut Child) -> String {
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        pipe.read_to_string(&mut stderr)
            .expect("failed to read forkpool stderr");
    }
    stderr
}

#[test]
fn sigterm_is_forwarded_to_every_worker() {
    let temp = tempdir().expect("failed to create tempdir");
    let pids_path = temp.path().join("pids");

    let mut child = spawn_pool(
        &temp,
        &[
            "--mode",
            "forever",
            "--workers",
            "2",
            "--max-execution-time",
            "0",
            "--command",
            "echo $$ >> pids; exec sleep 30",
        ],
    );

    wait_for_lines(&pids_path, 2);
    send_signal(&child, Signal::SIGTERM);

    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    assert!(status.success(), "forkpool exited with {status:?}");

    let stderr = stderr_of(&mut child);
    assert!(stderr.contains("intercepted SIGTERM"), "stderr: {stderr}");

    let pids = read_pids(&pids_path);
    assert_eq!(pids.len(), 2);
    for pid in pids {
        wait_for_process_exit(pid);
    }
}

#[test]
fn sigint_stops_one_shot_batch() {
    let temp = tempdir().expect("failed to create tempdir");
    let pids_path = temp.path().join("pids");

    let mut child = spawn_pool(
        &temp,
        &[
            "--mode",
            "once",
            "--workers",
            "2",
            "--max-execution-time",
            "0",
            "--command",
            "echo $$ >> pids; exec sleep 30",
        ],
    );

    wait_for_lines(&pids_path, 2);
    let start = Instant::now();
    send_signal(&child, Signal::SIGINT);

    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    assert!(status.success(), "forkpool exited with {status:?}");
    assert!(start.elapsed() < Duration::from_secs(5));

    let stderr = stderr_of(&mut child);
    assert!(stderr.contains("intercepted SIGINT"), "stderr: {stderr}");
    assert!(stderr.contains("signal=SIGINT"), "stderr: {stderr}");

    for pid in read_pids(&pids_path) {
        wait_for_process_exit(pid);
    }
}

#[test]
fn stubborn_workers_are_killed_after_grace() {
    let temp = tempdir().expect("failed to create tempdir");
    let pids_path = temp.path().join("pids");

    let start = Instant::now();
    let mut child = spawn_pool(
        &temp,
        &[
            "--mode",
            "forever",
            "--workers",
            "1",
            "--max-execution-time",
            "1",
            "--shutdown-grace",
            "1",
            "--command",
            "trap '' TERM; echo $$ >> pids; while :; do sleep 1; done",
        ],
    );

    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    assert!(status.success(), "forkpool exited with {status:?}");
    assert!(start.elapsed() >= Duration::from_secs(2));

    let stderr = stderr_of(&mut child);
    assert!(stderr.contains("sending SIGKILL"), "stderr: {stderr}");
    assert!(stderr.contains("signal=SIGKILL"), "stderr: {stderr}");

    for pid in read_pids(&pids_path) {
        wait_for_process_exit(pid);
    }
}

#[test]
fn repeated_stop_signals_do_not_respawn() {
    let temp = tempdir().expect("failed to create tempdir");
    let pids_path = temp.path().join("pids");

    let mut child = spawn_pool(
        &temp,
        &[
            "--mode",
            "forever",
            "--workers",
            "2",
            "--max-execution-time",
            "0",
            "--shutdown-grace",
            "2",
            "--command",
            "trap '' TERM INT; echo $$ >> pids; while :; do sleep 1; done",
        ],
    );

    wait_for_lines(&pids_path, 2);
    send_signal(&child, Signal::SIGTERM);
    thread::sleep(Duration::from_millis(300));
    send_signal(&child, Signal::SIGINT);
    thread::sleep(Duration::from_millis(300));
    send_signal(&child, Signal::SIGTERM);

    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    assert!(status.success(), "forkpool exited with {status:?}");

    let stderr = stderr_of(&mut child);
    assert!(stderr.contains("intercepted SIGINT"), "stderr: {stderr}");
    assert!(stderr.contains("sending SIGKILL"), "stderr: {stderr}");
    assert_eq!(
        read_lines(&pids_path).len(),
        2,
        "no worker may be forked after a stop"
    );
}

#[test]
fn stop_reaches_only_live_workers_once() {
    let temp = tempdir().expect("failed to create tempdir");

    let mut child = Command::new(forkpool_bin())
        .current_dir(temp.path())
        .args(["--log-level", "debug", "run", "--debug"])
        .args(["--mode", "once", "--workers", "2", "--max-execution-time", "0"])
        .args([
            "--command",
            "if mkdir short 2>/dev/null; then echo $$ > short_pid; exit 0; fi; \
             trap 'echo TERM >> got; exit 0' TERM; echo $$ > long_pid; \
             while :; do sleep 1; done",
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start forkpool");

    wait_for_lines(&temp.path().join("short_pid"), 1);
    wait_for_lines(&temp.path().join("long_pid"), 1);
    let short = read_pids(&temp.path().join("short_pid"))[0];
    let long = read_pids(&temp.path().join("long_pid"))[0];
    // A zombie still answers kill(0), so this returns once the supervisor has reaped it.
    wait_for_process_exit(short);

    send_signal(&child, Signal::SIGTERM);
    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    assert!(status.success(), "forkpool exited with {status:?}");

    let stderr = stderr_of(&mut child);
    assert_eq!(read_lines(&temp.path().join("got")), vec!["TERM"]);
    assert_eq!(stderr.matches("to worker #").count(), 1, "stderr: {stderr}");
    assert!(
        stderr.contains(&format!("Sent SIGTERM to worker #{long}\n")),
        "stderr: {stderr}"
    );
    assert!(
        !stderr.contains(&format!("to worker #{short}\n")),
        "stderr: {stderr}"
    );
    assert!(
        !stderr.contains(&format!("Worker #{short} already gone")),
        "stderr: {stderr}"
    );
}
