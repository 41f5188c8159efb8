// tests/session.rs
//
// Drives the built binary over its standard streams.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

const PROMPT: &str = "pipesh> ";

fn shell(extra: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pipesh"));
    cmd.arg("--prompt")
        .arg(PROMPT)
        .args(extra)
        .env("NO_COLOR", "1")
        .env("PIPESH_LOG", "error")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

fn run_script(extra: &[&str], script: &str) -> Output {
    let mut child = shell(extra).spawn().unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(script.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// An interactive shell whose stdout is drained by a background thread, so
/// every read and wait below can give up instead of hanging.
struct Live {
    child: Child,
    chunks: Receiver<Vec<u8>>,
    seen: Vec<u8>,
}

impl Live {
    fn start() -> Self {
        let mut child = shell(&[]).spawn().unwrap();
        let mut stdout = child.stdout.take().unwrap();
        let (tx, chunks) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = [0u8; 512];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Self {
            child,
            chunks,
            seen: Vec::new(),
        }
    }

    fn send(&mut self, line: &str) {
        let stdin = self.child.stdin.as_mut().unwrap();
        stdin.write_all(line.as_bytes()).unwrap();
        stdin.flush().unwrap();
    }

    fn interrupt(&self) {
        kill(Pid::from_raw(self.child.id() as i32), Signal::SIGINT).unwrap();
    }

    /// Collect output until `done` holds for everything seen so far.
    fn read_until(&mut self, timeout: Duration, done: impl Fn(&str) -> bool) {
        let deadline = Instant::now() + timeout;
        while !done(&text(&self.seen)) {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.chunks.recv_timeout(left) {
                Ok(chunk) => self.seen.extend_from_slice(&chunk),
                Err(_) => {
                    let _ = self.child.kill();
                    panic!("shell output stalled: {:?}", text(&self.seen));
                }
            }
        }
    }

    fn wait(&mut self, timeout: Duration) -> ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait().unwrap() {
                return status;
            }
            if Instant::now() >= deadline {
                let _ = self.child.kill();
                panic!("shell did not exit: {:?}", text(&self.seen));
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    /// Whatever else reached stdout before it was closed or went quiet.
    fn drain(&mut self) -> String {
        while let Ok(chunk) = self.chunks.recv_timeout(Duration::from_millis(200)) {
            self.seen.extend_from_slice(&chunk);
        }
        text(&self.seen)
    }
}

#[test]
fn echo_hello_through_cat_is_recorded_once() {
    let output = run_script(&[], "echo hello | cat\nhistory\nexit\n");
    let stdout = text(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("hello\n"));
    assert!(stdout.contains("Command history:\n1: echo hello | cat\n"));
    assert!(!stdout.contains("2: "));
    assert!(stdout.contains("Full command history:\nCommand: echo hello | cat\nPID: "));
    assert_eq!(stdout.matches("Command: ").count(), 1);
}

#[test]
fn full_dump_lists_every_field() {
    let output = run_script(&[], "true\nexit\n");
    let stdout = text(&output.stdout);
    let dump = stdout.split("Full command history:\n").nth(1).unwrap();
    let lines: Vec<&str> = dump.lines().collect();

    assert_eq!(lines[0], "Command: true");
    assert!(lines[1].strip_prefix("PID: ").unwrap().parse::<i32>().unwrap() > 0);
    assert_eq!(lines[2].len(), "Start time: YYYY-MM-DD HH:MM:SS".len());
    let secs = lines[3]
        .strip_prefix("Execution time: ")
        .and_then(|s| s.strip_suffix(" seconds"))
        .unwrap();
    assert_eq!(secs.split('.').nth(1).unwrap().len(), 6);
    assert!(secs.parse::<f64>().unwrap() >= 0.0);
    assert_eq!(lines[4], "----------------------------");
}

#[test]
fn missing_binary_is_reported_and_still_recorded() {
    let output = run_script(&[], "nonexistent_binary_xyz\nhistory\nexit\n");
    let stdout = text(&output.stdout);
    let stderr = text(&output.stderr);

    assert!(stderr.contains("nonexistent_binary_xyz: command not found"));
    assert!(stderr.contains("exited with code 127"));
    assert!(stdout.contains("1: nonexistent_binary_xyz\n"));
    assert!(output.status.success());
}

#[test]
fn oversized_pipeline_is_rejected_and_not_recorded() {
    let output = run_script(&["--max-stages", "2"], "echo a | cat | cat\nhistory\nexit\n");
    let stdout = text(&output.stdout);
    let stderr = text(&output.stderr);

    assert!(stderr.contains("too many pipeline stages (3, limit is 2)"));
    assert!(stdout.contains("Command history:\n"));
    assert!(!stdout.contains("1: "));
    assert!(!stdout.contains("a\n"));
}

#[test]
fn empty_stage_is_a_syntax_error() {
    let output = run_script(&[], "echo a || cat\nexit\n");
    assert!(text(&output.stderr).contains("empty command in pipeline stage 2"));
    assert!(!text(&output.stdout).contains("Command: "));
}

#[test]
fn history_never_exceeds_capacity() {
    let output = run_script(&["--history-capacity", "2"], "true\ntrue\nfalse\ntrue\nhistory\nexit\n");
    let stdout = text(&output.stdout);
    let stderr = text(&output.stderr);

    assert!(stdout.contains("Command history:\n1: true\n2: true\n"));
    assert!(!stdout.contains("3: "));
    assert_eq!(stderr.matches("further commands will not be recorded").count(), 1);
}

#[test]
fn end_of_input_dumps_and_exits_cleanly() {
    let output = run_script(&[], "true\n");
    assert!(output.status.success());
    assert!(text(&output.stdout).contains("Full command history:\nCommand: true\n"));
}

#[test]
fn interrupt_at_idle_prompt_dumps_once_and_exits() {
    let mut live = Live::start();
    let limit = Duration::from_secs(5);

    live.read_until(limit, |out| out.matches(PROMPT).count() >= 1);
    live.send("echo first\n");
    live.read_until(limit, |out| out.matches(PROMPT).count() >= 2);

    live.interrupt();
    let status = live.wait(limit);
    let stdout = live.drain();

    assert_eq!(status.code(), Some(0));
    assert_eq!(stdout.matches("Ctrl+C detected. Printing history before exiting...").count(), 1);
    assert_eq!(stdout.matches("Full command history:").count(), 1);
    assert!(stdout.contains("Command: echo first\n"));
}

#[test]
fn interrupt_while_pipeline_runs_dumps_in_flight_entry() {
    let mut live = Live::start();
    let limit = Duration::from_secs(3);

    live.read_until(limit, |out| out.contains(PROMPT));
    let started = Instant::now();
    live.send("sleep 5\n");
    thread::sleep(Duration::from_millis(500));

    live.interrupt();
    let status = live.wait(limit);
    let elapsed = started.elapsed();
    // the orphaned sleep still holds stdout open, so only read up to the dump
    live.read_until(limit, |out| out.contains("still running\n----------------------------\n"));
    let stdout = text(&live.seen);

    assert_eq!(status.code(), Some(0));
    assert!(elapsed < Duration::from_secs(4), "shell waited for the pipeline: {elapsed:?}");
    assert_eq!(stdout.matches("Ctrl+C detected. Printing history before exiting...").count(), 1);
    assert_eq!(stdout.matches("Full command history:").count(), 1);
    assert!(stdout.contains("Command: sleep 5\nPID: "));
    assert!(stdout.contains("Execution time: still running\n"));
}
