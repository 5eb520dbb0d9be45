use crate::benchmark::Benchmark;
use crate::runtime::Runtime;
use anyhow::{anyhow, Result};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
// how long output readers get after a kill before they are abandoned
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// stdout followed by stderr.
    pub output: String,
    /// `None` when the process was killed by a signal or by the timeout.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

pub trait BenchmarkExecutor {
    fn run(
        &mut self,
        runtime: &dyn Runtime,
        benchmark: &Benchmark,
        timeout: Option<Duration>,
        cwd: &Path,
    ) -> Result<RunOutput>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

impl BenchmarkExecutor for ProcessExecutor {
    fn run(
        &mut self,
        runtime: &dyn Runtime,
        benchmark: &Benchmark,
        timeout: Option<Duration>,
        cwd: &Path,
    ) -> Result<RunOutput> {
        let invocation = benchmark.invocation(runtime)?;
        debug!(
            program = %invocation.program.display(),
            args = ?invocation.args,
            "spawning benchmark"
        );
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd.envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd.current_dir(cwd);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        own_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| {
            anyhow!(
                "failed to spawn {} for {}-{}: {}",
                invocation.program.display(),
                benchmark.suite_name(),
                benchmark.name(),
                e
            )
        })?;
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let deadline = timeout.map(|t| Instant::now() + t);
        let (status, timed_out) = wait_with_deadline(&mut child, deadline, |c| c.try_wait())?;

        // a forked launcher can leave descendants holding the pipes open
        let grace = timed_out.then_some(DRAIN_GRACE);
        let mut output = collect(stdout, grace);
        output.push_str(&collect(stderr, grace));
        Ok(RunOutput {
            output,
            exit_code: if timed_out { None } else { status.code() },
            timed_out,
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

/// Polls `child` until it exits or `deadline` passes, killing its process
/// group on timeout. A polling error also kills the child before returning.
fn wait_with_deadline<F>(
    child: &mut Child,
    deadline: Option<Instant>,
    mut poll: F,
) -> io::Result<(ExitStatus, bool)>
where
    F: FnMut(&mut Child) -> io::Result<Option<ExitStatus>>,
{
    loop {
        let polled = match poll(child) {
            Ok(polled) => polled,
            Err(e) => {
                kill_process_tree(child);
                let _ = child.wait();
                return Err(e);
            }
        };
        if let Some(status) = polled {
            return Ok((status, false));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            debug!(pid = child.id(), "benchmark timed out, killing process group");
            kill_process_tree(child);
            return Ok((child.wait()?, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
}

fn collect(handle: Option<thread::JoinHandle<Vec<u8>>>, grace: Option<Duration>) -> String {
    if let (Some(h), Some(grace)) = (&handle, grace) {
        let deadline = Instant::now() + grace;
        while !h.is_finished() && Instant::now() < deadline {
            thread::sleep(POLL_INTERVAL);
        }
        if !h.is_finished() {
            return String::new();
        }
    }
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::modifier::Modifier;

    #[derive(Debug)]
    struct Native;

    impl Runtime for Native {
        fn name(&self) -> &str {
            "native"
        }
        fn executable(&self) -> Option<&Path> {
            None
        }
        fn heapsize_modifier(&self, _size_mb: u64) -> Option<Modifier> {
            None
        }
        fn describe(&self) -> String {
            "native".into()
        }
    }

    fn shell(script: &str) -> Benchmark {
        Benchmark::new(
            "sh",
            "script",
            vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()],
        )
    }

    #[test]
    fn captures_stdout_stderr_and_exit_code() {
        let out = ProcessExecutor
            .run(
                &Native,
                &shell("echo PASSED in 1 msec; echo oops 1>&2; exit 3"),
                Some(Duration::from_secs(30)),
                &std::env::temp_dir(),
            )
            .expect("run");
        assert!(out.output.contains("PASSED in 1 msec"));
        assert!(out.output.contains("oops"));
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.timed_out);
    }

    #[test]
    fn kills_process_after_timeout() {
        let started = Instant::now();
        let out = ProcessExecutor
            .run(
                &Native,
                &shell("exec sleep 30"),
                Some(Duration::from_millis(300)),
                &std::env::temp_dir(),
            )
            .expect("run");
        assert!(out.timed_out);
        assert_eq!(out.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[test]
    fn timeout_kills_forked_descendants() {
        let started = Instant::now();
        let out = ProcessExecutor
            .run(
                &Native,
                &shell("sleep 8; echo done"),
                Some(Duration::from_millis(300)),
                &std::env::temp_dir(),
            )
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.output.contains("done"));
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn poll_error_kills_the_child() {
        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", "sleep 30; echo done"]);
        own_process_group(&mut cmd);
        let mut child = cmd.spawn().expect("spawn");
        let started = Instant::now();
        let err = wait_with_deadline(&mut child, None, |_| {
            Err(io::Error::new(io::ErrorKind::Other, "wait failed"))
        })
        .expect_err("poll error");
        assert_eq!(err.to_string(), "wait failed");
        assert!(child.try_wait().expect("reaped").is_some());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn missing_program_is_an_error() {
        let bm = Benchmark::new("x", "y", vec!["/definitely/not/here".to_string()]);
        assert!(ProcessExecutor
            .run(&Native, &bm, None, &std::env::temp_dir())
            .is_err());
    }
}
