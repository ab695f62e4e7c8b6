//! Concrete subjects: one-shot commands for the baseline side and a
//! line-protocol server for the candidate side.

use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::coldstart::ColdStartTarget;

/// One-shot process invocation. Each call spawns the command, waits for it,
/// and reports the zero sentinel when it cannot start or exits non-zero.
#[derive(Clone, Debug)]
pub struct CommandOp {
    program: String,
    args: Vec<String>,
    last_output_bytes: u64,
}

impl CommandOp {
    pub fn new(argv: &[String]) -> io::Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            last_output_bytes: 0,
        })
    }

    /// Stdout size of the most recent successful run.
    pub fn last_output_bytes(&self) -> u64 {
        self.last_output_bytes
    }

    pub fn run(&mut self) -> Duration {
        let start = Instant::now();
        let output = Command::new(&self.program)
            .args(&self.args)
            .env("NO_COLOR", "1")
            .stdin(Stdio::null())
            .output();
        let elapsed = start.elapsed();

        match output {
            Ok(out) if out.status.success() => {
                self.last_output_bytes = out.stdout.len() as u64;
                elapsed
            }
            Ok(out) => {
                debug!(program = %self.program, status = %out.status, "command failed");
                Duration::ZERO
            }
            Err(e) => {
                debug!(program = %self.program, error = %e, "command could not start");
                Duration::ZERO
            }
        }
    }
}

/// A long-running child speaking a line protocol: one request line on
/// stdin, one response line on stdout.
#[derive(Debug)]
pub struct LineServer {
    program: String,
    args: Vec<String>,
    request: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    last_response_bytes: u64,
}

impl LineServer {
    pub fn new(argv: &[String], request: impl Into<String>) -> io::Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty server command"))?;
        let mut request = request.into();
        if !request.ends_with('\n') {
            request.push('\n');
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            request,
            child: None,
            stdin: None,
            stdout: None,
            last_response_bytes: 0,
        })
    }

    pub fn last_response_bytes(&self) -> u64 {
        self.last_response_bytes
    }

    /// Stop the child. Safe to call more than once.
    pub fn shutdown(&mut self) {
        // Closing stdin lets well-behaved servers exit on their own.
        self.stdin.take();
        self.stdout.take();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!(error = %e, "kill failed; server likely exited already");
            }
            if let Err(e) = child.wait() {
                warn!(error = %e, "failed to reap server process");
            }
        }
    }
}

impl ColdStartTarget for LineServer {
    type Error = io::Error;

    fn spawn(&mut self) -> io::Result<Option<u32>> {
        self.shutdown();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let pid = child.id();
        self.stdin = child.stdin.take();
        self.stdout = child.stdout.take().map(BufReader::new);
        self.child = Some(child);
        Ok(Some(pid))
    }

    fn query(&mut self) -> io::Result<()> {
        let (Some(stdin), Some(stdout)) = (self.stdin.as_mut(), self.stdout.as_mut()) else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "server not running"));
        };
        stdin.write_all(self.request.as_bytes())?;
        stdin.flush()?;

        let mut line = String::new();
        let n = stdout.read_line(&mut line)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed stdout",
            ));
        }
        self.last_response_bytes = n as u64;
        Ok(())
    }
}

impl Drop for LineServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn command_op_times_success_and_zeroes_failure() {
        let mut ok = CommandOp::new(&argv(&["echo", "hello"])).unwrap();
        assert!(ok.run() > Duration::ZERO);
        assert_eq!(ok.last_output_bytes(), 6);

        let mut bad = CommandOp::new(&argv(&["false"])).unwrap();
        assert_eq!(bad.run(), Duration::ZERO);

        let mut missing = CommandOp::new(&argv(&["definitely-not-a-real-binary-xyz"])).unwrap();
        assert_eq!(missing.run(), Duration::ZERO);
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandOp::new(&[]).is_err());
        assert!(LineServer::new(&[], "ping").is_err());
    }

    #[test]
    fn line_server_round_trips_with_cat() {
        let mut server = LineServer::new(&argv(&["cat"]), "ping").unwrap();
        let pid = server.spawn().unwrap();
        assert!(pid.is_some());
        server.query().unwrap();
        server.query().unwrap();
        assert_eq!(server.last_response_bytes(), 5);
        server.shutdown();
        assert!(server.query().is_err());
    }

    #[test]
    fn query_before_spawn_fails() {
        let mut server = LineServer::new(&argv(&["cat"]), "ping").unwrap();
        let err = server.query().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
