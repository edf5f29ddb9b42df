// src/process.rs

//! External tool invocation
//!
//! Every trust-sensitive step (signing, indexing, querying) is delegated to an
//! external executable. Tools run with stdin closed, captured output and an
//! optional deadline after which the child is killed and reaped.

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often a child with a deadline is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of a finished tool
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// stdout and stderr joined, for diagnostics matching and error messages
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, _) => stderr.to_string(),
            (_, true) => stdout.to_string(),
            _ => format!("{stdout}\n{stderr}"),
        }
    }

    pub fn into_error(self, program: &Path) -> Error {
        Error::ExternalTool {
            program: program.display().to_string(),
            status: self.status.to_string(),
            output: self.combined(),
        }
    }
}

/// A single external invocation
#[derive(Debug)]
pub struct Tool {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Tool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            cwd: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run to completion and capture output; a non-zero exit is not an error here
    pub fn output(self) -> Result<ToolOutput> {
        debug!("Running {} {:?}", self.program.display(), self.args);

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| Error::ExternalTool {
            program: self.program.display().to_string(),
            status: "spawn failure".to_string(),
            output: e.to_string(),
        })?;

        let stdout = child.stdout.take().map(|out| thread::spawn(move || drain(out)));
        let stderr = child.stderr.take().map(|err| thread::spawn(move || drain(err)));

        let status = match self.timeout {
            Some(timeout) => wait_with_deadline(&mut child, &self.program, timeout)?,
            None => child.wait().map_err(Error::io_at(&self.program))?,
        };

        let stdout = stdout.map(join_reader).unwrap_or_default();
        let stderr = stderr.map(join_reader).unwrap_or_default();

        debug!("{} finished with {}", self.program.display(), status);
        Ok(ToolOutput {
            status,
            stdout,
            stderr,
        })
    }

    /// Run and fail with [`Error::ExternalTool`] unless the tool exits successfully
    pub fn run(self) -> Result<ToolOutput> {
        let program = self.program.clone();
        let output = self.output()?;
        if output.success() {
            Ok(output)
        } else {
            Err(output.into_error(&program))
        }
    }
}

fn wait_with_deadline(child: &mut Child, program: &Path, timeout: Duration) -> Result<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(Error::io_at(program))? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            warn!("{} exceeded {:?}, killing it", program.display(), timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::ToolTimeout {
                program: program.display().to_string(),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain(mut reader: impl Read) -> String {
    let mut buffer = Vec::new();
    let _ = reader.read_to_end(&mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}
