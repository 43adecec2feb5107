//! External command execution with a time bound.
//!
//! Generators that delegate to an external renderer go through the
//! [`CommandRunner`] trait so tests can substitute a scripted runner for the
//! real binary. [`SystemCommandRunner`] spawns the process, drains stdout and
//! stderr on reader threads and polls for exit until the deadline passes, at
//! which point the child is killed. The deadline also covers draining the
//! pipes, which a grandchild can keep open after the child is gone.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment variables, added to the inherited environment.
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
    /// The process is killed once this elapses; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The command line as it would be typed, for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a finished command produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run that printed `stdout`.
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(0),
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with exit `code`.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            success: false,
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }
}

/// Why a command could not be run to completion.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The program does not exist or is not executable.
    #[error("program not found: {program}")]
    NotFound { program: String },

    /// The deadline passed and the process was killed.
    #[error("process exceeded {}s and was killed", after.as_secs())]
    TimedOut { after: Duration },

    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs external commands.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError>;
}

/// Runs commands on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        debug!("Running: {}", spec.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotFound {
                    program: spec.program.clone(),
                }
            } else {
                ProcessError::Io(e)
            }
        })?;

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let bound = spec.timeout.map(|timeout| (timeout, Instant::now() + timeout));

        let status = match bound {
            Some((timeout, deadline)) => match wait_until(&mut child, deadline)? {
                Some(status) => status,
                None => {
                    warn!("Killing '{}' after {}s", spec.program, timeout.as_secs_f64());
                    // The child may have exited between the last poll and the kill
                    let _ = child.kill();
                    let _ = child.wait();
                    // Readers are left behind: a grandchild may still hold the pipes open
                    return Err(ProcessError::TimedOut { after: timeout });
                }
            },
            None => child.wait()?,
        };

        let (stdout, stderr) = match bound {
            Some((timeout, deadline)) => match (
                join_reader_until(stdout_reader, deadline)?,
                join_reader_until(stderr_reader, deadline)?,
            ) {
                (Some(stdout), Some(stderr)) => (stdout, stderr),
                _ => {
                    warn!(
                        "'{}' exited but its output stayed open past {}s",
                        spec.program,
                        timeout.as_secs_f64()
                    );
                    return Err(ProcessError::TimedOut { after: timeout });
                }
            },
            None => (join_reader(stdout_reader)?, join_reader(stderr_reader)?),
        };
        trace!(
            "'{}' exited with {:?} ({} bytes of output)",
            spec.program,
            status.code(),
            stdout.len()
        );

        Ok(CommandOutput {
            status: status.code(),
            success: status.success(),
            stdout,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

fn wait_until(
    child: &mut Child,
    deadline: Instant,
) -> Result<Option<std::process::ExitStatus>, ProcessError> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

type Reader = Option<JoinHandle<std::io::Result<Vec<u8>>>>;

fn spawn_reader<R: Read + Send + 'static>(stream: Option<R>) -> Reader {
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join_reader(reader: Reader) -> Result<Vec<u8>, ProcessError> {
    match reader {
        Some(handle) => match handle.join() {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProcessError::Io(std::io::Error::other(
                "output reader thread panicked",
            ))),
        },
        None => Ok(Vec::new()),
    }
}

/// Join a reader once it finishes, or give up on it at `deadline`.
fn join_reader_until(reader: Reader, deadline: Instant) -> Result<Option<Vec<u8>>, ProcessError> {
    if let Some(handle) = &reader {
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
    join_reader(reader).map(Some)
}
