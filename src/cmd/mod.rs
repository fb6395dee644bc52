//! The cmd module runs shell command lines, either on this machine or on a
//! remote server over `ssh`, and hands their exit code and output back to
//! the cluster orchestration.

use crate::error::CiError::CommandSpawnError;
use crate::error::CiResult;
use crate::io::Logger;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub mod local;
pub mod remote;

#[cfg(test)]
pub mod fake;

pub use local::LocalCmd;
pub use remote::RemoteCmd;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Exit code and output of a command line. `stdout` also carries whatever
/// the command wrote to stderr.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CmdOutput {
    pub returncode: i32,
    pub stdout: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.returncode == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Do not log the command line, e.g. because it carries credentials.
    pub silent: bool,
    pub report_non_zero: bool,
    /// On expiry the whole local process group is killed. A command already
    /// running on a remote host only loses its `ssh` session.
    pub timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            silent: false,
            report_non_zero: true,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl RunOptions {
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    pub fn ignore_non_zero() -> Self {
        Self {
            report_non_zero: false,
            ..Self::default()
        }
    }

    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            timeout: Some(Duration::from_secs(timeout_secs)),
            ..Self::default()
        }
    }
}

/// A place command lines are run in. Every command runs in the directory set
/// by the last `cd`.
pub trait Cmd {
    fn run_with(&mut self, line: &str, options: RunOptions) -> CiResult<CmdOutput>;

    fn run(&mut self, line: &str) -> CiResult<CmdOutput> {
        self.run_with(line, RunOptions::default())
    }

    fn cd(&mut self, dir: &str);

    /// Copies `src` (relative paths resolve against the working directory)
    /// to the local path `dst`. Returns whether the copy succeeded.
    fn copyin(&mut self, src: &str, dst: &Path) -> CiResult<bool>;

    fn close(&mut self) -> CiResult<()>;
}

/// Opens a command runner on `node`: local for `localhost`, over `ssh`
/// otherwise.
pub fn get_connection(node: &str, logger: &Logger) -> Box<dyn Cmd> {
    match node {
        "" | "localhost" | "127.0.0.1" => Box::new(LocalCmd::new(logger)),
        _ => Box::new(RemoteCmd::new(node, logger)),
    }
}

/// Quotes `text` for safe use as a single POSIX shell word.
pub fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

//
// PRIVATES
//

/// Spawns `command` in its own process group, collects its output and waits
/// for it to exit. On timeout the group is killed, whatever it printed so far
/// is returned and the return code is `-1`.
fn execute(
    mut command: Command,
    line: &str,
    options: RunOptions,
    logger: &Logger,
) -> CiResult<CmdOutput> {
    if !options.silent {
        logger.debug(format!("> {}", line))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CommandSpawnError {
            command: line.to_string(),
            source,
        })?;
    let (stdout, stdout_reader) = drain(child.stdout.take());
    let (stderr, stderr_reader) = drain(child.stderr.take());

    let started = Instant::now();
    let returncode = loop {
        if let Some(status) = child.try_wait()? {
            // Readers are only joined after a normal exit: a killed shell may
            // leave children holding the pipes open.
            for reader in vec![stdout_reader, stderr_reader].into_iter().flatten() {
                let _ = reader.join();
            }
            break status.code().unwrap_or(-1);
        }
        if let Some(timeout) = options.timeout {
            if started.elapsed() >= timeout {
                kill_process_group(&mut child)?;
                logger.error(format!(
                    "command timed out after {}s: {}",
                    timeout.as_secs(),
                    if options.silent { "<hidden>" } else { line }
                ))?;
                break -1;
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    let mut output = take(&stdout);
    output.push_str(&take(&stderr));
    if returncode != 0 && options.report_non_zero && !options.silent {
        logger.debug(format!("command returned {}: {}", returncode, output.trim_end()))?;
    }

    Ok(CmdOutput {
        returncode,
        stdout: output,
    })
}

fn kill_process_group(child: &mut Child) -> CiResult<()> {
    #[cfg(unix)]
    {
        // a negative pid addresses the group
        let group = format!("-{}", child.id());
        let _ = Command::new("kill")
            .args(&["-s", "KILL", "--", group.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    child.wait()?;
    Ok(())
}

type SharedBuffer = Arc<Mutex<String>>;

fn drain<R: Read + Send + 'static>(source: Option<R>) -> (SharedBuffer, Option<JoinHandle<()>>) {
    let buffer = Arc::new(Mutex::new(String::new()));
    let handle = source.map(|source| {
        let buffer = buffer.clone();
        thread::spawn(move || {
            for chunk in BufReader::new(source).split(b'\n') {
                match chunk {
                    Ok(chunk) => {
                        if let Ok(mut buffer) = buffer.lock() {
                            buffer.push_str(&String::from_utf8_lossy(&chunk));
                            buffer.push('\n');
                        }
                    }
                    Err(_) => break,
                }
            }
        })
    });
    (buffer, handle)
}

fn take(buffer: &SharedBuffer) -> String {
    buffer
        .lock()
        .map(|mut buffer| std::mem::take(&mut *buffer))
        .unwrap_or_default()
}

//
// TESTS
//

#[cfg(test)]
mod tests {
    use crate::cmd::{get_connection, shell_quote, Cmd, LocalCmd, RunOptions};
    use crate::io::Logger;

    fn quiet_logger() -> Logger {
        let mut logger = Logger::default();
        logger.quiet = true;
        logger
    }

    #[test]
    fn it_can_quote_shell_words() {
        assert_eq!(shell_quote("oc get pods"), "'oc get pods'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn it_can_run_a_local_command() {
        let mut cmd = LocalCmd::new(&quiet_logger());
        let output = cmd.run("echo hello; echo oops >&2; exit 3").unwrap();

        assert_eq!(output.returncode, 3);
        assert!(output.stdout.contains("hello"));
        assert!(output.stdout.contains("oops"));
    }

    #[test]
    fn it_will_kill_a_command_on_timeout() {
        let mut cmd = LocalCmd::new(&quiet_logger());
        let mut options = RunOptions::ignore_non_zero();
        options.timeout = Some(std::time::Duration::from_millis(100));

        let output = cmd.run_with("echo started; sleep 5", options).unwrap();
        assert_eq!(output.returncode, -1);
    }

    #[test]
    fn it_will_kill_background_children_on_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = LocalCmd::new(&quiet_logger());
        cmd.cd(dir.path().to_str().unwrap());
        let mut options = RunOptions::ignore_non_zero();
        options.timeout = Some(std::time::Duration::from_millis(200));

        let output = cmd
            .run_with("(sleep 1 && touch marker) & wait", options)
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1500));

        assert_eq!(output.returncode, -1);
        assert!(!dir.path().join("marker").exists());
    }

    #[test]
    fn it_will_run_in_the_changed_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = get_connection("localhost", &quiet_logger());
        cmd.cd(dir.path().to_str().unwrap());

        let output = cmd.run("touch marker && ls").unwrap();
        assert!(output.success());
        assert!(dir.path().join("marker").exists());
    }
}
