// dispatcher.rs - Run build-tool commands through the platform shell
//
// Each dispatch spawns one shell, writes the command line to its stdin, and
// collects stdout and stderr. Both pipes are drained on their own threads
// while the process runs, so a child that fills one pipe cannot stall on it
// while we wait for exit.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{IndexError, Result};
use crate::perf::TimingGuard;

/// How often `dispatch_with_timeout` polls the child for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Something that can be written to a shell as a single command line.
pub trait ShellCommand {
    fn command_line(&self) -> String;

    /// Deadline for this command, overriding the runner's own.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

impl ShellCommand for str {
    fn command_line(&self) -> String {
        self.to_string()
    }
}

impl ShellCommand for String {
    fn command_line(&self) -> String {
        self.clone()
    }
}

/// Quoting dialect of a shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Posix,
    Cmd,
}

/// The interpreter a dispatcher feeds commands to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    kind: ShellKind,
    program: String,
    args: Vec<String>,
}

impl Shell {
    /// `sh` reading commands from stdin.
    pub fn posix() -> Self {
        Self::custom(ShellKind::Posix, "sh", &[])
    }

    /// `cmd` with command echo turned off.
    pub fn cmd() -> Self {
        Self::custom(ShellKind::Cmd, "cmd", &["/Q"])
    }

    /// The shell for the platform we were compiled for.
    pub fn detect() -> Self {
        if cfg!(windows) {
            Self::cmd()
        } else {
            Self::posix()
        }
    }

    pub fn custom(kind: ShellKind, program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            kind,
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn kind(&self) -> ShellKind {
        self.kind
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Quote one argument so the shell passes it through as a single word.
    ///
    /// Arguments made only of characters with no special meaning are returned
    /// unchanged.
    pub fn quote(&self, arg: &str) -> String {
        let plain = !arg.is_empty()
            && arg
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "_-+=/:.,@%".contains(c));
        if plain {
            return arg.to_string();
        }
        match self.kind {
            ShellKind::Posix => format!("'{}'", arg.replace('\'', r"'\''")),
            ShellKind::Cmd => format!("\"{}\"", arg.replace('"', "\"\"")),
        }
    }
}

/// Captured result of one dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub standard_output_lines: Vec<String>,
    pub error_output_lines: Vec<String>,
    pub raw_standard_output: String,
    pub raw_error_output: String,
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn new(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            standard_output_lines: stdout.lines().map(str::to_string).collect(),
            error_output_lines: stderr.lines().map(str::to_string).collect(),
            raw_standard_output: stdout,
            raw_error_output: stderr,
            exit_code,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Seam between the query pipeline and process execution.
pub trait QueryRunner: Send + Sync {
    fn run(&self, command: &dyn ShellCommand) -> Result<CommandOutput>;
}

/// Executes commands as if typed into a terminal.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    name: String,
    shell: Shell,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandDispatcher {
    /// `name` identifies this dispatcher in logs and reader thread names.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shell: Shell::detect(),
            working_dir: None,
            timeout: None,
        }
    }

    pub fn with_shell(mut self, shell: Shell) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }

    /// Deadline applied when the dispatcher is used as a [`QueryRunner`].
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Run `command` and block until it exits and both pipes are drained.
    pub fn dispatch<C: ShellCommand + ?Sized>(&self, command: &C) -> Result<CommandOutput> {
        self.execute(&command.command_line(), None)
    }

    /// Like [`dispatch`](Self::dispatch), but kill the process once `timeout`
    /// elapses and fail with a `TimedOut` dispatch error.
    pub fn dispatch_with_timeout<C: ShellCommand + ?Sized>(
        &self,
        command: &C,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        self.execute(&command.command_line(), Some(timeout))
    }

    /// Run the blocking dispatch on tokio's blocking pool.
    pub async fn dispatch_async(
        &self,
        command: String,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput> {
        let dispatcher = self.clone();
        let line = command.clone();
        tokio::task::spawn_blocking(move || dispatcher.execute(&line, timeout))
            .await
            .map_err(|e| IndexError::dispatch(&command, io::Error::other(e)))?
    }

    fn execute(&self, command: &str, timeout: Option<Duration>) -> Result<CommandOutput> {
        let _timing = TimingGuard::with_threshold("dispatch", 5_000);
        crate::perf::increment_dispatch_calls();
        log::debug!("[{}] dispatching `{}`", self.name, command);

        let mut process = Command::new(&self.shell.program);
        process
            .args(&self.shell.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            process.current_dir(dir);
        }
        let mut child = process
            .spawn()
            .map_err(|e| IndexError::dispatch(command, e))?;

        let readers = self
            .start_readers(&mut child)
            .and_then(|readers| write_command(&mut child, command).map(|()| readers));
        let (stdout_reader, stderr_reader) = match readers {
            Ok(readers) => readers,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(IndexError::dispatch(command, e));
            }
        };

        let status = match timeout {
            Some(limit) => wait_with_deadline(&mut child, limit),
            None => child.wait(),
        };
        // On timeout the readers are left detached: a grandchild may still
        // hold the pipes open.
        let status = status.map_err(|e| IndexError::dispatch(command, e))?;

        let stdout = join_reader(stdout_reader).map_err(|e| IndexError::dispatch(command, e))?;
        let stderr = join_reader(stderr_reader).map_err(|e| IndexError::dispatch(command, e))?;

        let output = CommandOutput::new(stdout, stderr, exit_code(status));
        log::debug!(
            "[{}] `{}` exited with {} ({} stdout lines, {} stderr lines)",
            self.name,
            command,
            output.exit_code,
            output.standard_output_lines.len(),
            output.error_output_lines.len()
        );
        Ok(output)
    }

    fn start_readers(&self, child: &mut Child) -> io::Result<(Reader, Reader)> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stderr was not captured"))?;
        let stdout_reader = drain(format!("{}-stdout", self.name), stdout)?;
        let stderr_reader = drain(format!("{}-stderr", self.name), stderr)?;
        Ok((stdout_reader, stderr_reader))
    }
}

impl QueryRunner for CommandDispatcher {
    fn run(&self, command: &dyn ShellCommand) -> Result<CommandOutput> {
        self.execute(&command.command_line(), command.timeout().or(self.timeout))
    }
}

type Reader = JoinHandle<io::Result<Vec<u8>>>;

fn drain<R: Read + Send + 'static>(name: String, mut source: R) -> io::Result<Reader> {
    thread::Builder::new().name(name).spawn(move || {
        let mut buffer = Vec::new();
        source.read_to_end(&mut buffer)?;
        Ok(buffer)
    })
}

fn join_reader(reader: Reader) -> io::Result<String> {
    let bytes = reader
        .join()
        .map_err(|_| io::Error::other("output reader panicked"))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write the command line and close stdin so the shell sees end of input.
fn write_command(child: &mut Child, command: &str) -> io::Result<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin was not captured"));
    };
    match writeln!(stdin, "{command}").and_then(|()| stdin.flush()) {
        // The shell may exit before reading its input; its output still counts.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            log::debug!("shell closed stdin early: {}", e);
            Ok(())
        }
        other => other,
    }
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            log::warn!("Killing process {} after {:?}", child.id(), timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("timed out after {timeout:?}"),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_lines() {
        let output = CommandOutput::new("a\nb\r\n".into(), "".into(), 0);
        assert_eq!(output.standard_output_lines, vec!["a", "b"]);
        assert!(output.error_output_lines.is_empty());
        assert!(output.succeeded());
        assert!(!CommandOutput::new(String::new(), String::new(), 2).succeeded());
    }

    #[test]
    fn test_posix_quote() {
        let shell = Shell::posix();
        assert_eq!(shell.quote("//..."), "//...");
        assert_eq!(shell.quote("label_kind"), "label_kind");
        assert_eq!(
            shell.quote("kind(\"source file\", //...:*)"),
            "'kind(\"source file\", //...:*)'"
        );
        assert_eq!(shell.quote("it's"), r"'it'\''s'");
        assert_eq!(shell.quote(""), "''");
    }

    #[test]
    fn test_cmd_quote() {
        let shell = Shell::cmd();
        assert_eq!(shell.quote("//..."), "//...");
        assert_eq!(
            shell.quote("kind(\"source file\", //...:*)"),
            "\"kind(\"\"source file\"\", //...:*)\""
        );
    }

    #[test]
    fn test_detect_matches_platform() {
        let shell = Shell::detect();
        if cfg!(windows) {
            assert_eq!(shell.kind(), ShellKind::Cmd);
        } else {
            assert_eq!(shell.kind(), ShellKind::Posix);
            assert_eq!(shell.program(), "sh");
        }
    }

    #[test]
    fn test_spawn_failure_is_dispatch_error() {
        let dispatcher = CommandDispatcher::new("test").with_shell(Shell::custom(
            ShellKind::Posix,
            "/nonexistent/bazel-index-shell",
            &[],
        ));
        let err = dispatcher.dispatch("echo hi").unwrap_err();
        assert!(matches!(err, IndexError::DispatchFailed { .. }));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        #[test]
        fn test_dispatch_echo() {
            let dispatcher = CommandDispatcher::new("test");
            let output = dispatcher.dispatch("echo hello").unwrap();
            assert_eq!(output.standard_output_lines, vec!["hello"]);
            assert_eq!(output.raw_standard_output, "hello\n");
            assert!(output.succeeded());
        }

        #[test]
        fn test_dispatch_captures_stderr_and_exit_code() {
            let dispatcher = CommandDispatcher::new("test");
            let output = dispatcher.dispatch("echo oops >&2; exit 3").unwrap();
            assert!(output.standard_output_lines.is_empty());
            assert_eq!(output.error_output_lines, vec!["oops"]);
            assert_eq!(output.exit_code, 3);
            assert!(!output.succeeded());
        }

        #[test]
        fn test_large_output_on_both_pipes_completes() {
            // Well past any pipe buffer on both streams at once.
            let script = "head -c 2000000 /dev/zero | tr '\\000' a; \
                          head -c 2000000 /dev/zero | tr '\\000' b >&2";
            let dispatcher = CommandDispatcher::new("test");
            let output = dispatcher
                .dispatch_with_timeout(script, Duration::from_secs(60))
                .unwrap();
            assert!(output.succeeded());
            assert_eq!(output.raw_standard_output.len(), 2_000_000);
            assert_eq!(output.raw_error_output.len(), 2_000_000);
            assert!(output.raw_standard_output.bytes().all(|b| b == b'a'));
            assert!(output.raw_error_output.bytes().all(|b| b == b'b'));
        }

        #[test]
        fn test_timeout_kills_process() {
            let dispatcher = CommandDispatcher::new("test");
            let start = Instant::now();
            let err = dispatcher
                .dispatch_with_timeout("sleep 30", Duration::from_millis(100))
                .unwrap_err();
            assert!(start.elapsed() < Duration::from_secs(10));
            match err {
                IndexError::DispatchFailed { source, .. } => {
                    assert_eq!(source.kind(), io::ErrorKind::TimedOut);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn test_query_runner_uses_configured_timeout() {
            let dispatcher =
                CommandDispatcher::new("test").with_timeout(Some(Duration::from_millis(100)));
            let err = dispatcher.run(&"sleep 30".to_string()).unwrap_err();
            assert!(matches!(err, IndexError::DispatchFailed { .. }));
        }

        #[test]
        fn test_working_dir() {
            let dir = tempfile::tempdir().unwrap();
            let dispatcher = CommandDispatcher::new("test").with_working_dir(dir.path());
            let output = dispatcher.dispatch("pwd").unwrap();
            let expected = dir.path().file_name().unwrap().to_string_lossy().to_string();
            assert!(output.standard_output_lines[0].ends_with(&expected));
        }

        #[tokio::test]
        async fn test_dispatch_async() {
            let dispatcher = CommandDispatcher::new("test");
            let output = dispatcher
                .dispatch_async("echo async".to_string(), None)
                .await
                .unwrap();
            assert_eq!(output.standard_output_lines, vec!["async"]);
        }
    }
}
