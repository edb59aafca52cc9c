//! External process supervision.
//!
//! The supervisor launches the download tool with stdout and stderr both
//! piped, merges the two streams line-by-line into the job's transcript
//! file, and surfaces the exit code. Interleaving between the two streams
//! is whatever the OS delivers; within one stream, line order is
//! preserved.
//!
//! ```text
//! spawn ──► stdout ──┐
//!                    ├──► line channel ──► transcript + progress hint
//!       └─► stderr ──┘
//! ```
//!
//! Output is decoded best-effort: invalid UTF-8 is replaced, never fatal.
//! Progress detection is a deliberately loose substring heuristic
//! ([`progress_hint`]), kept separate from the supervision loop so it can
//! be swapped or disabled without touching anything else.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::ProcessError;

/// A fully-resolved command line plus the directory it runs in.
#[derive(Debug, Clone)]
pub struct ProcessInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: PathBuf,
}

impl ProcessInvocation {
    pub fn new(program: impl Into<String>, current_dir: impl Into<PathBuf>) -> Self {
        ProcessInvocation {
            program: program.into(),
            args: Vec::new(),
            current_dir: current_dir.into(),
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

    /// Shell-style rendering for transcripts and diagnostics.
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Append-only per-job transcript file.
pub struct JobLogFile {
    path: PathBuf,
    file: tokio::fs::File,
}

impl JobLogFile {
    /// Opens the transcript for appending, creating it and its parent
    /// directory if needed.
    pub async fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(JobLogFile { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line, adding the trailing newline.
    pub async fn append_line(&mut self, line: &str) -> io::Result<()> {
        self.file.write_all(line.as_bytes()).await?;
        self.file.write_all(b"\n").await?;
        self.file.flush().await
    }
}

/// Substring heuristic for progress signals in tool output.
///
/// Best-effort signal extraction, not a structured protocol: one matched
/// line yields one opaque progress text for the status sink.
pub fn progress_hint(line: &str) -> Option<&'static str> {
    if line.contains("Downloading") {
        Some("Downloading...")
    } else {
        None
    }
}

/// Receives progress hints extracted from the output stream.
#[async_trait]
pub trait ProgressListener: Send + Sync {
    async fn on_progress(&self, text: &str);
}

/// Listener that discards every hint.
pub struct NoProgress;

#[async_trait]
impl ProgressListener for NoProgress {
    async fn on_progress(&self, _text: &str) {}
}

/// Runs one external process to completion.
///
/// Streams merged stdout/stderr into `log` line-by-line, forwarding
/// progress hints to `progress`, then waits for termination. A non-zero
/// exit code (or a signal death, reported as -1) is surfaced as
/// [`ProcessError::Exit`]; the supervisor never retries.
pub async fn run_supervised(
    invocation: &ProcessInvocation,
    log: &mut JobLogFile,
    progress: &dyn ProgressListener,
) -> Result<(), ProcessError> {
    log.append_line(&format!("[Executing] {}", invocation.display_line()))
        .await
        .map_err(|source| ProcessError::Stream { source })?;

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .current_dir(&invocation.current_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Launch {
            program: invocation.program.clone(),
            source,
        })?;

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, line_tx.clone()));
    }
    drop(line_tx);

    while let Some(line) = line_rx.recv().await {
        log.append_line(&line)
            .await
            .map_err(|source| ProcessError::Stream { source })?;
        if let Some(hint) = progress_hint(&line) {
            progress.on_progress(hint).await;
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|source| ProcessError::Stream { source })?;
    if !status.success() {
        return Err(ProcessError::Exit {
            code: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

/// Forwards one pipe to the shared line channel until end-of-stream.
async fn forward_lines<R>(stream: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(stream).split(b'\n');
    while let Ok(Some(segment)) = segments.next_segment().await {
        let mut line = String::from_utf8_lossy(&segment).into_owned();
        if line.ends_with('\r') {
            line.pop();
        }
        if tx.send(line).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingListener(Mutex<Vec<String>>);

    impl RecordingListener {
        fn hints(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProgressListener for RecordingListener {
        async fn on_progress(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    async fn run_script(
        dir: &Path,
        script: &str,
        listener: &dyn ProgressListener,
    ) -> (Result<(), ProcessError>, String) {
        let mut log = JobLogFile::open(dir.join("job.log")).await.unwrap();
        let invocation = ProcessInvocation::new("sh", dir).arg("-c").arg(script);
        let outcome = run_supervised(&invocation, &mut log, listener).await;
        let transcript = tokio::fs::read_to_string(dir.join("job.log")).await.unwrap();
        (outcome, transcript)
    }

    #[test]
    fn hint_matches_downloading_lines_only() {
        assert_eq!(progress_hint("Downloading post 3 of 10"), Some("Downloading..."));
        assert_eq!(progress_hint("[drive] Downloading attachment"), Some("Downloading..."));
        assert_eq!(progress_hint("Fetching metadata"), None);
        assert_eq!(progress_hint(""), None);
    }

    #[test]
    fn display_line_joins_program_and_args() {
        let invocation = ProcessInvocation::new("kemono-dl", ".")
            .arg("--path")
            .arg("/tmp/ws");
        assert_eq!(invocation.display_line(), "kemono-dl --path /tmp/ws");
    }

    #[tokio::test]
    async fn captures_both_output_streams() {
        let tmp = tempfile::tempdir().unwrap();
        let (outcome, transcript) = run_script(
            tmp.path(),
            "echo from-stdout; echo from-stderr 1>&2",
            &NoProgress,
        )
        .await;

        assert!(outcome.is_ok());
        assert!(transcript.contains("[Executing] sh -c"));
        assert!(transcript.contains("from-stdout"));
        assert!(transcript.contains("from-stderr"));
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_the_code() {
        let tmp = tempfile::tempdir().unwrap();
        let (outcome, transcript) = run_script(tmp.path(), "echo boom; exit 7", &NoProgress).await;

        match outcome {
            Err(ProcessError::Exit { code }) => assert_eq!(code, 7),
            other => panic!("expected exit error, got {other:?}"),
        }
        // Output written before the failure is still captured.
        assert!(transcript.contains("boom"));
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut log = JobLogFile::open(tmp.path().join("job.log")).await.unwrap();
        let invocation = ProcessInvocation::new("binary-that-does-not-exist-4242", tmp.path());

        let outcome = run_supervised(&invocation, &mut log, &NoProgress).await;
        assert!(matches!(outcome, Err(ProcessError::Launch { .. })));
    }

    #[tokio::test]
    async fn progress_hints_reach_the_listener() {
        let tmp = tempfile::tempdir().unwrap();
        let listener = RecordingListener::default();
        let (outcome, transcript) = run_script(
            tmp.path(),
            "echo 'Downloading file 1'; echo other; echo 'Downloading file 2'",
            &listener,
        )
        .await;

        assert!(outcome.is_ok());
        assert_eq!(listener.hints(), vec!["Downloading...", "Downloading..."]);
        assert!(transcript.contains("Downloading file 2"));
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let (outcome, transcript) =
            run_script(tmp.path(), r#"printf '\377\376broken\n'"#, &NoProgress).await;

        assert!(outcome.is_ok());
        assert!(transcript.contains("broken"));
        assert!(transcript.contains('\u{FFFD}'));
    }
}
