//! Wrapper around the external `yt-dlp` program: title lookups and caption
//! file downloads, each bounded by a hard timeout.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::select::CAPTION_EXTENSION;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{label} command timed out after {}s", .after.as_secs_f64())]
    Timeout { label: &'static str, after: Duration },
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{label} command exited with {status}: {stderr}")]
    Failed {
        label: &'static str,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

/// Everything needed for one caption download.
#[derive(Debug, Clone)]
pub struct CaptionDownload<'a> {
    pub video_id: &'a str,
    pub languages: &'a [&'a str],
    /// Request human-authored subtitles.
    pub manual: bool,
    /// Request auto-generated captions.
    pub auto: bool,
    /// Fresh directory the files are written into.
    pub output_dir: &'a Path,
    pub proxy: Option<&'a str>,
    pub cookies: Option<&'a Path>,
}

/// Narrow interface over the download tool so the orchestrator can be tested
/// without spawning processes.
pub trait DownloadTool {
    /// Best-effort title lookup. `Ok(None)` when the tool printed nothing.
    fn title(
        &self,
        video_id: &str,
        proxy: Option<&str>,
        cookies: Option<&Path>,
    ) -> Result<Option<String>, ToolError>;

    /// Downloads caption files and returns the paths written, sorted.
    fn download_captions(&self, request: &CaptionDownload<'_>) -> Result<Vec<PathBuf>, ToolError>;
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    download_timeout: Duration,
    title_timeout: Duration,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>, download_timeout: Duration, title_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            download_timeout,
            title_timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, proxy: Option<&str>, cookies: Option<&Path>) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(proxy) = proxy {
            command.arg("--proxy").arg(proxy);
        }
        if let Some(cookies) = cookies {
            command
                .arg("--cookies")
                .arg(cookies.to_string_lossy().to_string());
        }
        command
    }
}

impl DownloadTool for YtDlp {
    fn title(
        &self,
        video_id: &str,
        proxy: Option<&str>,
        cookies: Option<&Path>,
    ) -> Result<Option<String>, ToolError> {
        let mut command = self.command(proxy, cookies);
        command
            .arg("--get-title")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg(watch_url(video_id));

        let output = run_with_timeout(command, "title", self.title_timeout)?;
        if !output.status.success() {
            return Err(ToolError::Failed {
                label: "title",
                status: output.status,
                stderr: output.stderr.trim().to_owned(),
            });
        }
        let title = output.stdout.trim();
        Ok((!title.is_empty()).then(|| title.to_owned()))
    }

    fn download_captions(&self, request: &CaptionDownload<'_>) -> Result<Vec<PathBuf>, ToolError> {
        let template = request.output_dir.join("%(id)s.%(ext)s");
        let mut command = self.command(request.proxy, request.cookies);
        command.arg("--skip-download");
        if request.manual {
            command.arg("--write-sub");
        }
        if request.auto {
            command.arg("--write-auto-sub");
        }
        command
            .arg("--sub-langs")
            .arg(request.languages.join(","))
            .arg("--sub-format")
            .arg(CAPTION_EXTENSION)
            .arg("--output")
            .arg(template.to_string_lossy().to_string())
            .arg("--no-warnings")
            .arg("--no-progress")
            .arg(watch_url(request.video_id));

        let output = run_with_timeout(command, "captions", self.download_timeout)?;
        let files = list_caption_files(request.output_dir)?;

        if !output.status.success() {
            // yt-dlp exits non-zero when a single language fails (HTTP 429 and
            // friends) even though the others were written.
            if files.is_empty() {
                return Err(ToolError::Failed {
                    label: "captions",
                    status: output.status,
                    stderr: output.stderr.trim().to_owned(),
                });
            }
            warn!(
                status = %output.status,
                written = files.len(),
                "caption download reported a failure but produced files"
            );
        }

        debug!(written = files.len(), "caption download finished");
        Ok(files)
    }
}

fn list_caption_files(dir: &Path) -> Result<Vec<PathBuf>, ToolError> {
    let entries = fs::read_dir(dir).map_err(|source| ToolError::Io {
        context: format!("reading {}", dir.display()),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(CAPTION_EXTENSION))
        })
        .collect();
    files.sort();
    Ok(files)
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `command` to completion or kills it once `timeout` elapses.
///
/// Both pipes are drained on helper threads so a chatty child can never block
/// on a full pipe while we poll for its exit.
pub fn run_with_timeout(
    mut command: Command,
    label: &'static str,
    timeout: Duration,
) -> Result<CommandOutput, ToolError> {
    let program = command.get_program().to_string_lossy().into_owned();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|source| ToolError::Spawn { program, source })?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                let _ = child.kill();
                return Err(ToolError::Io {
                    context: format!("waiting for {label} command"),
                    source,
                });
            }
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            // The drain threads are left detached: a grandchild may still
            // hold the pipes open.
            return Err(ToolError::Timeout {
                label,
                after: timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(CommandOutput {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = reader.read_to_end(&mut buffer);
        buffer
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn install_stub(dir: &Path, body: &str) -> Result<PathBuf> {
        let script_path = dir.join("yt-dlp");
        fs::write(&script_path, format!("#!/usr/bin/env bash\nset -euo pipefail\n{body}"))?;
        let mut perms = fs::metadata(&script_path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms)?;
        Ok(script_path)
    }

    fn tool(program: PathBuf) -> YtDlp {
        YtDlp::new(program, Duration::from_secs(10), Duration::from_secs(10))
    }

    #[test]
    fn title_is_trimmed_stdout() -> Result<()> {
        let dir = tempdir()?;
        let stub = install_stub(dir.path(), "echo '  Sample Title  '\n")?;
        let title = tool(stub).title("abc", None, None)?;
        assert_eq!(title.as_deref(), Some("Sample Title"));
        Ok(())
    }

    #[test]
    fn title_failure_keeps_stderr() -> Result<()> {
        let dir = tempdir()?;
        let stub = install_stub(dir.path(), "echo 'ERROR: private video' >&2\nexit 1\n")?;
        let err = tool(stub).title("abc", None, None).unwrap_err();
        assert!(matches!(err, ToolError::Failed { label: "title", .. }));
        assert!(err.to_string().contains("private video"));
        Ok(())
    }

    #[test]
    fn download_passes_options_and_lists_vtt_files() -> Result<()> {
        let dir = tempdir()?;
        let out = dir.path().join("out");
        fs::create_dir_all(&out)?;
        let args_file = dir.path().join("args.txt");
        let body = format!(
            r#"echo "$@" > '{args}'
prev=""
output=""
for arg in "$@"; do
    if [[ "$prev" == "--output" ]]; then
        output="$arg"
    fi
    prev="$arg"
done
target="$(dirname "$output")"
echo WEBVTT > "$target/abc.en.vtt"
echo WEBVTT > "$target/abc.en-GB.vtt"
echo '{{}}' > "$target/abc.info.json"
"#,
            args = args_file.display()
        );
        let stub = install_stub(dir.path(), &body)?;
        let cookies = dir.path().join("cookies.txt");
        let request = CaptionDownload {
            video_id: "abc",
            languages: &["en-GB", "en-US", "en"],
            manual: true,
            auto: true,
            output_dir: &out,
            proxy: Some("http://proxy:8080"),
            cookies: Some(&cookies),
        };
        let files = tool(stub).download_captions(&request)?;
        assert_eq!(files, vec![out.join("abc.en-GB.vtt"), out.join("abc.en.vtt")]);

        let args = fs::read_to_string(&args_file)?;
        assert!(args.contains("--write-sub --write-auto-sub"));
        assert!(args.contains("--sub-langs en-GB,en-US,en"));
        assert!(args.contains("--sub-format vtt"));
        assert!(args.contains("--proxy http://proxy:8080"));
        assert!(args.contains("--cookies"));
        assert!(args.ends_with("https://www.youtube.com/watch?v=abc\n"));
        Ok(())
    }

    #[test]
    fn download_failure_without_files_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let out = dir.path().join("out");
        fs::create_dir_all(&out)?;
        let stub = install_stub(dir.path(), "echo 'HTTP Error 429' >&2\nexit 1\n")?;
        let request = CaptionDownload {
            video_id: "abc",
            languages: &["en"],
            manual: true,
            auto: false,
            output_dir: &out,
            proxy: None,
            cookies: None,
        };
        let err = tool(stub).download_captions(&request).unwrap_err();
        assert!(err.to_string().contains("429"));
        Ok(())
    }

    #[test]
    fn slow_command_is_killed_at_the_bound() -> Result<()> {
        let dir = tempdir()?;
        let stub = install_stub(dir.path(), "exec sleep 5\n")?;
        let tool = YtDlp::new(stub, Duration::from_millis(200), Duration::from_millis(200));
        let started = Instant::now();
        let err = tool.title("abc", None, None).unwrap_err();
        assert!(matches!(err, ToolError::Timeout { label: "title", .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
        Ok(())
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let tool = tool(PathBuf::from("/nonexistent/yt-dlp"));
        let err = tool.title("abc", None, None).unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }
}
