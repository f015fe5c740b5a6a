//! Text-layer extraction over the poppler command-line tools.
//!
//! `pdfinfo` answers page counts; `pdftotext` extracts one page (or the
//! whole document) with layout preserved. Both run under their own
//! sub-deadline with a hard cap on captured stdout so a hostile PDF cannot
//! exhaust memory, and stderr is captured in full for error classification.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::warn;

const MAX_PAGE_COUNT: usize = 50_000;
/// 10 MiB per page, 50 MiB whole-document, each plus a one-byte sentinel so
/// hitting the cap is distinguishable from landing exactly on it.
const MAX_PER_PAGE_BYTES: u64 = 10 << 20;
const MAX_ALL_BYTES: u64 = 50 << 20;
const STDERR_LOG_LIMIT: usize = 500;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF is password protected")]
    PasswordProtected,

    #[error("PDF appears to be damaged or invalid")]
    Damaged,

    #[error("unreasonable page count: {0}")]
    UnreasonablePageCount(usize),

    #[error("invalid page number: {0} (must be >= 1)")]
    InvalidPage(usize),

    #[error("{tool} timed out")]
    Timeout { tool: &'static str },

    #[error("extracted text exceeds the output limit")]
    OutputExceedsLimit,

    #[error("{tool} failed (bad invocation)")]
    BadInvocation { tool: &'static str },

    #[error("{tool} failed: {message}")]
    Tool { tool: &'static str, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Timeouts for the external tools, taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct PopplerConfig {
    pub pdfinfo_timeout: Duration,
    pub pdftotext_timeout: Duration,
    pub pdftotext_all_timeout: Duration,
}

impl Default for PopplerConfig {
    fn default() -> Self {
        Self {
            pdfinfo_timeout: Duration::from_secs(3),
            pdftotext_timeout: Duration::from_secs(10),
            pdftotext_all_timeout: Duration::from_secs(30),
        }
    }
}

/// Abstraction over the page-level tools so the hybrid engine can be
/// exercised without poppler installed.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn page_count(&self, path: &Path) -> Result<usize, PdfError>;
    async fn page_text(&self, path: &Path, page: usize) -> Result<String, PdfError>;
}

/// The production [`PageSource`] backed by pdfinfo/pdftotext.
#[derive(Debug, Clone)]
pub struct PopplerSource {
    cfg: PopplerConfig,
}

impl PopplerSource {
    pub fn new(cfg: PopplerConfig) -> Self {
        Self { cfg }
    }

    /// Extract the whole document in one pdftotext run.
    pub async fn all_pages_text(&self, path: &Path) -> Result<String, PdfError> {
        let mut cmd = Command::new("pdftotext");
        cmd.args(["-layout", "-nopgbrk", "-enc", "UTF-8"])
            .arg(path)
            .arg("-");

        let out = run_capture_limited(
            "pdftotext",
            cmd,
            MAX_ALL_BYTES,
            self.cfg.pdftotext_all_timeout,
        )
        .await?;
        classify_pdftotext(out, 0)
    }
}

#[async_trait]
impl PageSource for PopplerSource {
    async fn page_count(&self, path: &Path) -> Result<usize, PdfError> {
        let mut cmd = Command::new("pdfinfo");
        cmd.arg(path);

        let out =
            run_capture_limited("pdfinfo", cmd, MAX_ALL_BYTES, self.cfg.pdfinfo_timeout).await?;
        if !out.success {
            return Err(classify_tool_stderr("pdfinfo", &out.stderr, 0));
        }
        parse_page_count(&out.stdout)
    }

    async fn page_text(&self, path: &Path, page: usize) -> Result<String, PdfError> {
        if page < 1 {
            return Err(PdfError::InvalidPage(page));
        }
        let page_str = page.to_string();
        let mut cmd = Command::new("pdftotext");
        cmd.args(["-f", &page_str, "-l", &page_str])
            .args(["-layout", "-nopgbrk", "-enc", "UTF-8"])
            .arg(path)
            .arg("-");

        let out = run_capture_limited(
            "pdftotext",
            cmd,
            MAX_PER_PAGE_BYTES,
            self.cfg.pdftotext_timeout,
        )
        .await?;
        classify_pdftotext(out, page)
    }
}

struct Captured {
    stdout: String,
    stderr: String,
    success: bool,
    hit_cap: bool,
}

/// Run a tool, capturing stdout up to `max_bytes + 1` and stderr in full.
/// The child is killed when the cap is breached or the deadline fires.
async fn run_capture_limited(
    tool: &'static str,
    mut cmd: Command,
    max_bytes: u64,
    timeout: Duration,
) -> Result<Captured, PdfError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let mut stdout = child.stdout.take().expect("stdout piped");
    let mut stderr = child.stderr.take().expect("stderr piped");

    // Drain stderr concurrently so a chatty tool cannot deadlock on a full
    // pipe while we read stdout.
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        buf
    });

    let started = tokio::time::Instant::now();
    let capped = max_bytes + 1;
    let read = tokio::time::timeout(timeout, async {
        let mut out = Vec::new();
        let mut limited = (&mut stdout).take(capped);
        limited.read_to_end(&mut out).await.map(|_| out)
    })
    .await;

    let out_bytes = match read {
        Err(_elapsed) => {
            let _ = child.kill().await;
            let _ = stderr_task.await;
            return Err(PdfError::Timeout { tool });
        }
        Ok(Err(e)) => {
            let _ = child.kill().await;
            let _ = stderr_task.await;
            return Err(PdfError::Io(e));
        }
        Ok(Ok(bytes)) => bytes,
    };

    if out_bytes.len() as u64 >= capped {
        let _ = child.kill().await;
        let stderr_bytes = stderr_task.await.unwrap_or_default();
        return Ok(Captured {
            stdout: String::new(),
            stderr: String::from_utf8_lossy(&stderr_bytes).trim().to_string(),
            success: false,
            hit_cap: true,
        });
    }

    let remaining = timeout.saturating_sub(started.elapsed());
    let status = match tokio::time::timeout(remaining, child.wait()).await {
        Err(_elapsed) => {
            let _ = child.kill().await;
            let _ = stderr_task.await;
            return Err(PdfError::Timeout { tool });
        }
        Ok(status) => status?,
    };
    let stderr_bytes = stderr_task.await.unwrap_or_default();

    Ok(Captured {
        stdout: String::from_utf8_lossy(&out_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).trim().to_string(),
        success: status.success(),
        hit_cap: false,
    })
}

fn classify_pdftotext(out: Captured, page: usize) -> Result<String, PdfError> {
    if out.hit_cap {
        return Err(PdfError::OutputExceedsLimit);
    }
    if !out.success {
        return Err(classify_tool_stderr("pdftotext", &out.stderr, page));
    }
    Ok(out.stdout)
}

static PAGE_COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Pages:\s+(\d+)\s*$").unwrap());

fn parse_page_count(pdfinfo_out: &str) -> Result<usize, PdfError> {
    if let Some(caps) = PAGE_COUNT_RE.captures(pdfinfo_out) {
        let n: usize = caps[1]
            .parse()
            .map_err(|_| tool_error("pdfinfo", "invalid page count"))?;
        return validate_page_count(n);
    }

    // Secondary strategy: case-insensitive line scan, for formatting
    // variations across poppler builds.
    for line in pdfinfo_out.lines() {
        let line = line.trim();
        if line.to_lowercase().starts_with("pages:") {
            let rest = line["pages:".len()..].trim();
            let first = rest.split_whitespace().next().unwrap_or_default();
            let n: usize = first
                .parse()
                .map_err(|_| tool_error("pdfinfo", "invalid page count"))?;
            return validate_page_count(n);
        }
    }

    Err(tool_error("pdfinfo", "pages field not found in output"))
}

fn validate_page_count(count: usize) -> Result<usize, PdfError> {
    if count == 0 {
        return Err(PdfError::Damaged);
    }
    if count > MAX_PAGE_COUNT {
        return Err(PdfError::UnreasonablePageCount(count));
    }
    Ok(count)
}

fn tool_error(tool: &'static str, message: &str) -> PdfError {
    PdfError::Tool {
        tool,
        message: message.to_string(),
    }
}

/// Poppler prints its help text (which mentions passwords and syntax) on bad
/// invocations; recognize it so keywords inside the help dump don't get
/// classified as document errors.
fn is_help_or_usage_output(stderr: &str) -> bool {
    stderr.contains("version ") && stderr.contains("Usage:")
}

fn classify_tool_stderr(tool: &'static str, stderr: &str, page: usize) -> PdfError {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        return tool_error(tool, "exited with failure");
    }

    log_tool_stderr(tool, stderr, page);

    if is_help_or_usage_output(stderr) {
        return PdfError::BadInvocation { tool };
    }
    if stderr.contains("Incorrect password") {
        return PdfError::PasswordProtected;
    }
    if ["PDF file is damaged", "Syntax Error", "Couldn't find trailer dictionary", "May not be a PDF file"]
        .iter()
        .any(|needle| stderr.contains(needle))
    {
        return PdfError::Damaged;
    }

    let mut message = stderr.to_string();
    if message.len() > STDERR_LOG_LIMIT {
        message.truncate(STDERR_LOG_LIMIT);
        message.push_str("...");
    }
    PdfError::Tool { tool, message }
}

fn log_tool_stderr(tool: &str, stderr: &str, page: usize) {
    let mut msg = stderr.to_string();
    if msg.len() > STDERR_LOG_LIMIT {
        msg.truncate(STDERR_LOG_LIMIT);
        msg.push_str("...");
    }
    if page > 0 {
        warn!(tool, page, stderr = %msg, "external tool error");
    } else {
        warn!(tool, stderr = %msg, "external tool error");
    }
}
