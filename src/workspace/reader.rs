//! Line-buffered child output scanning.
//!
//! A [`LineScanner`] owns a background task that reads a child's output
//! stream line by line, appends every line to a shared transcript buffer,
//! and forwards it on a channel. `wait_for` turns "watch the output for a
//! pattern, give up after a deadline" into a single async operation, so
//! the dev-server ready detection is testable against any `AsyncRead`.
//!
//! The transcript keeps filling after the scanner is dropped; a dev server
//! that becomes ready late still has its output retained for inspection.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

/// A matched line, with the first capture group when the pattern has one.
#[derive(Debug, Clone)]
pub struct ScanMatch {
    pub line: String,
    pub capture: Option<String>,
}

pub struct LineScanner {
    rx: mpsc::UnboundedReceiver<String>,
}

impl LineScanner {
    /// Spawn a reader task over `reader`. Every line is appended to
    /// `transcript` (with a trailing newline) and forwarded to the scanner.
    /// The transcript keeps only the most recent `max_bytes` bytes; a
    /// chatty long-running server cannot grow it without bound.
    pub fn spawn<R>(reader: R, transcript: Arc<StdMutex<String>>, max_bytes: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Ok(mut buf) = transcript.lock() {
                    buf.push_str(&line);
                    buf.push('\n');
                    if buf.len() > max_bytes {
                        let mut cut = buf.len() - max_bytes;
                        while cut < buf.len() && !buf.is_char_boundary(cut) {
                            cut += 1;
                        }
                        buf.drain(..cut);
                    }
                }
                // The receiver may be gone after a ready-wait timeout;
                // keep draining so the transcript stays complete.
                let _ = tx.send(line);
            }
        });
        Self { rx }
    }

    /// Wait until a line matches `pattern` or `limit` elapses.
    ///
    /// Returns `None` on timeout or when the stream closes without a
    /// match.
    pub async fn wait_for(&mut self, pattern: &Regex, limit: Duration) -> Option<ScanMatch> {
        let deadline = Instant::now() + limit;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match timeout(remaining, self.rx.recv()).await {
                Ok(Some(line)) => {
                    if let Some(caps) = pattern.captures(&line) {
                        let capture = caps.get(1).map(|m| m.as_str().to_string());
                        return Some(ScanMatch { line, capture });
                    }
                }
                Ok(None) => return None,
                Err(_) => return None,
            }
        }
    }
}
