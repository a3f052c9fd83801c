//! Child stderr handling.
//!
//! ffmpeg rewrites its progress line with carriage returns, so records are
//! split on either `\r` or `\n`. Only notable records reach the log.

use std::io;

use tokio::io::{AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::handle::ProcessRole;
use super::messages::PairId;

/// Reads an async stream and yields text records delimited by `\n` or `\r`.
pub struct OutputRecordReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    scratch: [u8; 4096],
}

impl<R> OutputRecordReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
            scratch: [0u8; 4096],
        }
    }

    /// Next non-empty record, or `None` at end of stream.
    pub async fn next_record(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(idx) = self.pending.iter().position(|&b| is_delimiter(b)) {
                let record = take_record(&mut self.pending, idx);
                let skip = self.pending.iter().take_while(|&&b| is_delimiter(b)).count();
                self.pending.drain(..skip);

                if record.is_empty() {
                    continue;
                }
                return Ok(Some(record));
            }

            let n = tokio::io::AsyncReadExt::read(&mut self.reader, &mut self.scratch).await?;
            if n == 0 {
                let len = self.pending.len();
                let record = take_record(&mut self.pending, len);
                return Ok((!record.is_empty()).then_some(record));
            }

            self.pending.extend_from_slice(&self.scratch[..n]);
        }
    }
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'\n' | b'\r')
}

fn take_record(buf: &mut Vec<u8>, end: usize) -> String {
    let bytes: Vec<u8> = buf.drain(..end).collect();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

/// Downloader lines worth logging: errors and warnings.
pub fn source_line_is_notable(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("error") || lower.contains("warning")
}

/// ffmpeg lines worth logging: anything alarming that is not a progress line.
pub fn transform_line_is_notable(line: &str) -> bool {
    if line.starts_with("frame=") {
        return false;
    }
    line.to_ascii_lowercase().contains("error") || line.contains('!')
}

/// Forward notable stderr records of one child into the log.
///
/// Resolves to the number of records read.
pub fn spawn_stderr_monitor<R>(role: ProcessRole, pair: PairId, stderr: R) -> JoinHandle<usize>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = OutputRecordReader::new(stderr);
        let mut records = 0usize;

        loop {
            match reader.next_record().await {
                Ok(Some(line)) => {
                    records += 1;
                    let notable = match role {
                        ProcessRole::Source => source_line_is_notable(&line),
                        ProcessRole::Transform => transform_line_is_notable(&line),
                    };
                    if notable {
                        info!(%pair, %role, "{}", line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(%pair, %role, error = %e, "Error reading stderr");
                    break;
                }
            }
        }

        debug!(%pair, %role, records, "Stderr closed");
        records
    })
}
