//! Splits a byte stream into YAML event documents.
//!
//! Documents start with `---` and may end with `...`. The decoder reads
//! line by line so it never holds more than one document.

use std::time::{Duration, Instant};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::message::RosMessage;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Yaml {
        line: usize,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("payload is not base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub struct Decoder<R> {
    reader: R,
    /// Document text accumulated so far
    doc: String,
    /// Line the current document started on
    doc_line: usize,
    line_no: usize,
    elapsed: Duration,
    decoded: u64,
}

impl<R: AsyncBufRead + Unpin> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Decoder {
            reader,
            doc: String::new(),
            doc_line: 1,
            line_no: 0,
            elapsed: Duration::ZERO,
            decoded: 0,
        }
    }

    /// Next event, or `None` at end of stream.
    pub async fn next_message(&mut self) -> Result<Option<RosMessage>, DecodeError> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return self.finish_doc();
            }
            self.line_no += 1;

            let trimmed = line.trim_end();
            if trimmed == "..." {
                if let Some(msg) = self.finish_doc()? {
                    return Ok(Some(msg));
                }
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix("---") {
                let done = self.finish_doc()?;
                self.doc_line = self.line_no;
                if !rest.trim().is_empty() {
                    self.doc.push_str(rest.trim_start());
                    self.doc.push('\n');
                }
                if done.is_some() {
                    return Ok(done);
                }
                continue;
            }
            if self.doc.is_empty() {
                self.doc_line = self.line_no;
            }
            self.doc.push_str(&line);
        }
    }

    fn finish_doc(&mut self) -> Result<Option<RosMessage>, DecodeError> {
        let text = std::mem::take(&mut self.doc);
        if text.lines().all(|l| {
            let l = l.trim();
            l.is_empty() || l.starts_with('#')
        }) {
            return Ok(None);
        }
        let start = Instant::now();
        let msg = serde_yaml::from_str(&text).map_err(|source| DecodeError::Yaml {
            line: self.doc_line,
            source,
        });
        self.elapsed += start.elapsed();
        let msg = msg?;
        self.decoded += 1;
        Ok(Some(msg))
    }

    /// Time spent parsing documents.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn decoded(&self) -> u64 {
        self.decoded
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
