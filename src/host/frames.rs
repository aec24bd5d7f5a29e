//! Recorded landmark streams.
//!
//! One detector result per line: a JSON array of landmark objects, or
//! `null` (or `[]`) when no body was detected.  Blank lines and lines
//! starting with `#` are skipped.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::coach::landmarks::{LandmarkFrame, LandmarkPoint};

/// Failure reading a landmark stream.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to read landmark stream: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: malformed landmark frame: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One detector result.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameRecord {
    Body(LandmarkFrame),
    NoBody,
}

impl FrameRecord {
    /// Borrow as the session's frame argument.
    pub fn as_frame(&self) -> Option<&[LandmarkPoint]> {
        match self {
            Self::Body(points) if !points.is_empty() => Some(points),
            _ => None,
        }
    }
}

/// Line-oriented reader over a recorded landmark stream.
pub struct FrameSource<R> {
    reader: R,
    buf: String,
    line: usize,
    /// Frames returned so far.
    pub frames_read: u64,
}

impl FrameSource<BufReader<File>> {
    /// Open a stream file.
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let file = File::open(path)?;
        info!("Replaying landmark stream from {}", path.display());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> FrameSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            line: 0,
            frames_read: 0,
        }
    }

    /// Read the next frame.  `Ok(None)` at end of stream.
    pub fn next_frame(&mut self) -> Result<Option<FrameRecord>, FrameError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                debug!("Landmark stream ended after {} frame(s)", self.frames_read);
                return Ok(None);
            }
            self.line += 1;

            let text = self.buf.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            let parsed: Option<LandmarkFrame> =
                serde_json::from_str(text).map_err(|source| FrameError::Parse {
                    line: self.line,
                    source,
                })?;
            self.frames_read += 1;
            return Ok(Some(match parsed {
                Some(points) if !points.is_empty() => FrameRecord::Body(points),
                _ => FrameRecord::NoBody,
            }));
        }
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn source(text: &str) -> FrameSource<Cursor<Vec<u8>>> {
        FrameSource::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_reads_body_and_no_body_lines() {
        let mut frames = source(
            "# recorded\n\
             [{\"x\":0.5,\"y\":0.25,\"visibility\":0.9}]\n\
             \n\
             null\n\
             []\n",
        );

        let first = frames.next_frame().unwrap().unwrap();
        let FrameRecord::Body(points) = &first else {
            panic!("expected a body, got {first:?}");
        };
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].x, 0.5);
        assert_eq!(points[0].visibility, Some(0.9));
        assert!(first.as_frame().is_some());

        assert_eq!(frames.next_frame().unwrap(), Some(FrameRecord::NoBody));
        assert_eq!(frames.next_frame().unwrap(), Some(FrameRecord::NoBody));
        assert_eq!(frames.next_frame().unwrap(), None);
        assert_eq!(frames.frames_read, 3);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let mut frames = source("null\n{not json}\nnull\n");
        assert!(frames.next_frame().unwrap().is_some());
        match frames.next_frame() {
            Err(FrameError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
        // The stream continues after a bad line.
        assert_eq!(frames.next_frame().unwrap(), Some(FrameRecord::NoBody));
    }

    #[test]
    fn test_open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "null").unwrap();
        let mut frames = FrameSource::open(file.path()).unwrap();
        assert_eq!(frames.next_frame().unwrap(), Some(FrameRecord::NoBody));
        assert_eq!(frames.next_frame().unwrap(), None);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FrameSource::open(&dir.path().join("missing.jsonl")),
            Err(FrameError::Io(_))
        ));
    }
}
