//! `X-Content-Range` header grammar: `bytes <start>-<end>/<total>`.

use lanbeam_core::{Error, Result};

/// One contiguous byte range of a chunked upload, end-inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    pub fn new(start: u64, end: u64, total: u64) -> Result<Self> {
        if start > end || end >= total {
            return Err(Error::Codec(format!(
                "invalid content range {start}-{end}/{total}"
            )));
        }
        Ok(Self { start, end, total })
    }

    /// Parse a header value. Requires `0 <= start <= end < total`.
    pub fn parse(value: &str) -> Result<Self> {
        let rest = value
            .strip_prefix("bytes ")
            .ok_or_else(|| Error::Codec(format!("bad content range: {value}")))?;
        let (span, total) = rest
            .split_once('/')
            .ok_or_else(|| Error::Codec(format!("bad content range: {value}")))?;
        let (start, end) = span
            .split_once('-')
            .ok_or_else(|| Error::Codec(format!("bad content range: {value}")))?;

        let parse = |s: &str| {
            s.parse::<u64>()
                .map_err(|_| Error::Codec(format!("bad content range: {value}")))
        };
        Self::new(parse(start)?, parse(end)?, parse(total)?)
    }

    /// Render the header value.
    pub fn header_value(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }

    /// Number of bytes this range covers.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether this chunk's completion finishes the file.
    pub fn is_terminal(&self) -> bool {
        self.end + 1 >= self.total
    }
}
