//! Hex capture output to ordered text records.
//!
//! The capture file holds one hex-encoded UDP payload per line. Each line is
//! decoded independently; the first malformed line aborts the whole decode.

use std::path::Path;

use hex::FromHexError;
use log::trace;

use super::types::SignalMarkers;
use crate::error_handling::types::DecodeError;

#[derive(Debug, Clone, Default)]
pub struct OutputDecoder {
    /// Decoded lines equal to one of these are the sentinels' own wire echo.
    dropped: Vec<String>,
    markers: Option<SignalMarkers>,
}

impl OutputDecoder {
    /// Decoder that drops the echo of `stop_signal` from the output.
    pub fn new(stop_signal: Option<&str>) -> Self {
        Self {
            dropped: stop_signal.map(str::to_string).into_iter().collect(),
            markers: None,
        }
    }

    /// Wraps the records in the configured markers.
    ///
    /// The start token's echo is dropped too, so a sentinel is never emitted
    /// both as a marker and as a captured record.
    pub fn with_markers(mut self, start_signal: Option<&str>, markers: SignalMarkers) -> Self {
        if let Some(start) = start_signal {
            if !self.dropped.iter().any(|d| d == start) {
                self.dropped.push(start.to_string());
            }
        }
        self.markers = Some(markers);
        self
    }

    pub fn decode_file(&self, path: &Path) -> Result<Vec<String>, DecodeError> {
        let content = std::fs::read_to_string(path).map_err(|e| DecodeError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.decode_str(&content)
    }

    pub fn decode_str(&self, content: &str) -> Result<Vec<String>, DecodeError> {
        let mut records = Vec::new();
        if let Some(line) = self.markers.as_ref().and_then(SignalMarkers::start_line) {
            records.push(line);
        }

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let text = decode_line(line, idx + 1)?;
            if self.dropped.iter().any(|d| *d == text) {
                trace!("dropping sentinel echo on line {}", idx + 1);
                continue;
            }
            records.push(text);
        }

        if let Some(line) = self.markers.as_ref().and_then(SignalMarkers::stop_line) {
            records.push(line);
        }
        Ok(records)
    }
}

/// Decodes one hex line (`line_no` is 1-based, used for error reporting).
pub fn decode_line(line: &str, line_no: usize) -> Result<String, DecodeError> {
    let bytes = hex::decode(line).map_err(|e| match e {
        FromHexError::InvalidHexCharacter { c, index } => DecodeError::InvalidHex {
            line: line_no,
            character: c,
            index,
        },
        FromHexError::OddLength | FromHexError::InvalidStringLength => DecodeError::OddLength {
            line: line_no,
            len: line.len(),
        },
    })?;
    Ok(bytes_to_text(bytes))
}

/// UTF-8 when valid, otherwise one char per byte (Latin-1).
fn bytes_to_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}
