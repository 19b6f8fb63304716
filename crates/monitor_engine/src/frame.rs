use bytes::BytesMut;
use thiserror::Error;

use monitor_core::StreamEvent;

/// Prefix marking a payload-carrying stream line.
const FRAME_PREFIX: &[u8] = b"data:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame payload is not utf-8")]
    NotUtf8,
    #[error("malformed frame payload `{line}`: {reason}")]
    BadPayload { line: String, reason: String },
    #[error("progress counters out of range (current={current}, total={total})")]
    CountsOutOfRange { current: u64, total: u64 },
}

/// Incremental splitter/decoder for the batch-parse stream.
///
/// Transport chunk boundaries fall anywhere, including inside a frame;
/// bytes stay buffered until a full newline-terminated line is available.
/// Blank separator lines and lines without the `data:` prefix carry no
/// frame and are skipped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorbs one transport chunk and returns every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent, FrameError>> {
        self.buffer.extend_from_slice(chunk);
        let mut decoded = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&byte| byte == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            if let Some(frame) = decode_line(&line[..line.len() - 1]) {
                decoded.push(frame);
            }
        }
        decoded
    }

    /// Flushes a final unterminated line at end of stream.
    pub fn finish(&mut self) -> Option<Result<StreamEvent, FrameError>> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = self.buffer.split_to(self.buffer.len());
        decode_line(&line)
    }

    /// Bytes buffered waiting for their newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Decodes one line without its newline. `None` means the line carries no
/// frame at all; a `Some(Err(_))` is reported to diagnostics and skipped.
fn decode_line(line: &[u8]) -> Option<Result<StreamEvent, FrameError>> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() {
        return None;
    }
    let payload = line.strip_prefix(FRAME_PREFIX)?;
    let payload = match std::str::from_utf8(payload) {
        Ok(payload) => payload.trim(),
        Err(_) => return Some(Err(FrameError::NotUtf8)),
    };
    if payload.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => Some(validate(event)),
        Err(err) => Some(Err(FrameError::BadPayload {
            line: truncate_for_log(payload),
            reason: err.to_string(),
        })),
    }
}

fn validate(event: StreamEvent) -> Result<StreamEvent, FrameError> {
    if let StreamEvent::Progress { current, total, .. } = event {
        if current > total {
            return Err(FrameError::CountsOutOfRange { current, total });
        }
    }
    Ok(event)
}

/// Malformed payloads end up in the warn log; keep entries bounded.
fn truncate_for_log(payload: &str) -> String {
    const MAX: usize = 160;
    if payload.len() <= MAX {
        return payload.to_owned();
    }
    let mut cut = MAX;
    while !payload.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &payload[..cut])
}
