//! control.rs — length-prefixed control-plane frames
//!
//! The control channel carries JSON payloads wrapped as
//! `STX TYPE ':' LEN LF PAYLOAD ETX` (STX = 0x02, ETX = 0x03), where LEN is
//! the decimal payload byte count. The decoder is incremental: feed it
//! arbitrary chunks, pull complete frames out, and it resynchronizes past
//! garbage on its own.

use bytes::{Buf, BytesMut};

use crate::wire::FrameError;

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;

/// Longest accepted `TYPE:LEN` header, including STX and LF.
const MAX_HEADER_LEN: usize = 32;
/// Control payloads are small JSON documents.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024;

/// Control frame types the pipeline host emits or consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrameType {
    Fw,
    Logs,
    StreamStart,
    StreamStop,
    Conn,
    Cal,
    Mode,
    Ctx,
    Mark,
}

impl ControlFrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fw => "FW",
            Self::Logs => "LOGS",
            Self::StreamStart => "STREAM_START",
            Self::StreamStop => "STREAM_STOP",
            Self::Conn => "CONN",
            Self::Cal => "CAL",
            Self::Mode => "MODE",
            Self::Ctx => "CTX",
            Self::Mark => "MARK",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "FW" => Some(Self::Fw),
            "LOGS" => Some(Self::Logs),
            "STREAM_START" => Some(Self::StreamStart),
            "STREAM_STOP" => Some(Self::StreamStop),
            "CONN" => Some(Self::Conn),
            "CAL" => Some(Self::Cal),
            "MODE" => Some(Self::Mode),
            "CTX" => Some(Self::Ctx),
            "MARK" => Some(Self::Mark),
            _ => None,
        }
    }
}

/// One decoded control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    pub frame_type: ControlFrameType,
    pub payload: Vec<u8>,
}

impl ControlFrame {
    pub fn new(frame_type: ControlFrameType, payload: impl Into<Vec<u8>>) -> Self {
        Self { frame_type, payload: payload.into() }
    }

    /// Parse the payload as JSON (control payloads are JSON documents).
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn encode(&self) -> Vec<u8> {
        let header = format!("{}:{}\n", self.frame_type.as_str(), self.payload.len());
        let mut out = Vec::with_capacity(2 + header.len() + self.payload.len());
        out.push(STX);
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.payload);
        out.push(ETX);
        out
    }
}

/// Incremental decoder over a byte stream.
#[derive(Debug, Default)]
pub struct ControlFrameDecoder {
    buf: BytesMut,
}

impl ControlFrameDecoder {
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    /// Append received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete frame, if any.
    ///
    /// `Ok(None)` means more bytes are needed. On a malformed frame the bad
    /// prefix is discarded before returning the error, so the next call
    /// resumes at the following STX.
    pub fn next_frame(&mut self) -> Result<Option<ControlFrame>, FrameError> {
        // Drop leading garbage up to the first STX.
        if let Some(start) = self.buf.iter().position(|&b| b == STX) {
            self.buf.advance(start);
        } else {
            self.buf.clear();
            return Ok(None);
        }

        // Header: STX TYPE ':' LEN LF
        let lf = match self.buf.iter().take(MAX_HEADER_LEN).position(|&b| b == b'\n') {
            Some(i) => i,
            None if self.buf.len() < MAX_HEADER_LEN => return Ok(None),
            None => {
                self.buf.advance(1);
                return Err(FrameError::BadHeader);
            }
        };

        let header = match std::str::from_utf8(&self.buf[1..lf]) {
            Ok(h) => h,
            Err(_) => {
                self.buf.advance(1);
                return Err(FrameError::BadHeader);
            }
        };
        let (type_str, len_str) = match header.split_once(':') {
            Some(parts) => parts,
            None => {
                self.buf.advance(1);
                return Err(FrameError::BadHeader);
            }
        };
        let frame_type = match ControlFrameType::from_str(type_str) {
            Some(t) => t,
            None => {
                let t = type_str.to_string();
                self.buf.advance(1);
                return Err(FrameError::UnknownFrameType(t));
            }
        };
        let len: usize = match len_str.parse() {
            Ok(n) => n,
            Err(_) => {
                self.buf.advance(1);
                return Err(FrameError::BadHeader);
            }
        };
        if len > MAX_PAYLOAD_LEN {
            self.buf.advance(1);
            return Err(FrameError::PayloadTooLarge { len, limit: MAX_PAYLOAD_LEN });
        }

        // Wait for payload + ETX.
        let frame_end = lf + 1 + len + 1;
        if self.buf.len() < frame_end {
            return Ok(None);
        }
        if self.buf[frame_end - 1] != ETX {
            self.buf.advance(1);
            return Err(FrameError::MissingEtx);
        }

        let payload = self.buf[lf + 1..lf + 1 + len].to_vec();
        self.buf.advance(frame_end);
        Ok(Some(ControlFrame { frame_type, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_parses_as_json() {
        let frame = ControlFrame::new(ControlFrameType::Cal, b"{\"save\":true}".to_vec());
        assert_eq!(frame.json().unwrap()["save"], true);
    }

    #[test]
    fn encode_layout() {
        let frame = ControlFrame::new(ControlFrameType::Mark, b"{\"label\":\"fist\"}".to_vec());
        let bytes = frame.encode();
        assert_eq!(bytes[0], STX);
        assert_eq!(*bytes.last().unwrap(), ETX);
        assert!(bytes.windows(5).any(|w| w == b"MARK:"));
    }

    #[test]
    fn decodes_across_partial_reads() {
        let frame = ControlFrame::new(ControlFrameType::StreamStart, b"{}".to_vec());
        let bytes = frame.encode();

        let mut dec = ControlFrameDecoder::new();
        dec.extend(&bytes[..5]);
        assert_eq!(dec.next_frame().unwrap(), None);
        dec.extend(&bytes[5..]);
        assert_eq!(dec.next_frame().unwrap(), Some(frame));
        assert_eq!(dec.next_frame().unwrap(), None);
    }

    #[test]
    fn resynchronizes_past_garbage() {
        let frame = ControlFrame::new(ControlFrameType::Cal, b"{\"save\":true}".to_vec());
        let mut dec = ControlFrameDecoder::new();
        dec.extend(b"\xff\xfe noise");
        dec.extend(&frame.encode());
        assert_eq!(dec.next_frame().unwrap(), Some(frame));
    }

    #[test]
    fn rejects_unknown_type_then_recovers() {
        let mut dec = ControlFrameDecoder::new();
        dec.extend(b"\x02BOGUS:2\nhi\x03");
        let good = ControlFrame::new(ControlFrameType::Conn, b"{}".to_vec());
        dec.extend(&good.encode());

        assert!(matches!(
            dec.next_frame(),
            Err(FrameError::UnknownFrameType(t)) if t == "BOGUS"
        ));
        assert_eq!(dec.next_frame().unwrap(), Some(good));
    }

    #[test]
    fn two_frames_in_one_chunk() {
        let a = ControlFrame::new(ControlFrameType::Mode, b"{\"mode\":2}".to_vec());
        let b = ControlFrame::new(ControlFrameType::Ctx, b"{\"ctx\":1}".to_vec());
        let mut dec = ControlFrameDecoder::new();
        let mut stream = a.encode();
        stream.extend_from_slice(&b.encode());
        dec.extend(&stream);
        assert_eq!(dec.next_frame().unwrap(), Some(a));
        assert_eq!(dec.next_frame().unwrap(), Some(b));
    }
}
