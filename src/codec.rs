//! Inbound framing
//!
//! Clients send their candidate name without a terminator, so until a name
//! is accepted each read is taken as it arrives (a `\n` still ends a name
//! early). After the handshake the stream is split strictly on `\n`.
//!
//! Oversized names and lines are discarded here rather than surfaced as
//! errors: `FramedRead` ends the stream after any decoder error.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::warn;

/// Decoder for the client → server byte stream
#[derive(Debug)]
pub struct ChatCodec {
    lines: LinesCodec,
    max_length: usize,
    handshaking: bool,
}

impl ChatCodec {
    /// Start in handshake mode; `max_length` bounds names and lines alike
    pub fn new(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
            max_length,
            handshaking: true,
        }
    }

    /// Switch to strict line framing once a name has been accepted
    pub fn finish_handshake(&mut self) {
        self.handshaking = false;
    }

    pub fn is_handshaking(&self) -> bool {
        self.handshaking
    }

    /// Take whatever is buffered as one candidate name
    fn decode_name(&mut self, src: &mut BytesMut) -> Result<Option<String>, LinesCodecError> {
        if src.is_empty() {
            return Ok(None);
        }

        let chunk = src.split();
        if chunk.len() > self.max_length {
            warn!("Discarded a {}-byte name", chunk.len());
            return Ok(None);
        }
        let name = std::str::from_utf8(&chunk)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Some(name.trim_end_matches('\r').to_string()))
    }
}

impl Decoder for ChatCodec {
    type Item = String;
    type Error = LinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.handshaking && !src.contains(&b'\n') {
            return self.decode_name(src);
        }
        loop {
            match self.lines.decode(src) {
                // LinesCodec skips to the next newline on the following call
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!("Discarded a line over {} bytes", self.max_length);
                }
                other => return other,
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.handshaking && !src.contains(&b'\n') {
            return self.decode_name(src);
        }
        loop {
            match self.lines.decode_eof(src) {
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!("Discarded a line over {} bytes", self.max_length);
                }
                other => return other,
            }
        }
    }
}
