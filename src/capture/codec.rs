//! Line codec for device monitor output.
//!
//! The monitor interleaves UART log lines, ANSI colour codes, and the
//! occasional corrupted byte from a noisy serial link. Lines are therefore
//! decoded lossily rather than rejected, and a per-line size cap keeps an
//! unterminated burst of garbage from growing the buffer without bound.
//!
//! Framing is delegated to [`AnyDelimiterCodec`] with `\n` as the only
//! delimiter. Use [`MonitorLineCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`].

use bytes::BytesMut;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};

use crate::{AppError, Result};

/// Default maximum line length accepted from the monitor: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One decoded unit of monitor output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorLine {
    /// A complete line, without its terminator.
    Line(String),
    /// A line that exceeded the limit. Its bytes were dropped up to the
    /// next newline.
    Overlong,
}

/// `\n`-delimited, lossy UTF-8 line decoder with a maximum line length.
///
/// An overlong line is reported as [`MonitorLine::Overlong`] rather than as
/// an error, so a [`FramedRead`](tokio_util::codec::FramedRead) keeps
/// producing lines after it. Trailing `\r` is stripped so CRLF output from
/// the serial console decodes cleanly.
#[derive(Debug)]
pub struct MonitorLineCodec(AnyDelimiterCodec);

impl MonitorLineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self(AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            Vec::new(),
            max_length,
        ))
    }

    /// Configured line limit.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.0.max_length()
    }
}

impl Default for MonitorLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MonitorLineCodec {
    type Item = MonitorLine;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        map_frame(self.0.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        map_frame(self.0.decode_eof(src))
    }
}

fn map_frame(
    frame: std::result::Result<Option<bytes::Bytes>, AnyDelimiterCodecError>,
) -> Result<Option<MonitorLine>> {
    match frame {
        Ok(Some(raw)) => Ok(Some(MonitorLine::Line(decode_line(&raw)))),
        Ok(None) => Ok(None),
        Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(MonitorLine::Overlong)),
        Err(AnyDelimiterCodecError::Io(err)) => Err(AppError::from(err)),
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
