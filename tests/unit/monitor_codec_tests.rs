//! Unit tests for the monitor line codec.
//!
//! Covers:
//! - complete lines are returned without the newline
//! - CRLF line endings from the serial console are normalised
//! - partial lines are buffered until the newline arrives
//! - invalid UTF-8 is replaced rather than rejected
//! - an overlong line is reported once and decoding resumes at the next line
//! - `decode_eof` flushes an unterminated final line

use bytes::BytesMut;
use futures_util::StreamExt;
use tokio_util::codec::{Decoder, FramedRead};

use boxwatch::capture::codec::{MonitorLine, MonitorLineCodec, MAX_LINE_BYTES};

fn line(text: &str) -> Option<MonitorLine> {
    Some(MonitorLine::Line(text.to_owned()))
}

#[test]
fn default_limit_is_one_mebibyte() {
    assert_eq!(MonitorLineCodec::new().max_length(), MAX_LINE_BYTES);
    assert_eq!(MAX_LINE_BYTES, 1_048_576);
}

#[test]
fn complete_line_is_returned_without_newline() {
    let mut codec = MonitorLineCodec::new();
    let mut buf = BytesMut::from("I (312) cam: frame ready\n");

    let decoded = codec.decode(&mut buf).expect("decode succeeds");

    assert_eq!(decoded, line("I (312) cam: frame ready"));
    assert!(buf.is_empty(), "consumed bytes must be removed from the buffer");
}

#[test]
fn crlf_endings_are_stripped() {
    let mut codec = MonitorLineCodec::new();
    let mut buf = BytesMut::from("-----BEGIN IMAGE-----\r\nQUJD\r\n");

    let first = codec.decode(&mut buf).expect("first decode");
    let second = codec.decode(&mut buf).expect("second decode");

    assert_eq!(first, line("-----BEGIN IMAGE-----"));
    assert_eq!(second, line("QUJD"));
}

#[test]
fn partial_line_is_buffered_until_newline() {
    let mut codec = MonitorLineCodec::new();
    let mut buf = BytesMut::from("QUJD");

    assert!(codec.decode(&mut buf).expect("decode").is_none());

    buf.extend_from_slice(b"REVG\n");
    let decoded = codec.decode(&mut buf).expect("decode");
    assert_eq!(decoded, line("QUJDREVG"));
}

#[test]
fn invalid_utf8_is_replaced_not_rejected() {
    let mut codec = MonitorLineCodec::new();
    let mut buf = BytesMut::from(&b"noise \xff\xfe end\n"[..]);

    let Some(MonitorLine::Line(text)) = codec.decode(&mut buf).expect("lossy decode never fails")
    else {
        panic!("a line is produced");
    };

    assert!(text.starts_with("noise "));
    assert!(text.ends_with(" end"));
    assert!(text.contains('\u{FFFD}'), "invalid bytes become U+FFFD: {text:?}");
}

#[test]
fn overlong_line_is_reported_once_then_recovers() {
    let mut codec = MonitorLineCodec::with_max_length(4);
    let mut buf = BytesMut::from("abcdefgh\nok\n");

    let first = codec.decode(&mut buf).expect("overlong is not an error");
    assert_eq!(first, Some(MonitorLine::Overlong));

    let second = codec.decode(&mut buf).expect("decoding resumes");
    assert_eq!(second, line("ok"));
}

#[test]
fn line_at_exact_limit_is_accepted() {
    let mut codec = MonitorLineCodec::with_max_length(4);
    let mut buf = BytesMut::from("abcd\n");

    assert_eq!(codec.decode(&mut buf).expect("decode"), line("abcd"));
}

#[tokio::test]
async fn framed_reader_keeps_streaming_after_overlong_line() {
    let input: &[u8] = b"0123456789abcdef\nnext\n";
    let frames: Vec<_> = FramedRead::new(input, MonitorLineCodec::with_max_length(8))
        .collect()
        .await;

    let frames: Vec<MonitorLine> = frames
        .into_iter()
        .map(|frame| frame.expect("no decoder error"))
        .collect();
    assert_eq!(
        frames,
        [MonitorLine::Overlong, MonitorLine::Line("next".into())]
    );
}

#[test]
fn empty_lines_are_returned_as_empty_strings() {
    let mut codec = MonitorLineCodec::new();
    let mut buf = BytesMut::from("\n\nx\n");

    assert_eq!(codec.decode(&mut buf).expect("decode"), line(""));
    assert_eq!(codec.decode(&mut buf).expect("decode"), line(""));
    assert_eq!(codec.decode(&mut buf).expect("decode"), line("x"));
}

#[test]
fn decode_eof_flushes_unterminated_tail() {
    let mut codec = MonitorLineCodec::new();
    let mut buf = BytesMut::from("-----END IMAGE-----");

    assert!(codec.decode(&mut buf).expect("decode").is_none());
    let tail = codec.decode_eof(&mut buf).expect("decode_eof");

    assert_eq!(tail, line("-----END IMAGE-----"));
    assert!(codec.decode_eof(&mut buf).expect("decode_eof").is_none());
}
