//! Unit tests for `AppError` display format and phase mapping.

use boxwatch::AppError;

#[test]
fn display_uses_kind_prefix() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::CaptureTimeout("15s".into()), "capture timeout: 15s"),
        (AppError::CaptureProcess("spawn".into()), "capture process: spawn"),
        (AppError::NoPayload("none".into()), "no payload: none"),
        (AppError::Decode("b64".into()), "decode: b64"),
        (AppError::Analysis("http".into()), "analysis: http"),
        (AppError::StoreCorrupt("db".into()), "store corrupt: db"),
        (AppError::Store("disk".into()), "store: disk"),
        (AppError::Notification("403".into()), "notification: 403"),
        (AppError::Io("eof".into()), "io: eof"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn message_has_no_trailing_period() {
    let err = AppError::CaptureTimeout("monitor produced no complete capture".into());
    assert!(!err.to_string().ends_with('.'));
}

#[test]
fn phase_names_follow_iteration_order() {
    assert_eq!(AppError::CaptureTimeout(String::new()).phase(), "capturing");
    assert_eq!(AppError::CaptureProcess(String::new()).phase(), "capturing");
    assert_eq!(AppError::NoPayload(String::new()).phase(), "capturing");
    assert_eq!(AppError::Decode(String::new()).phase(), "decoding");
    assert_eq!(AppError::Analysis(String::new()).phase(), "analyzing");
    assert_eq!(AppError::Store(String::new()).phase(), "persisting");
    assert_eq!(AppError::StoreCorrupt(String::new()).phase(), "persisting");
    assert_eq!(AppError::Notification(String::new()).phase(), "notifying");
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(_)));
    assert_eq!(err.to_string(), "io: pipe closed");
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Store("x".into()));
}
