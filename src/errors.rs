//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Every variant except `Config` is recoverable at the orchestrator's
/// iteration boundary; none of them is allowed to end the polling loop.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing, validation, or credential lookup failure.
    Config(String),
    /// The monitor process did not produce a complete capture before the deadline.
    CaptureTimeout(String),
    /// The monitor process could not be spawned or its output could not be read.
    CaptureProcess(String),
    /// The monitor output contained no sentinel-framed payload.
    NoPayload(String),
    /// The payload was not valid base64 or not a decodable image.
    Decode(String),
    /// The analysis collaborator failed or returned an unparsable verdict.
    Analysis(String),
    /// The history file exists but does not hold a record sequence.
    StoreCorrupt(String),
    /// The history file could not be written.
    Store(String),
    /// The notification collaborator rejected or failed the post.
    Notification(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Orchestrator phase the error belongs to, used as log context.
    #[must_use]
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::CaptureTimeout(_) | Self::CaptureProcess(_) | Self::NoPayload(_) => "capturing",
            Self::Decode(_) => "decoding",
            Self::Analysis(_) => "analyzing",
            Self::StoreCorrupt(_) | Self::Store(_) => "persisting",
            Self::Notification(_) => "notifying",
            Self::Io(_) => "io",
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::CaptureTimeout(msg) => write!(f, "capture timeout: {msg}"),
            Self::CaptureProcess(msg) => write!(f, "capture process: {msg}"),
            Self::NoPayload(msg) => write!(f, "no payload: {msg}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::Analysis(msg) => write!(f, "analysis: {msg}"),
            Self::StoreCorrupt(msg) => write!(f, "store corrupt: {msg}"),
            Self::Store(msg) => write!(f, "store: {msg}"),
            Self::Notification(msg) => write!(f, "notification: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
