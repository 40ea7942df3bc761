//! Unified error type for framesource.
//!
//! All crates funnel their failures into [`Error`]. Hosts classify a failure
//! with [`Error::kind`] and pick a log level with [`Error::severity`].
//! Non-fatal findings made while opening a track are reported as
//! [`Diagnostic`] values instead of errors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::media::MediaKind;

/// How loudly a host should report a failure or finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The handle could not be created.
    Open,
    /// The presentation index could not be built.
    Index,
    /// A decode failed after the handle was open.
    Decode,
    /// No output format could be negotiated.
    UnsupportedFormat,
}

/// Unified error type covering all failure modes in framesource.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source could not be opened or is not a usable media file.
    #[error("Open error: {0}")]
    Open(String),

    /// An explicit track number exceeds the number of tracks in the file.
    #[error("track {requested} not found (the file has {available} tracks)")]
    TrackNotFound {
        /// The 1-based track number that was requested.
        requested: u32,
        /// Number of tracks the file actually has.
        available: u32,
    },

    /// Automatic track selection found no track of the wanted kind.
    #[error("no {kind} track found")]
    NoTrackOfKind {
        /// The kind that was searched for.
        kind: MediaKind,
    },

    /// An explicitly selected track carries a different kind of media.
    #[error("track {track} is not a {expected} track")]
    TrackTypeMismatch {
        /// The 1-based track number that was requested.
        track: u32,
        /// The kind the caller asked for.
        expected: MediaKind,
    },

    /// No decoder could be opened for the track's codec.
    #[error("Decoder error [{codec}]: {message}")]
    DecoderOpen {
        /// Codec identifier (fourcc or forced codec name).
        codec: String,
        /// Human-readable error description.
        message: String,
    },

    /// The decoder produced no output for any sample of the track.
    #[error("no decodable samples in track {track}")]
    NoDecodableSamples {
        /// The 1-based track number.
        track: u32,
    },

    /// Timeline or presentation index construction failed.
    #[error("Index error: {0}")]
    Index(String),

    /// A decode failed mid-stream.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The requested output format cannot be produced.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The container could not be read.
    #[error("Demux error: {0}")]
    Demux(String),

    /// A configuration value could not be parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Classify this error into the open/index/decode/format taxonomy.
    ///
    /// Container and I/O failures are reported as [`ErrorKind::Open`]; the
    /// engines rewrap them with [`Error::decode`] when they happen mid-stream.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Index(_) => ErrorKind::Index,
            Error::Decode(_) => ErrorKind::Decode,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::Open(_)
            | Error::TrackNotFound { .. }
            | Error::NoTrackOfKind { .. }
            | Error::TrackTypeMismatch { .. }
            | Error::DecoderOpen { .. }
            | Error::NoDecodableSamples { .. }
            | Error::Demux(_)
            | Error::Config(_)
            | Error::Io { .. } => ErrorKind::Open,
        }
    }

    /// Severity hosts should log this error at.
    ///
    /// Decode errors are recovered by the engines, everything else aborts the
    /// operation that raised it.
    pub fn severity(&self) -> Severity {
        match self.kind() {
            ErrorKind::Decode => Severity::Warning,
            _ => Severity::Fatal,
        }
    }

    /// Convenience constructor for [`Error::Open`].
    pub fn open(message: impl Into<String>) -> Self {
        Error::Open(message.into())
    }

    /// Convenience constructor for [`Error::Index`].
    pub fn index(message: impl Into<String>) -> Self {
        Error::Index(message.into())
    }

    /// Convenience constructor for [`Error::Decode`].
    pub fn decode(message: impl fmt::Display) -> Self {
        Error::Decode(message.to_string())
    }

    /// Convenience constructor for [`Error::Demux`].
    pub fn demux(message: impl Into<String>) -> Self {
        Error::Demux(message.into())
    }

    /// Convenience constructor for [`Error::UnsupportedFormat`].
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedFormat(message.into())
    }

    /// Convenience constructor for [`Error::DecoderOpen`].
    pub fn decoder_open(codec: impl Into<String>, message: impl Into<String>) -> Self {
        Error::DecoderOpen {
            codec: codec.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// A non-fatal finding recorded while opening a handle.
///
/// Warnings disable the optional feature they gate but never abort the open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    /// Emit this diagnostic through `tracing` at the matching level.
    pub fn emit(&self) {
        match self.severity {
            Severity::Info => tracing::info!("{}", self.message),
            Severity::Warning => tracing::warn!("{}", self.message),
            Severity::Fatal => tracing::error!("{}", self.message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn track_not_found_display() {
        let err = Error::TrackNotFound {
            requested: 4,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "track 4 not found (the file has 2 tracks)"
        );
        assert_eq!(err.kind(), ErrorKind::Open);
        assert_eq!(err.severity(), Severity::Fatal);
    }

    #[test]
    fn track_type_mismatch_display() {
        let err = Error::TrackTypeMismatch {
            track: 2,
            expected: MediaKind::Video,
        };
        assert_eq!(err.to_string(), "track 2 is not a video track");
    }

    #[test]
    fn decoder_open_display() {
        let err = Error::decoder_open("avc1", "no decoder registered");
        assert_eq!(
            err.to_string(),
            "Decoder error [avc1]: no decoder registered"
        );
        assert_eq!(err.kind(), ErrorKind::Open);
    }

    #[test]
    fn index_kind() {
        let err = Error::index("empty track");
        assert_eq!(err.to_string(), "Index error: empty track");
        assert_eq!(err.kind(), ErrorKind::Index);
        assert_eq!(err.severity(), Severity::Fatal);
    }

    #[test]
    fn decode_is_recoverable() {
        let err = Error::decode("corrupt slice");
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.severity(), Severity::Warning);
    }

    #[test]
    fn unsupported_kind() {
        let err = Error::unsupported("yuv444p -> nv12");
        assert_eq!(err.to_string(), "Unsupported format: yuv444p -> nv12");
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert_matches!(err, Error::Io { .. });
        assert_eq!(err.kind(), ErrorKind::Open);
    }

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::warning("iTunSMPB record is malformed");
        assert_eq!(diag.to_string(), "[warning] iTunSMPB record is malformed");
        assert_eq!(Diagnostic::info("x").severity, Severity::Info);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Fatal);
    }
}
