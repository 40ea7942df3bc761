//! Source options and the on-disk configuration file.
//!
//! [`VideoOptions`] and [`AudioOptions`] are what `open_video`/`open_audio`
//! consume. [`Config`] bundles both plus a logging filter and is
//! deserialized from JSON; every section defaults sensibly so a completely
//! empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::media::{ChannelLayout, PixelFormat, SampleFormat};

pub const DEFAULT_FORWARD_SEEK_THRESHOLD: u32 = 10;
pub const MIN_FORWARD_SEEK_THRESHOLD: u32 = 1;
pub const MAX_FORWARD_SEEK_THRESHOLD: u32 = 999;

// ---------------------------------------------------------------------------
// SeekMode
// ---------------------------------------------------------------------------

/// Strategy the video seek engine uses for non-sequential requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeekMode {
    /// Decode forward within the threshold, keyframe seek beyond it.
    #[default]
    Normal,
    /// Seek straight to the target sample without a keyframe.
    Unsafe,
    /// Keyframe seek for anything but the next frame.
    Strict,
}

impl SeekMode {
    /// Map a host-style numeric mode, clamping to the known range.
    pub fn from_index(index: i64) -> Self {
        match index.clamp(0, 2) {
            0 => Self::Normal,
            1 => Self::Unsafe,
            _ => Self::Strict,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Unsafe => 1,
            Self::Strict => 2,
        }
    }
}

impl std::fmt::Display for SeekMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Unsafe => write!(f, "unsafe"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

// ---------------------------------------------------------------------------
// VideoOptions
// ---------------------------------------------------------------------------

/// Options consumed by `open_video`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoOptions {
    /// 1-based track number; 0 selects the first video track.
    pub track: u32,
    /// Decoder thread-count hint; 0 lets the decoder decide.
    pub threads: u32,
    pub seek_mode: SeekMode,
    /// Maximum forward distance decoded without seeking (Normal mode).
    pub forward_seek_threshold: u32,
    /// Hand decoder buffers to the host without copying when possible.
    pub direct_rendering: bool,
    /// Emit high bit depth as stacked MSB/LSB 8-bit planes.
    pub stacked_format: bool,
    /// Output pixel format; `None` keeps the decoder's format.
    pub format: Option<PixelFormat>,
    /// Decoder name to use instead of the one picked from the codec.
    pub forced_codec: Option<String>,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            track: 0,
            threads: 0,
            seek_mode: SeekMode::Normal,
            forward_seek_threshold: DEFAULT_FORWARD_SEEK_THRESHOLD,
            direct_rendering: false,
            stacked_format: false,
            format: None,
            forced_codec: None,
        }
    }
}

impl VideoOptions {
    /// Clamp out-of-range values to their documented bounds.
    pub fn normalized(mut self) -> Self {
        self.forward_seek_threshold = self
            .forward_seek_threshold
            .clamp(MIN_FORWARD_SEEK_THRESHOLD, MAX_FORWARD_SEEK_THRESHOLD);
        if let Some(codec) = &self.forced_codec {
            if codec.trim().is_empty() {
                self.forced_codec = None;
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// AudioOptions
// ---------------------------------------------------------------------------

/// Options consumed by `open_audio`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioOptions {
    /// 1-based track number; 0 selects the first audio track.
    pub track: u32,
    /// Remove encoder priming and padding from the output.
    pub skip_priming: bool,
    /// Output layout; `None` keeps the decoder's layout.
    pub channel_layout: Option<ChannelLayout>,
    /// Output rate in Hz; 0 keeps the decoder's rate.
    pub sample_rate: u32,
    /// Output sample format; `None` keeps the decoder's format.
    pub sample_format: Option<SampleFormat>,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            track: 0,
            skip_priming: true,
            channel_layout: None,
            sample_rate: 0,
            sample_format: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video: VideoOptions,
    pub audio: AudioOptions,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None`, missing or unparsable.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let video = &self.video;

        if !(MIN_FORWARD_SEEK_THRESHOLD..=MAX_FORWARD_SEEK_THRESHOLD)
            .contains(&video.forward_seek_threshold)
        {
            warnings.push(format!(
                "video.forward_seek_threshold {} is outside [{MIN_FORWARD_SEEK_THRESHOLD}, {MAX_FORWARD_SEEK_THRESHOLD}] and will be clamped",
                video.forward_seek_threshold
            ));
        }

        if video.seek_mode != SeekMode::Normal
            && video.forward_seek_threshold != DEFAULT_FORWARD_SEEK_THRESHOLD
        {
            warnings.push(format!(
                "video.forward_seek_threshold is ignored in {} seek mode",
                video.seek_mode
            ));
        }

        if video.seek_mode == SeekMode::Unsafe {
            warnings.push(
                "video.seek_mode 'unsafe' may produce corrupted frames after seeking".into(),
            );
        }

        if video.direct_rendering && video.stacked_format {
            warnings.push(
                "video.direct_rendering has no effect together with video.stacked_format".into(),
            );
        }

        if video.stacked_format && video.format.is_some_and(|f| !f.is_high_bit_depth()) {
            warnings.push(
                "video.stacked_format only applies to high bit depth output formats".into(),
            );
        }

        if let Some(codec) = &video.forced_codec {
            if codec.trim().is_empty() {
                warnings.push("video.forced_codec is empty and will be ignored".into());
            }
        }

        if video.threads > 64 {
            warnings.push(format!(
                "video.threads {} is unusually high",
                video.threads
            ));
        }

        if self.audio.sample_rate > 384_000 {
            warnings.push(format!(
                "audio.sample_rate {} is above 384000 Hz",
                self.audio.sample_rate
            ));
        }

        warnings
    }
}
