//! Subcommand implementations.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use fsrc_core::{
    AudioOptions, Config, Demuxer, MediaKind, PixelFormat, Rational, SeekMode, VideoOptions,
};
use fsrc_engine::{open_audio, open_video};
use fsrc_mp4::Mp4Demuxer;

#[derive(Debug, Serialize)]
struct TrackInfo {
    number: u32,
    kind: MediaKind,
    codec: String,
    timescale: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<VideoInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<AudioInfo>,
    /// Why the track could not be opened, if it could not.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct VideoInfo {
    width: u32,
    height: u32,
    frame_count: u32,
    framerate: Rational,
    format: PixelFormat,
    decoder: String,
    keyframes: usize,
}

#[derive(Debug, Serialize)]
struct AudioInfo {
    channels: u16,
    sample_rate: u32,
    sample_format: String,
    sample_count: u64,
    priming: u64,
    padding: u64,
    decoder: String,
}

pub fn parse_seek_mode(value: &str) -> Result<SeekMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "normal" | "0" => Ok(SeekMode::Normal),
        "unsafe" | "1" => Ok(SeekMode::Unsafe),
        "strict" | "2" => Ok(SeekMode::Strict),
        other => anyhow::bail!("unknown seek mode '{other}' (expected normal, unsafe or strict)"),
    }
}

fn ensure_exists(file: &Path) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }
    Ok(())
}

pub fn info(file: &Path, config: &Config, json: bool) -> Result<()> {
    ensure_exists(file)?;
    let demuxer = Mp4Demuxer::open(file)?;
    let tracks = demuxer.tracks().to_vec();
    drop(demuxer);

    let infos: Vec<TrackInfo> = tracks
        .iter()
        .map(|t| {
            let mut info = TrackInfo {
                number: t.number,
                kind: t.kind,
                codec: t.codec.to_string(),
                timescale: t.timescale,
                video: None,
                audio: None,
                error: None,
            };
            match t.kind {
                MediaKind::Video => {
                    let options = VideoOptions {
                        track: t.number,
                        ..config.video.clone()
                    };
                    match open_video(file, &options) {
                        Ok(source) => {
                            info.video = Some(VideoInfo {
                                width: source.width(),
                                height: source.height(),
                                frame_count: source.frame_count(),
                                framerate: source.framerate(),
                                format: source.output_format(),
                                decoder: source.decoder_name().to_string(),
                                keyframes: source.index().keyframe_count(),
                            });
                            source.close();
                        }
                        Err(e) => info.error = Some(e.to_string()),
                    }
                }
                MediaKind::Audio => {
                    let options = AudioOptions {
                        track: t.number,
                        ..config.audio.clone()
                    };
                    match open_audio(file, &options) {
                        Ok(source) => {
                            let format = source.output_format();
                            let trim = *source.trim_info();
                            info.audio = Some(AudioInfo {
                                channels: format.channels(),
                                sample_rate: format.sample_rate,
                                sample_format: format.sample_format.to_string(),
                                sample_count: source.sample_count(),
                                priming: trim.priming_sample_count,
                                padding: trim.padding_sample_count,
                                decoder: source.decoder_name().to_string(),
                            });
                            source.close();
                        }
                        Err(e) => info.error = Some(e.to_string()),
                    }
                }
                MediaKind::Other => {}
            }
            info
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Tracks: {}", infos.len());
    for t in &infos {
        println!("  [{}] {} ({})", t.number, t.kind, t.codec);
        if let Some(v) = &t.video {
            println!(
                "      {}x{} {}, {} frames at {} fps, {} keyframes, decoder {}",
                v.width, v.height, v.format, v.frame_count, v.framerate, v.keyframes, v.decoder
            );
        }
        if let Some(a) = &t.audio {
            println!(
                "      {} ch, {} Hz {}, {} samples (priming {}, padding {}), decoder {}",
                a.channels,
                a.sample_rate,
                a.sample_format,
                a.sample_count,
                a.priming,
                a.padding,
                a.decoder
            );
        }
        if let Some(e) = &t.error {
            println!("      not decodable: {e}");
        }
    }
    Ok(())
}

pub fn frame(file: &Path, mut options: VideoOptions, n: u32, output: &Path) -> Result<()> {
    ensure_exists(file)?;
    options.format = Some(PixelFormat::Rgb24);
    options.direct_rendering = false;
    let mut source = open_video(file, &options)?;

    let decoded = source.get_video_frame(n);
    if decoded.props.placeholder {
        tracing::warn!("frame {n} could not be decoded; writing a black frame");
    }
    let frame = &decoded.frame;
    let row_bytes = frame.width as usize * 3;
    let plane = frame
        .planes
        .first()
        .context("converted frame has no pixel plane")?;
    let mut pixels = Vec::with_capacity(row_bytes * frame.height as usize);
    for y in 0..frame.height as usize {
        pixels.extend_from_slice(&plane.row(y)[..row_bytes]);
    }
    let image = image::RgbImage::from_raw(frame.width, frame.height, pixels)
        .context("frame buffer does not match its dimensions")?;
    image
        .save_with_format(output, image::ImageFormat::Png)
        .with_context(|| format!("cannot write {}", output.display()))?;

    println!(
        "Wrote frame {} (sample {}, {}x{}, type {}) to {}",
        decoded.props.presentation_index,
        decoded.props.decode_index,
        frame.width,
        frame.height,
        decoded.props.picture_type,
        output.display()
    );
    source.close();
    Ok(())
}

pub fn audio(
    file: &Path,
    options: &AudioOptions,
    start: i64,
    length: Option<u64>,
    output: &Path,
) -> Result<()> {
    ensure_exists(file)?;
    let mut source = open_audio(file, options)?;
    let total = source.sample_count();
    let length = length.unwrap_or_else(|| (total as i64 - start).max(0) as u64);

    let samples = source.get_audio_samples(start, length);
    std::fs::write(output, &samples)
        .with_context(|| format!("cannot write {}", output.display()))?;

    let format = source.output_format();
    println!(
        "Wrote {length} samples ({} bytes, {format}) starting at {start} to {}",
        samples.len(),
        output.display()
    );
    if source.is_errored() {
        tracing::warn!("decoding failed part way; the rest of the range is silence");
    }
    source.close();
    Ok(())
}

pub fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("cannot read {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let video = &config.video;
    println!(
        "  Video: track {}, seek mode {}, forward threshold {}",
        video.track, video.seek_mode, video.forward_seek_threshold
    );
    println!(
        "  Audio: track {}, skip priming {}",
        config.audio.track, config.audio.skip_priming
    );
    for warning in config.validate() {
        println!("  warning: {warning}");
    }
    Ok(())
}
