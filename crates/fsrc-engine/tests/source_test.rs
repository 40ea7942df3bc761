//! End-to-end tests: MP4 files on disk through `open_video` / `open_audio`.

use std::io::Write;

use assert_matches::assert_matches;
use fsrc_core::{AudioOptions, ChannelLayout, Error, PixelFormat, SampleFormat, VideoOptions};
use fsrc_engine::sink::PlaneData;
use fsrc_engine::{
    open_audio, open_video, InterleavedSink, PlanarSink, SharedAudioSource, SharedVideoSource,
};
use fsrc_mp4::fixtures::{pcm_value, AudioTrackSpec, FixtureSample, MovieBuilder, VideoTrackSpec};

const PRIMING: u32 = 100;
const PADDING: u32 = 140;
const DURATION: u64 = 10_000;

fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

/// 4x2 I420 picture with uniform luma `10 * i` and neutral chroma.
fn i420_picture(i: u8) -> Vec<u8> {
    let mut data = vec![i * 10; 8];
    data.extend_from_slice(&[128; 4]);
    data
}

fn i420_track(frames: u8) -> VideoTrackSpec {
    VideoTrackSpec::new(b"I420", 4, 2, 30000)
        .with_samples((0..frames).map(|i| FixtureSample::new(i420_picture(i), 1001, true)))
}

fn smpb(priming: u32, padding: u32, duration: u64) -> String {
    let mut s = format!(" 00000000 {priming:08X} {padding:08X} {duration:016X}");
    for _ in 0..8 {
        s.push_str(" 00000000");
    }
    s
}

/// Stereo 16-bit little-endian PCM, 10 x 1024 frames at 48 kHz, with an
/// iTunSMPB record.
fn pcm_movie() -> tempfile::NamedTempFile {
    let audio = AudioTrackSpec::pcm(b"sowt", 2, 16, 48000)
        .with_frames(10, 1024)
        .with_custom_text("com.apple.iTunes", "iTunSMPB", &smpb(PRIMING, PADDING, DURATION));
    write_temp(&MovieBuilder::new(1000).audio(audio).build())
}

fn s16(bytes: &[u8], frame: usize, channel: usize) -> i16 {
    let at = (frame * 2 + channel) * 2;
    i16::from_le_bytes([bytes[at], bytes[at + 1]])
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

#[test]
fn test_raw_video_frames_come_back_in_order() {
    let file = write_temp(&MovieBuilder::new(1000).video(i420_track(10)).build());
    let mut source = open_video(file.path(), &VideoOptions::default()).unwrap();

    assert_eq!(source.frame_count(), 10);
    assert_eq!((source.width(), source.height()), (4, 2));
    assert_eq!(source.output_format(), PixelFormat::Yuv420p);
    assert_eq!(source.decoder_name(), "rawvideo");

    for n in [0u32, 7, 3, 3, 9] {
        let out = source.get_video_frame(n);
        assert!(!out.props.placeholder);
        assert_eq!(out.frame.planes[0].data[0], n as u8 * 10, "frame {n}");
        assert_eq!(out.props.picture_type, 'I');
    }
    source.close();
}

#[test]
fn test_edit_list_hides_leading_and_trailing_frames() {
    // Starts at frame 2 and lasts 0.2 s (six frames at 29.97 fps).
    let video = i420_track(10).with_edit(200, 2002);
    let file = write_temp(&MovieBuilder::new(1000).video(video).build());
    let mut source = open_video(file.path(), &VideoOptions::default()).unwrap();

    assert_eq!(source.frame_count(), 6);
    assert!(source
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("edit list")));
    let out = source.get_video_frame(0);
    assert_eq!(out.props.decode_index, 3);
    assert_eq!(out.frame.planes[0].data[0], 20);
}

#[test]
fn test_conversion_to_rgb_keeps_grey_grey() {
    let file = write_temp(&MovieBuilder::new(1000).video(i420_track(4)).build());
    let options = VideoOptions {
        format: Some(PixelFormat::Rgb24),
        ..Default::default()
    };
    let mut source = open_video(file.path(), &options).unwrap();
    assert!(source.negotiation().needs_conversion);

    let out = source.get_video_frame(3);
    assert_eq!(out.frame.format, PixelFormat::Rgb24);
    let rgb = &out.frame.planes[0].data;
    assert_eq!(rgb.len(), 4 * 2 * 3);
    assert_eq!(rgb[0], rgb[1]);
    assert_eq!(rgb[1], rgb[2]);
}

#[test]
fn test_direct_rendering_shares_decoder_planes() {
    let file = write_temp(&MovieBuilder::new(1000).video(i420_track(4)).build());
    let options = VideoOptions {
        direct_rendering: true,
        ..Default::default()
    };
    let mut source = open_video(file.path(), &options).unwrap();
    assert!(source.negotiation().direct_rendering);

    let (frame, props) = source.render_frame(2, &mut PlanarSink::default()).unwrap();
    assert_eq!(props.presentation_index, 2);
    assert_eq!(frame.planes.len(), 3);
    assert!(frame.planes.iter().all(|p| p.data.is_shared()));
    assert_eq!(frame.planes[0].data.as_slice()[..4], [20; 4]);
}

#[test]
fn test_copied_rendering_pads_rows() {
    let file = write_temp(&MovieBuilder::new(1000).video(i420_track(4)).build());
    let mut source = open_video(file.path(), &VideoOptions::default()).unwrap();

    let (frame, _) = source.render_frame(1, &mut PlanarSink::new(16)).unwrap();
    assert_eq!(frame.planes[0].stride, 16);
    assert_matches!(&frame.planes[0].data, PlaneData::Owned(bytes) if bytes[..4] == [10; 4]);

    let (frame, _) = source.render_frame(1, &mut InterleavedSink::default()).unwrap();
    assert_eq!(frame.plane(0).map(|p| p[0]), Some(10));
    assert_eq!(frame.plane(1).map(|p| p[0]), Some(128));
}

#[test]
fn test_shared_video_source_serves_threads() {
    let file = write_temp(&MovieBuilder::new(1000).video(i420_track(10)).build());
    let shared = SharedVideoSource::new(open_video(file.path(), &VideoOptions::default()).unwrap());

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let shared = shared.clone();
            std::thread::spawn(move || {
                let n = t * 2;
                let out = shared.get_video_frame(n);
                out.frame.planes[0].data[0] == n as u8 * 10
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(shared.frame_count(), 10);
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

#[test]
fn test_priming_is_skipped_via_itunsmpb() {
    let file = pcm_movie();
    let mut source = open_audio(file.path(), &AudioOptions::default()).unwrap();

    let trim = *source.trim_info();
    assert_eq!(trim.priming_sample_count, PRIMING as u64);
    assert_eq!(trim.padding_sample_count, PADDING as u64);
    assert_eq!(source.sample_count(), DURATION + PRIMING as u64);
    assert_eq!(source.decoder_name(), "pcm");

    let out = source.get_audio_samples(0, 4);
    assert_eq!(out.len(), 4 * 4);
    assert_eq!(s16(&out, 0, 0), pcm_value(PRIMING as u64, 0));
    assert_eq!(s16(&out, 0, 1), pcm_value(PRIMING as u64, 1));
    assert_eq!(s16(&out, 3, 0), pcm_value(PRIMING as u64 + 3, 0));
}

#[test]
fn test_padding_is_silent() {
    let file = pcm_movie();
    let mut source = open_audio(file.path(), &AudioOptions::default()).unwrap();

    // Output 9999 is the last frame before the padding.
    let out = source.get_audio_samples(9999, 2);
    assert_eq!(s16(&out, 0, 0), pcm_value(9999 + PRIMING as u64, 0));
    assert_eq!(s16(&out, 1, 0), 0);
    assert_eq!(s16(&out, 1, 1), 0);
}

#[test]
fn test_untrimmed_track_starts_at_the_first_decoded_sample() {
    let file = pcm_movie();
    let options = AudioOptions {
        skip_priming: false,
        ..Default::default()
    };
    let mut source = open_audio(file.path(), &options).unwrap();
    assert_eq!(source.sample_count(), 10 * 1024);
    let out = source.get_audio_samples(0, 1);
    assert_eq!(s16(&out, 0, 0), pcm_value(0, 0));
}

#[test]
fn test_one_read_equals_partitioned_reads() {
    let file = pcm_movie();
    let mut whole = open_audio(file.path(), &AudioOptions::default()).unwrap();
    let expected = whole.get_audio_samples(0, 5000);

    let mut parts = open_audio(file.path(), &AudioOptions::default()).unwrap();
    let mut got = Vec::new();
    for (start, length) in [(0i64, 1234u64), (1234, 2000), (3234, 1766)] {
        got.extend(parts.get_audio_samples(start, length));
    }
    assert_eq!(got, expected);

    // Reading backwards rewinds and still agrees.
    let again = parts.get_audio_samples(1000, 10);
    assert_eq!(again, expected[1000 * 4..1010 * 4]);
    assert!(parts.stats().resets >= 1);
}

#[test]
fn test_reads_outside_the_track_are_silence() {
    let file = pcm_movie();
    let mut source = open_audio(file.path(), &AudioOptions::default()).unwrap();
    let total = source.sample_count() as i64;

    let out = source.get_audio_samples(-10, 20);
    assert_eq!(out.len(), 20 * 4);
    assert!(out[..10 * 4].iter().all(|&b| b == 0));
    assert_eq!(s16(&out, 10, 0), pcm_value(PRIMING as u64, 0));

    let out = source.get_audio_samples(total, 8);
    assert_eq!(out, vec![0; 8 * 4]);
    assert!(source.get_audio_samples(0, 0).is_empty());
}

#[test]
fn test_float_output_is_scaled() {
    let file = pcm_movie();
    let options = AudioOptions {
        sample_format: Some(SampleFormat::F32),
        ..Default::default()
    };
    let mut source = open_audio(file.path(), &options).unwrap();
    assert_eq!(source.output_format().sample_format, SampleFormat::F32);

    let out = source.get_audio_samples(0, 1);
    assert_eq!(out.len(), 2 * 4);
    let left = f32::from_le_bytes([out[0], out[1], out[2], out[3]]);
    assert_eq!(left, pcm_value(PRIMING as u64, 0) as f32 / 32768.0);
}

#[test]
fn test_stereo_downmixes_to_mono() {
    let file = pcm_movie();
    let options = AudioOptions {
        channel_layout: Some(ChannelLayout::MONO),
        ..Default::default()
    };
    let mut source = open_audio(file.path(), &options).unwrap();
    assert_eq!(source.output_format().channels(), 1);

    let out = source.get_audio_samples(0, 100);
    assert_eq!(out.len(), 100 * 2);
    let first = i16::from_le_bytes([out[0], out[1]]);
    let (l, r) = (pcm_value(PRIMING as u64, 0), pcm_value(PRIMING as u64, 1));
    assert!((first as i32 - (l as i32 + r as i32) / 2).abs() <= 1);
}

#[test]
fn test_resampled_track_reads_the_same_in_pieces() {
    let file = pcm_movie();
    let options = AudioOptions {
        sample_rate: 24000,
        ..Default::default()
    };
    let mut whole = open_audio(file.path(), &options).unwrap();
    assert_eq!(whole.output_format().sample_rate, 24000);
    assert_eq!(whole.trim_info().priming_sample_count, PRIMING as u64 / 2);
    let total = whole.sample_count();
    assert_eq!(total, (DURATION + PRIMING as u64) / 2);
    let expected = whole.get_audio_samples(0, total);
    assert_eq!(expected.len(), total as usize * 4);
    assert!(expected.iter().any(|&b| b != 0));

    let mut parts = open_audio(file.path(), &options).unwrap();
    let mut got = Vec::new();
    for (start, length) in [(0i64, 777u64), (777, 2000), (2777, total - 2777)] {
        got.extend(parts.get_audio_samples(start, length));
    }
    assert_eq!(got, expected);

    let again = parts.get_audio_samples(100, 50);
    assert_eq!(again, expected[100 * 4..150 * 4]);
    assert!(parts.stats().resets >= 1);
}

#[test]
fn test_shared_audio_source_reads_consistently() {
    let file = pcm_movie();
    let shared = SharedAudioSource::new(open_audio(file.path(), &AudioOptions::default()).unwrap());
    let worker = {
        let shared = shared.clone();
        std::thread::spawn(move || shared.get_audio_samples(500, 10))
    };
    let here = shared.get_audio_samples(500, 10);
    assert_eq!(worker.join().unwrap(), here);
    assert_eq!(shared.sample_count(), DURATION + PRIMING as u64);
}

// ---------------------------------------------------------------------------
// Track selection
// ---------------------------------------------------------------------------

#[test]
fn test_track_selection_errors() {
    let audio = AudioTrackSpec::pcm(b"sowt", 1, 16, 8000).with_frames(2, 100);
    let both = write_temp(
        &MovieBuilder::new(1000)
            .video(i420_track(2))
            .audio(audio)
            .build(),
    );
    let video_only = write_temp(&MovieBuilder::new(1000).video(i420_track(2)).build());

    let picked = AudioOptions {
        track: 1,
        ..Default::default()
    };
    assert_matches!(
        open_audio(both.path(), &picked).unwrap_err(),
        Error::TrackTypeMismatch { track: 1, .. }
    );
    let missing = VideoOptions {
        track: 5,
        ..Default::default()
    };
    assert_matches!(
        open_video(both.path(), &missing).unwrap_err(),
        Error::TrackNotFound { requested: 5, available: 2 }
    );
    assert_matches!(
        open_audio(video_only.path(), &AudioOptions::default()).unwrap_err(),
        Error::NoTrackOfKind { .. }
    );
    assert!(open_audio(both.path(), &AudioOptions::default()).is_ok());
}

#[test]
fn test_missing_file_fails_to_open() {
    let err = open_video("/nonexistent/clip.mp4", &VideoOptions::default()).unwrap_err();
    assert_matches!(err, Error::Open(_));
}
