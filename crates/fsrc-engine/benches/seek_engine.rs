//! Benchmarks for frame requests against an in-memory raw video file.
//!
//! Measures sequential access, random access and audio reads so changes to
//! the seek strategy or the carry buffer show up as throughput changes.

use std::io::Cursor;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fsrc_core::{AudioOptions, SeekMode, VideoOptions};
use fsrc_engine::{AudioSource, BuiltinDecoders, PcmConverter, PixelConverter, VideoSource};
use fsrc_mp4::fixtures::{AudioTrackSpec, FixtureSample, MovieBuilder, VideoTrackSpec};
use fsrc_mp4::Mp4Demuxer;

const FRAMES: u32 = 300;
const GOP: u32 = 30;

fn movie() -> Vec<u8> {
    // 64x36 I420, a keyframe flag every GOP samples.
    let picture = 64 * 36 * 3 / 2;
    let video = VideoTrackSpec::new(b"I420", 64, 36, 30000).with_samples(
        (0..FRAMES).map(|i| FixtureSample::new(vec![(i % 200) as u8; picture], 1001, i % GOP == 0)),
    );
    let audio = AudioTrackSpec::pcm(b"sowt", 2, 16, 48000).with_frames(200, 1024);
    MovieBuilder::new(1000).video(video).audio(audio).build()
}

fn open_video(file: &[u8], mode: SeekMode) -> VideoSource {
    let demuxer = Mp4Demuxer::from_reader(Cursor::new(file.to_vec())).unwrap();
    let options = VideoOptions {
        seek_mode: mode,
        ..Default::default()
    };
    VideoSource::open(Box::new(demuxer), &BuiltinDecoders, Box::new(PixelConverter), &options)
        .unwrap()
}

fn bench_video(c: &mut Criterion) {
    let file = movie();
    let mut group = c.benchmark_group("video_requests");
    group.throughput(Throughput::Elements(FRAMES as u64));

    for mode in [SeekMode::Normal, SeekMode::Strict] {
        group.bench_with_input(BenchmarkId::new("sequential", mode), &mode, |b, &mode| {
            let mut source = open_video(&file, mode);
            b.iter(|| {
                for n in 0..FRAMES {
                    black_box(source.get_video_frame(n));
                }
            });
        });
    }

    // Fixed pseudo-random order so runs stay comparable.
    let order: Vec<u32> = (0..FRAMES).map(|i| (i * 7919 + 13) % FRAMES).collect();
    group.bench_function("random", |b| {
        let mut source = open_video(&file, SeekMode::Normal);
        b.iter(|| {
            for &n in &order {
                black_box(source.get_video_frame(n));
            }
        });
    });

    group.bench_function("to_rgb", |b| {
        let demuxer = Mp4Demuxer::from_reader(Cursor::new(file.clone())).unwrap();
        let options = VideoOptions {
            format: Some(fsrc_core::PixelFormat::Rgb24),
            ..Default::default()
        };
        let mut source =
            VideoSource::open(Box::new(demuxer), &BuiltinDecoders, Box::new(PixelConverter), &options)
                .unwrap();
        b.iter(|| {
            for n in 0..FRAMES {
                black_box(source.get_video_frame(n));
            }
        });
    });
    group.finish();
}

fn bench_audio(c: &mut Criterion) {
    let file = movie();
    let mut group = c.benchmark_group("audio_reads");

    for chunk in [256u64, 4096] {
        group.throughput(Throughput::Elements(chunk * 50));
        group.bench_with_input(BenchmarkId::new("sequential", chunk), &chunk, |b, &chunk| {
            let demuxer = Mp4Demuxer::from_reader(Cursor::new(file.clone())).unwrap();
            let mut source = AudioSource::open(
                Box::new(demuxer),
                &BuiltinDecoders,
                Box::new(PcmConverter::default()),
                &AudioOptions::default(),
            )
            .unwrap();
            b.iter(|| {
                for i in 0..50 {
                    black_box(source.get_audio_samples(i * chunk as i64, chunk));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_video, bench_audio);
criterion_main!(benches);
