//! fsrc-mp4: ISO BMFF (MP4/MOV) demuxer.
//!
//! # Modules
//!
//! - [`atoms`] - Box header reading and child navigation
//! - [`sample_table`] - stbl resolution into per-sample offsets, sizes and timing
//! - [`codec_config`] - stsd sample entries and codec configuration records
//! - [`metadata`] - udta/meta/ilst items
//! - [`movie`] - moov parsing into tracks, edit lists and metadata
//! - [`demuxer`] - [`Mp4Demuxer`], the [`fsrc_core::Demuxer`] implementation

pub mod atoms;
pub mod codec_config;
pub mod demuxer;
pub mod metadata;
pub mod movie;
pub mod sample_table;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use demuxer::Mp4Demuxer;
pub use metadata::find_custom;
pub use movie::{parse_moov, Movie, MovieTrack};
pub use sample_table::{ResolvedSample, ResolvedSampleTable};
