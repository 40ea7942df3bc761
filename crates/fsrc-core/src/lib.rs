//! fsrc-core: shared media types, errors, options and collaborator contracts.
//!
//! This crate is the foundational dependency for the other fsrc-* crates.
//! It defines the unified error type, media-domain value types, decoded
//! frame containers, source options and the traits a container reader,
//! decoder or converter implements to plug into the engines.

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use codec::*;
pub use config::{AudioOptions, Config, SeekMode, VideoOptions};
pub use error::{Diagnostic, Error, ErrorKind, Result, Severity};
pub use frame::*;
pub use media::*;
