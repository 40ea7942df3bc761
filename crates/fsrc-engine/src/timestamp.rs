//! Average framerate estimation from presentation timestamps.
//!
//! The result is a display hint. Presentation-order indexing never assumes a
//! constant frame duration.

use fsrc_core::{gcd, Rational};

/// Used when a track carries no usable timing.
pub const DEFAULT_FRAMERATE: Rational = Rational::new(25, 1);

/// Estimate a track's framerate.
///
/// `presentation` holds `(cts, duration)` pairs sorted in presentation
/// order, all in `timescale` ticks.
pub fn estimate_framerate(timescale: u32, presentation: &[(i64, u32)]) -> Rational {
    if timescale == 0 || presentation.is_empty() {
        return DEFAULT_FRAMERATE;
    }
    let timescale = timescale as u64;

    if let [(_, duration)] = presentation {
        return match *duration {
            0 => DEFAULT_FRAMERATE,
            d => Rational::new(timescale, d as u64).reduced(),
        };
    }

    // The timebase is the largest tick count every frame interval is a
    // multiple of.
    let timebase = presentation
        .windows(2)
        .map(|w| w[1].0.saturating_sub(w[0].0).max(0) as u64)
        .filter(|&delta| delta > 0)
        .fold(0u64, gcd);
    if timebase == 0 {
        return DEFAULT_FRAMERATE;
    }

    let (first_cts, _) = presentation[0];
    let (last_cts, last_duration) = presentation[presentation.len() - 1];
    let tail = match last_duration {
        0 => (last_cts - presentation[presentation.len() - 2].0).max(0) as u64,
        d => d as u64,
    };
    let span = (last_cts - first_cts).max(0) as u64 + tail;
    let span_units = span / timebase;
    if span_units == 0 {
        return DEFAULT_FRAMERATE;
    }

    let common = gcd(timescale, timebase).max(1);
    let reduced_timescale = timescale / common;
    let reduced_timebase = timebase / common;
    let count = presentation.len() as u64;
    let num = (count * reduced_timescale + span_units / 2) / span_units;
    if num == 0 {
        return DEFAULT_FRAMERATE;
    }
    Rational::new(num, reduced_timebase).reduced()
}
