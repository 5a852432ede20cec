//! Playback position extrapolation.

use crate::playback::PlaybackSample;
use tokio::time::Instant;

/// Estimate the playback position at `now` from a (possibly stale) sample.
///
/// A paused sample is a frozen clock. A playing sample advances by the
/// wall-clock time elapsed since it was taken, scaled by its speed. An
/// instant earlier than the sample counts as zero elapsed time.
#[must_use]
pub fn extrapolate(sample: &PlaybackSample, now: Instant) -> i64 {
    if !sample.is_playing {
        return sample.position_ms;
    }

    let elapsed = now.saturating_duration_since(sample.sampled_at);
    let advanced = (elapsed.as_secs_f64() * 1000.0 * sample.speed).round();

    // f64 -> i64 `as` saturates, which is what we want for absurd inputs
    #[allow(clippy::cast_possible_truncation)]
    let advanced = advanced as i64;

    sample.position_ms.saturating_add(advanced)
}
