//! Active lyric line lookup.

use crate::lrc::{LyricLine, Transcript};

/// Find the line that is active at `position_ms`.
///
/// `offset_ms` is subtracted from the position before the lookup, so a
/// positive offset shows each line later. Returns the last line whose
/// timestamp is at or before the effective position, or `None` when the
/// transcript is empty or the position precedes the first timed line.
/// Lines without a timestamp never match.
#[must_use]
pub fn active_index(transcript: &Transcript, position_ms: i64, offset_ms: i64) -> Option<usize> {
    active_line_index(&transcript.lines, position_ms, offset_ms)
}

/// Same as [`active_index`] over a bare slice of lines
#[must_use]
pub fn active_line_index(lines: &[LyricLine], position_ms: i64, offset_ms: i64) -> Option<usize> {
    let effective = position_ms.saturating_sub(offset_ms);
    lines
        .iter()
        .enumerate()
        .rev()
        .find(|(_, line)| line.timestamp_ms.is_some_and(|t| t <= effective))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(timestamps: &[i64]) -> Transcript {
        Transcript::from_lines(
            timestamps
                .iter()
                .enumerate()
                .map(|(i, t)| LyricLine::timed(*t, format!("line {i}")))
                .collect(),
        )
    }

    #[test]
    fn test_boundaries() {
        let t = transcript(&[0, 5000, 10_000]);
        assert_eq!(active_index(&t, 4999, 0), Some(0));
        assert_eq!(active_index(&t, 5000, 0), Some(1));
        assert_eq!(active_index(&t, 10_000, 0), Some(2));
        assert_eq!(active_index(&t, 999_999, 0), Some(2));
        assert_eq!(active_index(&t, -1, 0), None);
    }

    #[test]
    fn test_empty_transcript() {
        assert_eq!(active_index(&Transcript::default(), 1234, 0), None);
    }

    #[test]
    fn test_before_first_line() {
        let t = transcript(&[2000, 4000]);
        assert_eq!(active_index(&t, 1999, 0), None);
        assert_eq!(active_index(&t, 2000, 0), Some(0));
    }

    #[test]
    fn test_offset_subtracts_before_lookup() {
        let t = transcript(&[0, 1000, 3000, 4000, 4500, 9000]);
        for position in [-500, 0, 999, 3999, 4000, 5000, 5500, 10_000] {
            assert_eq!(
                active_index(&t, position + 1000, 1000),
                active_index(&t, position, 0),
                "position {position}"
            );
        }
        assert_eq!(active_index(&t, 5000, 1000), active_index(&t, 4000, 0));
    }

    #[test]
    fn test_negative_offset_shows_lines_earlier() {
        let t = transcript(&[0, 5000]);
        assert_eq!(active_index(&t, 4500, -500), Some(1));
    }

    #[test]
    fn test_untimed_lines_never_match() {
        let lines = vec![
            LyricLine::timed(0, "a"),
            LyricLine::timed(1000, "b"),
            LyricLine::untimed("unsynced"),
        ];
        assert_eq!(active_line_index(&lines, 50_000, 0), Some(1));

        let unsynced = vec![LyricLine::untimed("x"), LyricLine::untimed("y")];
        assert_eq!(active_line_index(&unsynced, 50_000, 0), None);
    }

    #[test]
    fn test_duplicate_timestamps_pick_last() {
        let t = transcript(&[0, 1000, 1000, 2000]);
        assert_eq!(active_index(&t, 1500, 0), Some(2));
    }

    #[test]
    fn test_idempotent() {
        let t = transcript(&[0, 5000, 10_000]);
        let before = t.clone();
        let first = active_index(&t, 7000, 250);
        let second = active_index(&t, 7000, 250);
        assert_eq!(first, second);
        assert_eq!(t, before);
    }

    #[test]
    fn test_extreme_offsets_do_not_overflow() {
        let t = transcript(&[0]);
        assert_eq!(active_index(&t, i64::MIN, i64::MAX), None);
        assert_eq!(active_index(&t, i64::MAX, i64::MIN), Some(0));
    }
}
