//! Capture time to media clock conversion

use super::frame::CaptureTimestamp;

/// Standard RTP video clock
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Maps capture timestamps onto a media clock
///
/// Output ticks never go backwards. With `strict` set, a frame that maps to
/// the same (or an earlier) tick as its predecessor is pushed one tick past
/// it, since RTP receivers treat equal timestamps as the same picture.
#[derive(Debug, Clone)]
pub struct MediaClock {
    clock_rate: u32,
    strict: bool,
    last: Option<u64>,
}

/// A frame's position on the media clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaTime {
    /// Absolute ticks
    pub ticks: u64,
    /// Ticks since the previous frame (0 for the first frame)
    pub delta: u64,
}

impl MediaClock {
    pub fn new(clock_rate: u32, strict: bool) -> Self {
        Self {
            clock_rate,
            strict,
            last: None,
        }
    }

    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    /// `round(seconds * clock_rate)`
    pub fn raw_ticks(&self, ts: CaptureTimestamp) -> u64 {
        (ts.as_secs_f64() * self.clock_rate as f64).round() as u64
    }

    /// Stamp the next frame
    pub fn stamp(&mut self, ts: CaptureTimestamp) -> MediaTime {
        let raw = self.raw_ticks(ts);
        let ticks = match self.last {
            Some(last) if self.strict && raw <= last => last + 1,
            Some(last) if raw < last => last,
            _ => raw,
        };
        let delta = self.last.map_or(0, |last| ticks - last);
        self.last = Some(ticks);
        MediaTime { ticks, delta }
    }

    /// Seconds covered by `ticks`
    pub fn ticks_to_duration(&self, ticks: u64) -> std::time::Duration {
        let rate = self.clock_rate.max(1) as u64;
        let nanos = (ticks % rate) as u128 * 1_000_000_000 / rate as u128;
        std::time::Duration::new(ticks / rate, nanos as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: u64, nanos: u32) -> CaptureTimestamp {
        CaptureTimestamp::new(secs, nanos)
    }

    #[test]
    fn test_tick_conversion_rounds() {
        let clock = MediaClock::new(VIDEO_CLOCK_RATE, true);
        assert_eq!(clock.raw_ticks(ts(1, 0)), 90_000);
        // 1/3 s = 30000 ticks
        assert_eq!(clock.raw_ticks(ts(0, 333_333_333)), 30_000);
        // 5.6 us -> 0.504 ticks rounds up
        assert_eq!(clock.raw_ticks(ts(0, 5_600)), 1);
    }

    #[test]
    fn test_strict_mode_bumps_equal_ticks() {
        let mut clock = MediaClock::new(VIDEO_CLOCK_RATE, true);
        let a = clock.stamp(ts(10, 0));
        // 1 us later maps to the same tick
        let b = clock.stamp(ts(10, 1_000));
        assert_eq!(b.ticks, a.ticks + 1);
        assert_eq!(b.delta, 1);
        // Next real frame lands on its own tick again
        let c = clock.stamp(ts(10, 33_333_333));
        assert_eq!(c.ticks, 900_000 + 3_000);
    }

    #[test]
    fn test_lenient_mode_allows_equal_ticks() {
        let mut clock = MediaClock::new(VIDEO_CLOCK_RATE, false);
        let a = clock.stamp(ts(10, 0));
        let b = clock.stamp(ts(10, 1_000));
        assert_eq!(a.ticks, b.ticks);
        assert_eq!(b.delta, 0);
    }

    #[test]
    fn test_output_is_monotonic_for_monotonic_input() {
        for strict in [true, false] {
            let mut clock = MediaClock::new(VIDEO_CLOCK_RATE, strict);
            let mut prev = None;
            let mut t = 0u64;
            for step in [0u64, 5, 11_111, 11_111, 0, 33_333_333, 7, 1_000_000] {
                t += step;
                let out = clock.stamp(ts(t / 1_000_000_000, (t % 1_000_000_000) as u32));
                if let Some(p) = prev {
                    if strict {
                        assert!(out.ticks > p);
                    } else {
                        assert!(out.ticks >= p);
                    }
                }
                prev = Some(out.ticks);
            }
        }
    }

    #[test]
    fn test_backwards_input_never_rewinds() {
        let mut clock = MediaClock::new(VIDEO_CLOCK_RATE, false);
        let a = clock.stamp(ts(5, 0));
        let b = clock.stamp(ts(4, 0));
        assert_eq!(b.ticks, a.ticks);
    }

    #[test]
    fn test_ticks_to_duration() {
        let clock = MediaClock::new(VIDEO_CLOCK_RATE, true);
        assert_eq!(
            clock.ticks_to_duration(3_000),
            std::time::Duration::from_nanos(33_333_333)
        );
    }

    #[test]
    fn test_ticks_to_duration_survives_long_gaps() {
        let mut clock = MediaClock::new(VIDEO_CLOCK_RATE, true);
        clock.stamp(ts(100_000, 0));
        // A wall-clock reading after a monotonic one: decades of ticks
        let jump = clock.stamp(ts(1_700_000_000, 500_000_000));
        assert_eq!(
            clock.ticks_to_duration(jump.delta),
            std::time::Duration::from_millis(1_699_900_000_500)
        );

        let max = clock.ticks_to_duration(u64::MAX);
        assert_eq!(max.as_secs(), u64::MAX / 90_000);
    }
}
