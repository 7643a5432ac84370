//! Integer world time and closed time spans.

use serde::{Deserialize, Serialize};

/// Discrete simulation time measured in ticks.
pub type WorldTime = i64;

/// Monotonic tick counter owned by the simulation loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Clock(WorldTime);

impl Clock {
    /// Creates a clock positioned at the provided time.
    #[must_use]
    pub const fn new(now: WorldTime) -> Self {
        Self(now)
    }

    /// Current time reported by the clock.
    #[must_use]
    pub const fn now(&self) -> WorldTime {
        self.0
    }

    /// Clock advanced by exactly one tick.
    #[must_use]
    pub const fn tick(self) -> Self {
        Self(self.0 + 1)
    }

    /// Time `ticks` into the future relative to the clock.
    #[must_use]
    pub const fn future(&self, ticks: WorldTime) -> WorldTime {
        self.0 + ticks
    }
}

/// Interval of world time bounded by `start` and `end`.
///
/// Both endpoints belong to the span. `duration` is cached because the partial
/// occupancy math of path actions divides by it on every query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    start: WorldTime,
    end: WorldTime,
    duration: WorldTime,
}

impl Span {
    /// Creates a span, ordering the endpoints when they arrive reversed.
    #[must_use]
    pub const fn new(start: WorldTime, end: WorldTime) -> Self {
        if start <= end {
            Self {
                start,
                end,
                duration: end - start,
            }
        } else {
            Self {
                start: end,
                end: start,
                duration: start - end,
            }
        }
    }

    /// First tick covered by the span.
    #[must_use]
    pub const fn start(&self) -> WorldTime {
        self.start
    }

    /// Last tick covered by the span.
    #[must_use]
    pub const fn end(&self) -> WorldTime {
        self.end
    }

    /// Number of ticks between start and end.
    #[must_use]
    pub const fn duration(&self) -> WorldTime {
        self.duration
    }

    /// Reports whether `t` lies within the span, endpoints included.
    #[must_use]
    pub const fn contains(&self, t: WorldTime) -> bool {
        self.start <= t && t <= self.end
    }

    /// Reports whether two spans share at least one tick.
    #[must_use]
    pub const fn overlaps(&self, other: &Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Ticks left until the span ends, clamped to `[0, duration]`.
    #[must_use]
    pub fn remaining(&self, t: WorldTime) -> WorldTime {
        (self.end - t).clamp(0, self.duration)
    }
}
