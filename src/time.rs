/// Virtual time for the fair-share kernel.
///
/// Represents a simulated date in seconds with no dependency on `std::time`.
/// Time advances only when the main loop commits a step, never from
/// wall-clock observation.
///
/// All floating-point comparisons that decide whether something "happened"
/// go through the epsilon helpers at the bottom of this module so that the
/// lazy and full update paths agree on the same tolerance.

/// A simulated date, in seconds since the start of the run.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, serde::Serialize, serde::Deserialize)]
pub struct VirtualTime(f64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0.0);

    /// Create a new `VirtualTime` from a raw date in seconds.
    #[inline]
    pub fn new(seconds: f64) -> Self {
        VirtualTime(seconds)
    }

    /// Return the raw date in seconds.
    #[inline]
    pub fn seconds(self) -> f64 {
        self.0
    }

    /// Advance time by `delta` seconds.
    /// Returns `None` if `delta` is negative or the new date is not finite.
    #[inline]
    pub fn advance(self, delta: f64) -> Option<VirtualTime> {
        let date = self.0 + delta;
        (delta >= 0.0 && date.is_finite()).then_some(VirtualTime(date))
    }
}

impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={}", self.0)
    }
}

impl From<f64> for VirtualTime {
    fn from(seconds: f64) -> Self {
        VirtualTime(seconds)
    }
}

// ── Epsilon helpers ───────────────────────────────────────────────────

/// Subtract `value` from `var`, snapping the result to zero once it falls
/// below `precision`.
#[inline]
pub fn double_update(var: &mut f64, value: f64, precision: f64) {
    *var -= value;
    if *var < precision {
        *var = 0.0;
    }
}

/// `a` and `b` are within `precision` of each other.
#[inline]
pub fn double_equals(a: f64, b: f64, precision: f64) -> bool {
    (a - b).abs() < precision
}

/// `value` is strictly greater than `precision`.
#[inline]
pub fn double_positive(value: f64, precision: f64) -> bool {
    value > precision
}

/// The date `due` has been reached at `now`, within `precision`.
#[inline]
pub fn reached(now: f64, due: f64, precision: f64) -> bool {
    due <= now + precision
}
