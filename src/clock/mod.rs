use std::{sync::Arc, time::Duration};

mod monotonic;
pub use self::monotonic::Monotonic;
mod mock;
pub use self::mock::Mock;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// A source of monotonic time, in nanoseconds.
///
/// The origin of the returned value is arbitrary and only differences between two readings of
/// the same source are meaningful.  Successive readings never go backwards.
pub trait ClockSource: Send + Sync {
    fn now(&self) -> u64;
}

impl<T: ClockSource + ?Sized> ClockSource for Arc<T> {
    fn now(&self) -> u64 {
        (**self).now()
    }
}

/// Converts a duration into whole nanoseconds, saturating at `u64::MAX`.
pub(crate) fn duration_as_nanos(d: Duration) -> u64 {
    d.as_secs()
        .saturating_mul(1_000_000_000)
        .saturating_add(u64::from(d.subsec_nanos()))
}

/// Converts a nanosecond delta into fractional seconds.
pub(crate) fn nanos_to_secs(delta: u64) -> f64 {
    delta as f64 / NANOS_PER_SEC
}

#[cfg(test)]
mod tests {
    use super::{duration_as_nanos, nanos_to_secs, ClockSource, Mock, Monotonic};
    use std::{sync::Arc, time::Duration};

    #[test]
    fn test_monotonic_never_goes_backwards() {
        let clock = Monotonic::new();
        let mut last = clock.now();
        for _ in 0..10_000 {
            let now = clock.now();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_arc_clock_source() {
        let mock = Arc::new(Mock::new());
        let source: Arc<dyn ClockSource> = mock.clone();
        mock.advance(Duration::from_millis(5));
        assert_eq!(source.now(), 5_000_000);
    }

    #[test]
    fn test_nanos_to_secs() {
        assert_eq!(nanos_to_secs(0), 0.0);
        assert_eq!(nanos_to_secs(1_500_000_000), 1.5);
    }

    #[test]
    fn test_duration_as_nanos() {
        assert_eq!(duration_as_nanos(Duration::from_millis(1500)), 1_500_000_000);
        assert_eq!(duration_as_nanos(Duration::from_secs(u64::max_value())), u64::max_value());
    }
}
