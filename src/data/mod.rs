pub mod reservoir;
pub mod snapshot;

pub use self::{reservoir::Reservoir, snapshot::Snapshot};

/// A recorded value.
///
/// `weight` is the forward-decay weight the value was recorded with, relative to the landmark
/// of the reservoir it came from.  Values that did not come from a reservoir carry a weight of
/// `1.0`.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample<U> {
    pub value: i64,
    pub user_value: Option<U>,
    pub weight: f64,
}

impl<U> Sample<U> {
    pub fn new(value: i64, user_value: Option<U>, weight: f64) -> Sample<U> {
        Sample {
            value,
            user_value,
            weight,
        }
    }
}

/// A labeled percentile.
///
/// Built from a floating-point value from 0 to 100, with a string label to be used for
/// displaying the given percentile.  The stored value is the equivalent quantile, from 0 to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct Percentile(pub String, pub f64);

impl From<f64> for Percentile {
    fn from(p: f64) -> Self {
        // Force our value between +0.0 and +100.0.
        let clamped = if p.is_nan() { 0.0 } else { p.max(0.0).min(100.0) };

        let raw_label = format!("{}", clamped);
        let label = match raw_label.as_str() {
            "0" => "min".to_string(),
            "100" => "max".to_string(),
            _ => {
                let raw = format!("p{}", clamped);
                raw.replace(".", "")
            },
        };

        Percentile(label, clamped / 100.0)
    }
}

/// The percentiles reported for a histogram when nothing else is asked for.
pub fn default_percentiles() -> Vec<Percentile> {
    vec![
        Percentile::from(0.0),
        Percentile::from(50.0),
        Percentile::from(75.0),
        Percentile::from(95.0),
        Percentile::from(98.0),
        Percentile::from(99.0),
        Percentile::from(99.9),
        Percentile::from(100.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::{default_percentiles, Percentile};

    #[test]
    fn test_percentiles() {
        let min_p = Percentile::from(0.0);
        assert_eq!(min_p.0, "min");

        let max_p = Percentile::from(100.0);
        assert_eq!(max_p.0, "max");
        assert_eq!(max_p.1, 1.0);

        let clamped_min_p = Percentile::from(-20.0);
        assert_eq!(clamped_min_p.0, "min");
        assert_eq!(clamped_min_p.1, 0.0);

        let clamped_max_p = Percentile::from(1442.0);
        assert_eq!(clamped_max_p.0, "max");
        assert_eq!(clamped_max_p.1, 1.0);

        let p99_p = Percentile::from(99.0);
        assert_eq!(p99_p.0, "p99");
        assert_eq!(p99_p.1, 0.99);

        let p999_p = Percentile::from(99.9);
        assert_eq!(p999_p.0, "p999");

        let p9999_p = Percentile::from(99.99);
        assert_eq!(p9999_p.0, "p9999");

        let nan_p = Percentile::from(std::f64::NAN);
        assert_eq!(nan_p.0, "min");
    }

    #[test]
    fn test_default_percentiles() {
        let labels: Vec<String> = default_percentiles().into_iter().map(|p| p.0).collect();
        assert_eq!(labels, vec!["min", "p50", "p75", "p95", "p98", "p99", "p999", "max"]);
    }
}
