use super::{Percentile, Sample};

#[derive(Clone, Debug)]
struct Weights {
    normalized: Vec<f64>,
    // Cumulative normalized weight preceding each value.
    cumulative: Vec<f64>,
}

/// A point-in-time view of reservoir data.
///
/// Values are held sorted in ascending order, along with the user value each one was recorded
/// with.  A snapshot is fully detached from whatever produced it.
///
/// Snapshots come in two flavors.  Uniform snapshots, built from plain values, treat every
/// value equally and interpolate linearly between ranks when asked for a percentile.  Weighted
/// snapshots, built from reservoir samples, answer percentiles, means and deviations according
/// to each sample's decay weight, so recent samples count for more than older ones.
#[derive(Clone, Debug)]
pub struct Snapshot<U = ()> {
    values: Vec<i64>,
    user_values: Vec<Option<U>>,
    weights: Option<Weights>,
}

impl<U> Default for Snapshot<U> {
    fn default() -> Self {
        Snapshot {
            values: Vec::new(),
            user_values: Vec::new(),
            weights: None,
        }
    }
}

impl<U> Snapshot<U> {
    /// Creates a uniform snapshot from plain values.
    pub fn from_values<I>(values: I) -> Snapshot<U>
    where
        I: IntoIterator<Item = i64>,
    {
        Self::from_tagged(values.into_iter().map(|v| (v, None)))
    }

    /// Creates a uniform snapshot from values paired with optional user values.
    pub fn from_tagged<I>(tagged: I) -> Snapshot<U>
    where
        I: IntoIterator<Item = (i64, Option<U>)>,
    {
        let mut tagged: Vec<(i64, Option<U>)> = tagged.into_iter().collect();
        tagged.sort_by_key(|(value, _)| *value);

        let (values, user_values) = tagged.into_iter().unzip();
        Snapshot {
            values,
            user_values,
            weights: None,
        }
    }

    /// Creates a weighted snapshot from decay-weighted samples.
    ///
    /// If the weights don't add up to a usable total, such as when every weight has underflowed
    /// to zero, all samples are weighted equally.
    pub fn from_samples(mut samples: Vec<Sample<U>>) -> Snapshot<U> {
        samples.sort_by_key(|s| s.value);

        let total: f64 = samples.iter().map(|s| s.weight).sum();
        let count = samples.len();

        let mut values = Vec::with_capacity(count);
        let mut user_values = Vec::with_capacity(count);
        let mut normalized = Vec::with_capacity(count);
        let mut cumulative = Vec::with_capacity(count);

        let mut running = 0.0;
        for sample in samples {
            let weight = if total > 0.0 && total.is_finite() {
                sample.weight / total
            } else {
                1.0 / count as f64
            };

            values.push(sample.value);
            user_values.push(sample.user_value);
            normalized.push(weight);
            cumulative.push(running);
            running += weight;
        }

        Snapshot {
            values,
            user_values,
            weights: Some(Weights { normalized, cumulative }),
        }
    }

    /// Number of values in this snapshot.
    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether or not percentiles and moments are decay-weighted.
    pub fn is_weighted(&self) -> bool {
        self.weights.is_some()
    }

    /// The values, sorted in ascending order.
    ///
    /// Equal values keep the order they were captured in.
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// The user values, in the same order as `values`.
    pub fn user_values(&self) -> &[Option<U>] {
        &self.user_values
    }

    /// Smallest value, or `0` if empty.
    pub fn min(&self) -> i64 {
        self.values.first().cloned().unwrap_or(0)
    }

    /// Largest value, or `0` if empty.
    pub fn max(&self) -> i64 {
        self.values.last().cloned().unwrap_or(0)
    }

    /// User value recorded alongside the smallest value.
    ///
    /// When several samples share the smallest value, the first one captured wins.
    pub fn min_user_value(&self) -> Option<&U> {
        self.user_values.first().and_then(|u| u.as_ref())
    }

    /// User value recorded alongside the largest value.
    ///
    /// When several samples share the largest value, the first one captured wins.
    pub fn max_user_value(&self) -> Option<&U> {
        let max = *self.values.last()?;
        let first = self.values.partition_point(|&v| v < max);
        self.user_values[first].as_ref()
    }

    /// Arithmetic mean, or `0.0` if empty.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }

        match &self.weights {
            Some(w) => self
                .values
                .iter()
                .zip(&w.normalized)
                .map(|(&v, &nw)| v as f64 * nw)
                .sum(),
            None => self.values.iter().map(|&v| v as f64).sum::<f64>() / self.values.len() as f64,
        }
    }

    /// Population standard deviation, or `0.0` if empty.
    pub fn std_dev(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }

        let mean = self.mean();
        let variance = match &self.weights {
            Some(w) => self
                .values
                .iter()
                .zip(&w.normalized)
                .map(|(&v, &nw)| {
                    let diff = v as f64 - mean;
                    nw * diff * diff
                })
                .sum(),
            None => {
                self.values
                    .iter()
                    .map(|&v| {
                        let diff = v as f64 - mean;
                        diff * diff
                    })
                    .sum::<f64>()
                    / self.values.len() as f64
            },
        };

        variance.sqrt()
    }

    /// Value at the given quantile, from `0.0` to `1.0`.
    ///
    /// Quantiles outside of that range are clamped.  Returns `0.0` if empty.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }

        let p = if p.is_nan() { 0.0 } else { p.max(0.0).min(1.0) };
        let n = self.values.len();

        if let Some(w) = &self.weights {
            // Leading samples may carry no weight at all; the bottom of the range is still the
            // smallest value held.
            if p == 0.0 {
                return self.values[0] as f64;
            }
            let pos = w.cumulative.partition_point(|&q| q <= p).saturating_sub(1);
            return self.values[pos.min(n - 1)] as f64;
        }

        let pos = p * (n + 1) as f64;
        if pos < 1.0 {
            return self.values[0] as f64;
        }
        if pos >= n as f64 {
            return self.values[n - 1] as f64;
        }

        let index = pos as usize;
        let lower = self.values[index - 1] as f64;
        let upper = self.values[index] as f64;
        lower + (pos - pos.floor()) * (upper - lower)
    }

    pub fn median(&self) -> f64 {
        self.percentile(0.5)
    }

    pub fn percentile_75(&self) -> f64 {
        self.percentile(0.75)
    }

    pub fn percentile_95(&self) -> f64 {
        self.percentile(0.95)
    }

    pub fn percentile_98(&self) -> f64 {
        self.percentile(0.98)
    }

    pub fn percentile_99(&self) -> f64 {
        self.percentile(0.99)
    }

    pub fn percentile_999(&self) -> f64 {
        self.percentile(0.999)
    }

    /// Evaluates each of the given percentiles, keyed by their labels.
    ///
    /// `min` and `max` labels map to the actual extremes rather than the quantile lookup.
    pub fn percentiles(&self, percentiles: &[Percentile]) -> Vec<(String, f64)> {
        percentiles
            .iter()
            .map(|p| {
                let value = match p.0.as_str() {
                    "min" => self.min() as f64,
                    "max" => self.max() as f64,
                    _ => self.percentile(p.1),
                };
                (p.0.clone(), value)
            })
            .collect()
    }
}
