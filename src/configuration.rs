use crate::{
    clock::{ClockSource, Monotonic},
    data::Reservoir,
    scheduler::{Background, Scheduler},
};
use std::{error, fmt, io, marker::PhantomData, sync::Arc, time::Duration};

/// Largest exponent a sample weight may reach before a rescale.
///
/// `exp` overflows past roughly 709.78, and a priority divides the weight by a uniform draw that
/// can be as small as 2^-53, so this stays well below both.
pub(crate) const MAX_EXPONENT: f64 = 600.0;

/// Largest accepted decay factor.  Keeps the capped rescale interval at one millisecond or more.
pub(crate) const MAX_ALPHA: f64 = MAX_EXPONENT * 1_000.0;

/// Errors during reservoir creation.
#[derive(Debug)]
pub enum ConfigurationError {
    /// The capacity was zero.
    InvalidCapacity(usize),

    /// The decay factor was not positive or exceeded the largest supported value.
    InvalidAlpha(f64),

    /// The rescale interval was zero.
    InvalidRescaleInterval(Duration),

    /// The scheduler could not register the rescale task.
    Scheduler(io::Error),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigurationError::InvalidCapacity(c) => write!(f, "capacity must be positive, got {}", c),
            ConfigurationError::InvalidAlpha(a) => {
                write!(f, "alpha must be positive and at most {}, got {}", MAX_ALPHA, a)
            },
            ConfigurationError::InvalidRescaleInterval(i) => {
                write!(f, "rescale interval must be non-zero, got {:?}", i)
            },
            ConfigurationError::Scheduler(e) => write!(f, "failed to schedule rescale: {}", e),
        }
    }
}

impl error::Error for ConfigurationError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ConfigurationError::Scheduler(e) => Some(e),
            _ => None,
        }
    }
}

/// A configuration builder for `Reservoir`.
#[derive(Clone)]
pub struct Configuration<U = ()> {
    user_value_type: PhantomData<U>,
    pub(crate) capacity: usize,
    pub(crate) alpha: f64,
    pub(crate) rescale_interval: Duration,
    pub(crate) clock: Arc<dyn ClockSource>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
}

impl<U> Default for Configuration<U> {
    fn default() -> Configuration<U> {
        Configuration {
            user_value_type: PhantomData::<U>,
            capacity: 1028,
            alpha: 0.015,
            rescale_interval: Duration::from_secs(60 * 60),
            clock: Arc::new(Monotonic::new()),
            scheduler: Arc::new(Background::new()),
        }
    }
}

impl<U: Clone + Send + 'static> Configuration<U> {
    /// Creates a new `Configuration` with default values.
    pub fn new() -> Configuration<U> {
        Default::default()
    }

    /// Sets the reservoir capacity.
    ///
    /// Defaults to `1028`.
    ///
    /// This is the most samples the reservoir will ever hold.  With the default decay factor,
    /// a capacity of 1028 offers a 99.9% confidence level with a 5% margin of error, assuming a
    /// normal distribution.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the decay factor.
    ///
    /// Defaults to `0.015`.
    ///
    /// Higher values bias the reservoir more heavily towards recent samples.  The default heavily
    /// biases the reservoir towards the last five minutes of samples.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets how often the reservoir rebases its landmark time.
    ///
    /// Defaults to one hour.
    ///
    /// Between rescales, the weight of new samples grows exponentially with the time elapsed
    /// since the landmark.  When `alpha * interval` would let weights grow past the range of an
    /// `f64`, the reservoir rescales more often than asked, every `600 / alpha` seconds.
    pub fn rescale_interval(mut self, interval: Duration) -> Self {
        self.rescale_interval = interval;
        self
    }

    /// Sets the clock the reservoir reads time from.
    ///
    /// Defaults to the system monotonic clock.
    pub fn clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the scheduler that drives periodic rescaling.
    ///
    /// Defaults to a dedicated background thread per reservoir.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        if self.capacity == 0 {
            return Err(ConfigurationError::InvalidCapacity(self.capacity));
        }

        if !(self.alpha > 0.0 && self.alpha <= MAX_ALPHA) {
            return Err(ConfigurationError::InvalidAlpha(self.alpha));
        }

        if self.rescale_interval == Duration::from_secs(0) {
            return Err(ConfigurationError::InvalidRescaleInterval(self.rescale_interval));
        }

        Ok(())
    }

    /// The interval rescaling actually runs at: the configured one, shortened if needed so that
    /// weights never grow past `exp(MAX_EXPONENT)`.
    pub(crate) fn effective_rescale_interval(&self) -> Duration {
        let limit = MAX_EXPONENT / self.alpha;
        if self.rescale_interval.as_secs_f64() > limit {
            Duration::from_secs_f64(limit)
        } else {
            self.rescale_interval
        }
    }

    /// Create a `Reservoir` based on this configuration.
    pub fn build(self) -> Result<Reservoir<U>, ConfigurationError> {
        Reservoir::from_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{Configuration, ConfigurationError, MAX_ALPHA};
    use crate::clock::Mock;
    use std::{error::Error, sync::Arc, time::Duration};

    fn mocked() -> Configuration {
        let mock = Mock::new();
        Configuration::new().clock(Arc::new(mock.clone())).scheduler(Arc::new(mock))
    }

    #[test]
    fn test_defaults() {
        let config: Configuration = Configuration::new();
        assert_eq!(config.capacity, 1028);
        assert_eq!(config.alpha, 0.015);
        assert_eq!(config.rescale_interval, Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_capacity() {
        match mocked().capacity(0).build() {
            Err(ConfigurationError::InvalidCapacity(0)) => {},
            _ => panic!("expected invalid capacity"),
        }
    }

    #[test]
    fn test_invalid_alpha() {
        for alpha in &[0.0, -0.015, std::f64::NAN, std::f64::INFINITY, MAX_ALPHA * 2.0] {
            match mocked().alpha(*alpha).build() {
                Err(ConfigurationError::InvalidAlpha(_)) => {},
                _ => panic!("expected invalid alpha for {}", alpha),
            }
        }
    }

    #[test]
    fn test_large_alpha_shortens_rescale_interval() {
        let config: Configuration = Configuration::new();
        assert_eq!(config.effective_rescale_interval(), Duration::from_secs(3600));

        let config: Configuration = Configuration::new().alpha(1.0);
        assert_eq!(config.effective_rescale_interval(), Duration::from_secs(600));

        let config: Configuration = Configuration::new().alpha(1.0).rescale_interval(Duration::from_secs(60));
        assert_eq!(config.effective_rescale_interval(), Duration::from_secs(60));

        let config: Configuration = Configuration::new().alpha(MAX_ALPHA);
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_rescale_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_invalid_rescale_interval() {
        match mocked().rescale_interval(Duration::from_secs(0)).build() {
            Err(ConfigurationError::InvalidRescaleInterval(_)) => {},
            _ => panic!("expected invalid rescale interval"),
        }
    }

    #[test]
    fn test_invalid_config_registers_nothing() {
        let mock = Mock::new();
        let result = Configuration::<()>::new()
            .capacity(0)
            .clock(Arc::new(mock.clone()))
            .scheduler(Arc::new(mock.clone()))
            .build();

        assert!(result.is_err());
        assert_eq!(mock.pending_tasks(), 0);
    }

    #[test]
    fn test_error_display() {
        let err = ConfigurationError::InvalidCapacity(0);
        assert_eq!(err.to_string(), "capacity must be positive, got 0");
        assert!(err.source().is_none());

        let err = ConfigurationError::Scheduler(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(err.to_string(), "failed to schedule rescale: boom");
        assert!(err.source().is_some());
    }
}
