//! Exponentially-decaying sample reservoir for metrics histograms.
//!
//! A [`Reservoir`] keeps a bounded, statistically representative set of recorded values, biased
//! towards the recent past, from which [`Snapshot`]s with percentiles and moments are computed.
//! Time and periodic upkeep are injected through [`ClockSource`] and [`Scheduler`], with
//! [`Mock`] standing in for both in tests.
mod clock;
mod configuration;
mod data;
mod scheduler;

pub use self::{
    clock::{ClockSource, Mock, Monotonic},
    configuration::{Configuration, ConfigurationError},
    data::{default_percentiles, Percentile, Reservoir, Sample, Snapshot},
    scheduler::{Action, Background, Handle, Scheduler},
};
