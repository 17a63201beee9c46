use super::{Sample, Snapshot};
use crate::{
    clock::{duration_as_nanos, nanos_to_secs, ClockSource},
    configuration::{Configuration, ConfigurationError},
    scheduler::{Action, Handle},
};
use fnv::FnvBuildHasher;
use hashbrown::HashMap;
use log::{debug, trace};
use parking_lot::Mutex;
use rand::Rng;
use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    mem,
    sync::Arc,
};

/// Number of times a colliding priority is redrawn before the existing sample is overwritten.
const COLLISION_RETRIES: usize = 3;

/// A sampling priority, totally ordered.
#[derive(Clone, Copy, Debug)]
struct Priority(f64);

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

struct State<U> {
    // Keyed by the bit pattern of each sample's priority.  `order` holds exactly the same set of
    // priorities, lowest on top.
    samples: HashMap<u64, Sample<U>, FnvBuildHasher>,
    order: BinaryHeap<Reverse<Priority>>,
    count: u64,
    landmark: u64,
    next_rescale: u64,
}

impl<U> State<U> {
    fn new(capacity: usize, landmark: u64, next_rescale: u64) -> State<U> {
        State {
            samples: HashMap::with_capacity_and_hasher(capacity, FnvBuildHasher::default()),
            order: BinaryHeap::with_capacity(capacity),
            count: 0,
            landmark,
            next_rescale,
        }
    }

    fn contains(&self, priority: f64) -> bool {
        self.samples.contains_key(&priority.to_bits())
    }

    /// Stores a sample under the given priority, returning `true` if it replaced another.
    fn insert(&mut self, priority: f64, sample: Sample<U>) -> bool {
        match self.samples.insert(priority.to_bits(), sample) {
            Some(_) => true,
            None => {
                self.order.push(Reverse(Priority(priority)));
                false
            },
        }
    }

    fn min_priority(&self) -> Option<Priority> {
        self.order.peek().map(|Reverse(p)| *p)
    }

    fn evict_min(&mut self) {
        if let Some(Reverse(p)) = self.order.pop() {
            self.samples.remove(&p.0.to_bits());
        }
    }
}

struct Inner<U> {
    state: Mutex<State<U>>,
    clock: Arc<dyn ClockSource>,
    capacity: usize,
    alpha: f64,
    rescale_interval: u64,
}

impl<U: Clone> Inner<U> {
    fn weight(&self, elapsed: u64) -> f64 {
        (self.alpha * nanos_to_secs(elapsed)).exp()
    }

    fn update<R: Rng>(&self, rng: &mut R, value: i64, user_value: Option<U>) {
        let mut state = self.state.lock();

        let now = self.clock.now();
        let weight = self.weight(now.saturating_sub(state.landmark));
        let priority = draw_priority(&state, weight, rng);

        state.count += 1;
        let sample = Sample::new(value, user_value, weight);
        if state.samples.len() < self.capacity {
            state.insert(priority, sample);
        } else if let Some(min) = state.min_priority() {
            // An overwrite already leaves us at capacity.
            if Priority(priority) > min && !state.insert(priority, sample) {
                state.evict_min();
            }
        }

        let now = self.clock.now();
        if now >= state.next_rescale {
            trace!("rescale overdue by {}ns, rescaling inline", now - state.next_rescale);
            self.rescale_locked(&mut state, now);
        }
    }

    fn rescale(&self) {
        let mut state = self.state.lock();
        let now = self.clock.now();
        self.rescale_locked(&mut state, now);
    }

    // Priorities that collide once scaled keep only the last sample reinserted.  After a long
    // enough idle period every scaled priority underflows to zero and the reservoir collapses to
    // a single sample.
    fn rescale_locked(&self, state: &mut State<U>, now: u64) {
        let factor = (-self.alpha * nanos_to_secs(now.saturating_sub(state.landmark))).exp();

        let before = state.samples.len();
        let old = mem::replace(
            &mut state.samples,
            HashMap::with_capacity_and_hasher(self.capacity, FnvBuildHasher::default()),
        );
        state.order.clear();

        for (key, mut sample) in old {
            sample.weight *= factor;
            state.insert(f64::from_bits(key) * factor, sample);
        }

        debug!(
            "rescaled {} samples by {:e} after {} updates, {} lost to collisions",
            before,
            factor,
            state.count,
            before - state.samples.len()
        );

        state.count = 0;
        state.landmark = state.landmark.max(now);
        state.next_rescale = state.landmark.saturating_add(self.rescale_interval);
    }

    fn samples(&self) -> Vec<Sample<U>> {
        let state = self.state.lock();
        state.samples.values().cloned().collect()
    }
}

// Uniform over (0, 1], so the priority division is always defined.
fn uniform<R: Rng>(rng: &mut R) -> f64 {
    1.0 - rng.gen::<f64>()
}

// Redraws up to `COLLISION_RETRIES` times while the priority is already taken.  The last draw is
// returned even if it still collides.
fn draw_priority<U, R: Rng>(state: &State<U>, weight: f64, rng: &mut R) -> f64 {
    let mut priority = weight / uniform(rng);
    let mut retries = 0;
    while state.contains(priority) && retries < COLLISION_RETRIES {
        priority = weight / uniform(rng);
        retries += 1;
    }
    priority
}

/// An exponentially-decaying reservoir of samples.
///
/// Holds a bounded, statistically representative set of the values recorded into it, biased
/// towards recent values using forward decay: every value is weighted by `exp(alpha * t)`,
/// where `t` is the time since the reservoir's landmark, and retained by a priority of that
/// weight divided by a uniform random number.  When full, a new value displaces the sample with
/// the lowest priority, or is dropped if its own priority is lower still.
///
/// Weights grow without bound as time passes, so the reservoir periodically rescales: the
/// landmark moves to the present and every stored priority and weight is scaled down to match.
/// Rescaling runs on the configured scheduler and, should the scheduler fall behind, inline
/// from `update`.
///
/// All operations are safe to call concurrently.  The scheduled rescale is cancelled when the
/// reservoir is stopped or dropped.
pub struct Reservoir<U = ()> {
    inner: Arc<Inner<U>>,
    handle: Mutex<Handle>,
}

impl<U: Clone + Send + 'static> Reservoir<U> {
    /// Creates a reservoir with the default configuration.
    pub fn new() -> Result<Reservoir<U>, ConfigurationError> {
        Configuration::new().build()
    }

    /// Gets a builder to configure a `Reservoir` instance with.
    pub fn builder() -> Configuration<U> {
        Configuration::new()
    }

    pub(crate) fn from_config(conf: Configuration<U>) -> Result<Reservoir<U>, ConfigurationError> {
        conf.validate()?;

        let interval = conf.effective_rescale_interval();
        if interval < conf.rescale_interval {
            debug!(
                "alpha {} would overflow weights within {:?}, rescaling every {:?} instead",
                conf.alpha, conf.rescale_interval, interval
            );
        }

        let landmark = conf.clock.now();
        let rescale_interval = duration_as_nanos(interval);
        let inner = Arc::new(Inner {
            state: Mutex::new(State::new(
                conf.capacity,
                landmark,
                landmark.saturating_add(rescale_interval),
            )),
            clock: conf.clock,
            capacity: conf.capacity,
            alpha: conf.alpha,
            rescale_interval,
        });

        let upkeep = Arc::downgrade(&inner);
        let action: Action = Arc::new(move || {
            if let Some(inner) = upkeep.upgrade() {
                inner.rescale();
            }
        });
        let handle = conf
            .scheduler
            .schedule(interval, action)
            .map_err(ConfigurationError::Scheduler)?;

        debug!(
            "created reservoir with capacity {} and alpha {}",
            conf.capacity, conf.alpha
        );

        Ok(Reservoir {
            inner,
            handle: Mutex::new(handle),
        })
    }

    /// Records a value.
    pub fn update(&self, value: i64) {
        self.inner.update(&mut rand::thread_rng(), value, None)
    }

    /// Records a value along with a user value that travels with it into snapshots.
    pub fn update_tagged(&self, value: i64, user_value: U) {
        self.inner.update(&mut rand::thread_rng(), value, Some(user_value))
    }

    /// Rebases the landmark to the current time, scaling down every stored sample.
    ///
    /// This normally happens on its own.
    pub fn rescale(&self) {
        self.inner.rescale()
    }

    /// Number of samples currently held.
    pub fn size(&self) -> usize {
        self.inner.state.lock().samples.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn alpha(&self) -> f64 {
        self.inner.alpha
    }

    /// Takes a weighted snapshot of the samples currently held.
    ///
    /// Only the copy happens under the lock; sorting and weighting happen afterwards.
    pub fn get_snapshot(&self) -> Snapshot<U> {
        Snapshot::from_samples(self.inner.samples())
    }

    /// Cancels scheduled rescaling.
    ///
    /// The reservoir remains usable afterwards, rescaling only from `update`.
    pub fn stop(&self) {
        let mut handle = self.handle.lock();
        if !handle.is_stopped() {
            debug!("stopping reservoir upkeep");
        }
        handle.stop();
    }

    /// Whether or not scheduled rescaling has been cancelled.
    pub fn is_stopped(&self) -> bool {
        self.handle.lock().is_stopped()
    }
}
