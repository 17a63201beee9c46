#[macro_use]
extern crate log;
extern crate decay_reservoir;
extern crate env_logger;
extern crate getopts;

use decay_reservoir::{default_percentiles, Reservoir};
use getopts::Options;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct Generator {
    id: usize,
    reservoir: Arc<Reservoir<usize>>,
    recorded: Arc<AtomicU64>,
    t0: Option<Instant>,
}

impl Generator {
    fn new(id: usize, reservoir: Arc<Reservoir<usize>>, recorded: Arc<AtomicU64>) -> Generator {
        Generator {
            id,
            reservoir,
            recorded,
            t0: None,
        }
    }

    fn run(&mut self) {
        loop {
            let t1 = Instant::now();
            if let Some(t0) = self.t0 {
                let delta = duration_as_nanos(t1 - t0) as i64;
                self.reservoir.update_tagged(delta, self.id);
                self.recorded.fetch_add(1, Ordering::Relaxed);
            }
            self.t0 = Some(t1);
        }
    }
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

pub fn opts() -> Options {
    let mut opts = Options::new();

    opts.optopt("p", "producers", "number of producers", "INTEGER");
    opts.optopt("c", "capacity", "reservoir capacity", "INTEGER");
    opts.optopt("a", "alpha", "decay factor", "FLOAT");
    opts.optopt("d", "duration", "number of seconds to run for", "INTEGER");
    opts.optflag("h", "help", "print this help menu");

    opts
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = &args[0];
    let opts = opts();

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            error!("Failed to parse command line args: {}", f);
            return;
        }
    };

    if matches.opt_present("help") {
        print_usage(program, &opts);
        return;
    }

    info!("reservoir benchmark");

    let capacity: usize = matches.opt_str("capacity").unwrap_or_else(|| "1028".to_owned())
        .parse()
        .unwrap();
    let alpha: f64 = matches.opt_str("alpha").unwrap_or_else(|| "0.015".to_owned())
        .parse()
        .unwrap();
    let producers: usize = matches.opt_str("producers").unwrap_or_else(|| "1".to_owned())
        .parse()
        .unwrap();
    let seconds: u64 = matches.opt_str("duration").unwrap_or_else(|| "60".to_owned())
        .parse()
        .unwrap();

    info!("producers: {}", producers);
    info!("capacity: {}", capacity);
    info!("alpha: {}", alpha);

    let reservoir = match Reservoir::builder().capacity(capacity).alpha(alpha).build() {
        Ok(r) => Arc::new(r),
        Err(e) => {
            error!("Failed to build reservoir: {}", e);
            return;
        }
    };

    info!("reservoir configured");

    // Spin up our sample producers.
    let recorded = Arc::new(AtomicU64::new(0));
    for id in 0..producers {
        let mut generator = Generator::new(id, reservoir.clone(), recorded.clone());
        thread::spawn(move || { generator.run(); });
    }

    // Poll the reservoir to figure out the sample rate.
    let percentiles = default_percentiles();
    let mut total = 0;
    let mut t0 = Instant::now();
    for _ in 0..seconds {
        thread::sleep(Duration::new(1, 0));

        let t1 = Instant::now();
        let turn_total = recorded.load(Ordering::Relaxed);
        let turn_delta = turn_total - total;
        total = turn_total;
        let rate = turn_delta as f64 / (duration_as_nanos(t1 - t0) / 1_000_000_000.0);

        let snapshot = reservoir.get_snapshot();
        let summary = snapshot.percentiles(&percentiles)
            .into_iter()
            .map(|(label, value)| format!("{}: {}", label, value))
            .collect::<Vec<_>>()
            .join(" ");

        info!("rate: {} samples per second", rate);
        info!("latency (ns): {}", summary);
        info!(
            "retained: {} mean: {:.1} stddev: {:.1} slowest producer: {:?}",
            snapshot.size(),
            snapshot.mean(),
            snapshot.std_dev(),
            snapshot.max_user_value()
        );

        t0 = t1;
    }

    reservoir.stop();
    info!("total samples recorded: {}", total);
}

fn duration_as_nanos(d: Duration) -> f64 {
    (d.as_secs() as f64 * 1e9) + d.subsec_nanos() as f64
}
