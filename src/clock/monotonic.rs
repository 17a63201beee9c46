use crate::clock::ClockSource;

/// The system monotonic clock.
#[derive(Clone, Debug)]
pub struct Monotonic {
    #[cfg(windows)]
    freq: u64,
    #[cfg(not(any(unix, windows)))]
    origin: std::time::Instant,
}

impl Default for Monotonic {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl Monotonic {
    pub fn new() -> Monotonic {
        Monotonic {}
    }
}

#[cfg(unix)]
impl ClockSource for Monotonic {
    fn now(&self) -> u64 {
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        (ts.tv_sec as u64 * 1_000_000_000) + ts.tv_nsec as u64
    }
}

#[cfg(windows)]
impl Monotonic {
    pub fn new() -> Monotonic {
        use std::mem;
        use winapi::{shared::ntdef::LARGE_INTEGER, um::profileapi};

        let freq = unsafe {
            let mut freq: LARGE_INTEGER = mem::zeroed();
            profileapi::QueryPerformanceFrequency(&mut freq);
            *freq.QuadPart() as u64
        };

        Monotonic { freq }
    }
}

#[cfg(windows)]
impl ClockSource for Monotonic {
    fn now(&self) -> u64 {
        use std::mem;
        use winapi::{shared::ntdef::LARGE_INTEGER, um::profileapi};

        let raw = unsafe {
            let mut count: LARGE_INTEGER = mem::zeroed();
            profileapi::QueryPerformanceCounter(&mut count);
            *count.QuadPart() as u64
        };

        // Split the conversion so the multiplication can't overflow for long uptimes.
        let secs = raw / self.freq;
        let rem = raw % self.freq;
        secs * 1_000_000_000 + (rem * 1_000_000_000) / self.freq
    }
}

#[cfg(not(any(unix, windows)))]
impl Monotonic {
    pub fn new() -> Monotonic {
        Monotonic {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(not(any(unix, windows)))]
impl ClockSource for Monotonic {
    fn now(&self) -> u64 {
        let elapsed = self.origin.elapsed();
        elapsed.as_secs() * 1_000_000_000 + u64::from(elapsed.subsec_nanos())
    }
}
