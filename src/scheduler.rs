use crossbeam_channel::{bounded, select, tick, Sender};
use log::{debug, error};
use std::{
    any::Any,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// A recurring maintenance action.
pub type Action = Arc<dyn Fn() + Send + Sync>;

/// Runs an action once per interval until the returned `Handle` is stopped.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, interval: Duration, action: Action) -> io::Result<Handle>;
}

impl<T: Scheduler + ?Sized> Scheduler for Arc<T> {
    fn schedule(&self, interval: Duration, action: Action) -> io::Result<Handle> {
        (**self).schedule(interval, action)
    }
}

/// Registration of a scheduled action.
///
/// Stopping is idempotent, and once `stop` returns the action will not be invoked again.  A
/// handle that is dropped stops itself.
pub struct Handle {
    stopped: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Handle {
    pub(crate) fn new(stopped: Arc<AtomicBool>) -> Handle {
        Handle {
            stopped,
            stop_tx: None,
            thread: None,
        }
    }

    fn with_thread(stopped: Arc<AtomicBool>, stop_tx: Sender<()>, thread: JoinHandle<()>) -> Handle {
        Handle {
            stopped,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }
    }

    /// Whether or not this handle has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Cancels the scheduled action.
    ///
    /// For a background task, this waits for an in-flight invocation to finish, unless called
    /// from the action itself.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);

        // Disconnecting the stop channel wakes the worker out of its select.
        drop(self.stop_tx.take());

        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                if let Err(e) = thread.join() {
                    error!("upkeep task panicked: {}", panic_message(&*e));
                }
            }
        }
    }
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic payload"
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Scheduler that runs each action on a dedicated background thread.
#[derive(Clone, Default)]
pub struct Background;

impl Background {
    pub fn new() -> Background {
        Background {}
    }
}

impl Scheduler for Background {
    fn schedule(&self, interval: Duration, action: Action) -> io::Result<Handle> {
        if interval == Duration::from_secs(0) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "interval must be non-zero"));
        }

        let stopped = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let worker_stopped = stopped.clone();
        let thread = thread::Builder::new()
            .name("reservoir-upkeep".to_owned())
            .spawn(move || {
                debug!("upkeep task started with interval {:?}", interval);
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            if worker_stopped.load(Ordering::Acquire) {
                                break;
                            }
                            action();
                        },
                    }
                }
                debug!("upkeep task stopped");
            })?;

        Ok(Handle::with_thread(stopped, stop_tx, thread))
    }
}

#[cfg(test)]
mod tests {
    use super::{panic_message, Action, Background, Scheduler};
    use std::{
        any::Any,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    #[test]
    fn test_background_runs_action() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let action: Action = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut handle = Background::new().schedule(Duration::from_millis(5), action).unwrap();

        let mut waited = 0;
        while calls.load(Ordering::SeqCst) < 2 && waited < 200 {
            thread::sleep(Duration::from_millis(10));
            waited += 1;
        }
        handle.stop();

        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_background_stop_is_final() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let action: Action = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut handle = Background::new().schedule(Duration::from_millis(1), action).unwrap();
        thread::sleep(Duration::from_millis(20));

        handle.stop();
        assert!(handle.is_stopped());
        let after_stop = calls.load(Ordering::SeqCst);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);

        // Stopping again is a no-op.
        handle.stop();
        assert!(handle.is_stopped());
    }

    #[test]
    fn test_background_stop_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let action: Action = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let handle = Background::new().schedule(Duration::from_millis(1), action).unwrap();
        thread::sleep(Duration::from_millis(10));
        drop(handle);

        let after_drop = calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), after_drop);
    }

    #[test]
    fn test_background_stop_after_action_panics() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let action: Action = Arc::new(move || {
            flag.store(true, Ordering::SeqCst);
            panic!("rescale failed");
        });

        let mut handle = Background::new().schedule(Duration::from_millis(1), action).unwrap();

        let mut waited = 0;
        while !ran.load(Ordering::SeqCst) && waited < 200 {
            thread::sleep(Duration::from_millis(10));
            waited += 1;
        }
        assert!(ran.load(Ordering::SeqCst));

        // The worker died with the panic; stopping reaps it without propagating.
        handle.stop();
        assert!(handle.is_stopped());
        handle.stop();
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");

        let payload: Box<dyn Any + Send> = Box::new(format!("owned {}", 1));
        assert_eq!(panic_message(&*payload), "owned 1");

        let payload: Box<dyn Any + Send> = Box::new(7);
        assert_eq!(panic_message(&*payload), "unknown panic payload");
    }
}
