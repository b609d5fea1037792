use std::{
    sync::{mpsc::RecvTimeoutError, Arc, Condvar, Mutex},
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::{
    flag::{FlagFormat, FlagSet},
    reader::FlagReader,
    store::FlagStore,
    Error, Result,
};

pub(crate) struct PollerThreadConfig {
    pub store: Arc<FlagStore>,
    pub reader: Box<dyn FlagReader + Send>,
    pub format: FlagFormat,
    pub interval: Duration,
}

/// A flag poller thread.
///
/// Use [`Engine::start_poller_thread`](crate::Engine::start_poller_thread) to get an instance of it.
pub struct PollerThread {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the poller thread.
    stop_sender: std::sync::mpsc::Sender<()>,

    /// Holds `None` until the first read attempt finishes. Holds `Some(Ok(()))` once flags have
    /// been loaded. Holds `Some(Err(...))` if the first attempt failed and nothing was loaded
    /// since.
    result: Arc<(Mutex<Option<Result<()>>>, Condvar)>,
}

/// Maximum jitter as a fraction of the interval.
const POLL_JITTER_RATIO: f64 = 0.1;

impl PollerThread {
    pub(crate) fn start(config: PollerThreadConfig) -> Result<PollerThread> {
        let (stop_sender, stop_receiver) = std::sync::mpsc::channel::<()>();

        let result = Arc::new((Mutex::new(None), Condvar::new()));

        let join_handle = {
            // Cloning Arc for move into thread
            let result = Arc::clone(&result);
            let update_result = move |value: Result<()>| {
                let mut lock = result.0.lock().unwrap_or_else(|err| err.into_inner());
                // A later failure must not hide flags that were already loaded.
                if value.is_ok() || !matches!(*lock, Some(Ok(()))) {
                    *lock = Some(value);
                }
                result.1.notify_all();
            };

            std::thread::Builder::new()
                .name("flags-poller".to_owned())
                .spawn(move || loop {
                    log::debug!(target: "flags", "reading flags");
                    match refresh(&config) {
                        Ok(()) => update_result(Ok(())),
                        Err(Error::Unauthorized) => {
                            log::warn!(target: "flags", "flag source rejected read token");
                            update_result(Err(Error::Unauthorized));
                            // Token is not valid and thus is not recoverable.
                            return;
                        }
                        Err(err) => {
                            // Keep serving the previous snapshot and try again later.
                            log::warn!(target: "flags", "failed to refresh flags: {:?}", err);
                            update_result(Err(err));
                        }
                    }

                    let timeout = jitter(config.interval, POLL_JITTER_RATIO);
                    match stop_receiver.recv_timeout(timeout) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) => {
                            log::debug!(target: "flags", "poller thread received stop command");
                            return;
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            // When the other end of channel disconnects, calls to
                            // .recv_timeout() return immediately. Use normal thread sleep in
                            // this case.
                            std::thread::sleep(timeout);
                        }
                    }
                })?
        };

        Ok(PollerThread {
            join_handle,
            stop_sender,
            result,
        })
    }

    /// Block until the first read attempt finishes.
    ///
    /// Returns the error of that attempt if it failed and no later attempt has succeeded yet.
    pub fn wait_for_configuration(&self) -> Result<()> {
        let mut lock = self
            .result
            .0
            .lock()
            .map_err(|_| Error::PollerThreadPanicked)?;
        loop {
            match &*lock {
                Some(result) => return result.clone(),
                None => {
                    lock = self
                        .result
                        .1
                        .wait(lock)
                        .map_err(|_| Error::PollerThreadPanicked)?;
                }
            }
        }
    }

    /// Stop the poller thread.
    ///
    /// This function does not wait for the thread to actually stop.
    pub fn stop(&self) {
        // Error means that the receiver was dropped (thread exited). Ignoring it as there's nothing
        // useful we can do.
        let _ = self.stop_sender.send(());
    }

    /// Stop the poller thread and block waiting for it to exit.
    ///
    /// If you don't need to wait for the thread to exit, use [`PollerThread::stop`] instead.
    pub fn shutdown(self) -> Result<()> {
        self.stop();

        self.join_handle
            .join()
            .map_err(|_| Error::PollerThreadPanicked)?;

        Ok(())
    }
}

/// Read, validate and install one snapshot.
fn refresh(config: &PollerThreadConfig) -> Result<()> {
    let bytes = config.reader.read()?;
    let flags = FlagSet::from_slice(&bytes, config.format)?;

    let diff = config.store.snapshot().diff(&flags);
    if !diff.is_empty() {
        log::info!(target: "flags",
                   added:serde = diff.added,
                   deleted:serde = diff.deleted,
                   updated:serde = diff.updated;
                   "flags changed");
    }

    config.store.set_flags(flags);
    log::debug!(target: "flags", count = config.store.snapshot().len(); "installed flags");
    Ok(())
}

/// Apply a random jitter of up to `ratio * interval` to `interval`.
fn jitter(interval: Duration, ratio: f64) -> Duration {
    let max = interval.mul_f64(ratio);
    if max.is_zero() {
        return interval;
    }
    interval + thread_rng().gen_range(Duration::ZERO..max)
}
