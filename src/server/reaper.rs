use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{debug, info};

use crate::error::ServerError;

/// Background thread running a task at a fixed rate.
///
/// The first tick runs immediately. Cancelling stops future ticks and waits
/// for one in progress to finish.
#[derive(Debug)]
pub struct Reaper {
    name: String,
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    pub fn start<F>(name: &str, period: Duration, mut tick: F) -> Result<Self, ServerError>
    where
        F: FnMut() + Send + 'static,
    {
        let (cancel, cancelled) = bounded::<()>(1);
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!(reaper = %thread_name, ?period, "reaper started");
                let mut next = Instant::now();
                loop {
                    tick();
                    next += period;
                    match cancelled.recv_deadline(next) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!(reaper = %thread_name, "reaper stopped");
            })
            .map_err(|source| ServerError::Spawn {
                name: name.to_string(),
                source,
            })?;

        info!(reaper = name, ?period, "scheduled");
        Ok(Self {
            name: name.to_string(),
            cancel: Some(cancel),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&mut self) {
        drop(self.cancel.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.cancel();
    }
}
