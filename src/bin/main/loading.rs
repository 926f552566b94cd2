use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, Sender},
    time::Duration,
};

use anyhow::{Result, anyhow, bail};
use bookbits_core::buffer::{BufferError, BufferListener};

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) enum LoadingEvent {
    Loaded,
    Failed(String),
}

/// Forwards buffer completion callbacks to the console thread.
pub(super) struct LoadingListener {
    events: Sender<LoadingEvent>,
}

impl LoadingListener {
    pub fn new(events: Sender<LoadingEvent>) -> Self {
        Self { events }
    }

    fn send(&self, event: LoadingEvent) {
        let _ = self.events.send(event);
    }
}

impl BufferListener for LoadingListener {
    fn on_buffer_loaded(&self) {
        self.send(LoadingEvent::Loaded);
    }

    fn on_buffer_error(&self, error: &BufferError) {
        self.send(LoadingEvent::Failed(error.to_string()));
    }
}

/// Blocks until the pending window load reports back.
pub(super) fn await_load(events: &Receiver<LoadingEvent>) -> Result<()> {
    match events.recv_timeout(LOAD_TIMEOUT) {
        Ok(LoadingEvent::Loaded) => Ok(()),
        Ok(LoadingEvent::Failed(message)) => Err(anyhow!(message)),
        Err(RecvTimeoutError::Timeout) => {
            bail!("buffer load did not finish within {:?}", LOAD_TIMEOUT)
        }
        Err(RecvTimeoutError::Disconnected) => bail!("buffer worker stopped"),
    }
}
