//! Pairing Presenter - shows the pairing URI (QR modal, terminal, log)

use std::sync::Mutex;

pub trait PairingPresenter: Send + Sync {
    fn open(&self, uri: &str);
    fn close(&self);
}

/// Emits the URI through `tracing`. Headless hosts copy it from the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl PairingPresenter for LogPresenter {
    fn open(&self, uri: &str) { tracing::info!(%uri, "scan or paste this pairing URI in your wallet"); }
    fn close(&self) { tracing::debug!("pairing URI dismissed"); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterEvent {
    Opened(String),
    Closed,
}

/// Keeps the open/close history.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<PresenterEvent>>,
}

impl RecordingPresenter {
    pub fn new() -> Self { Self::default() }

    pub fn events(&self) -> Vec<PresenterEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn last_uri(&self) -> Option<String> {
        self.events().into_iter().rev().find_map(|e| match e {
            PresenterEvent::Opened(uri) => Some(uri),
            PresenterEvent::Closed => None,
        })
    }

    /// True while the most recent event is an open.
    pub fn is_open(&self) -> bool {
        matches!(self.events().last(), Some(PresenterEvent::Opened(_)))
    }

    fn push(&self, event: PresenterEvent) {
        if let Ok(mut events) = self.events.lock() { events.push(event); }
    }
}

impl PairingPresenter for RecordingPresenter {
    fn open(&self, uri: &str) { self.push(PresenterEvent::Opened(uri.to_string())); }
    fn close(&self) { self.push(PresenterEvent::Closed); }
}
