//! Scripted backend for tests and demos
//!
//! Records every call it receives and emits whatever events the test
//! scripts through it, so controller behavior can be driven without a live
//! recording engine.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{BackendEvent, BackendEventReceiver, BackendEventSender, BackendSettings, RecordingBackend};
use crate::error::{BackendError, ConnectError};

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<String>,
    output_dir: Option<PathBuf>,
    recording_active: bool,
    fail_connect: bool,
    fail_start: bool,
    fail_stop: bool,
    settings: BackendSettings,
}

/// A [`RecordingBackend`] driven entirely by the test
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    events: BackendEventSender,
}

impl MockBackend {
    /// Create a mock plus the event stream the controller should consume
    pub fn new() -> (Self, BackendEventReceiver) {
        let (events, rx) = tokio::sync::mpsc::unbounded_channel();
        (
            Self {
                state: Arc::new(Mutex::new(MockState::default())),
                events,
            },
            rx,
        )
    }

    /// Emit a backend event as if the engine produced it
    pub fn emit(&self, event: BackendEvent) {
        let _ = self.events.send(event);
    }

    /// Convenience: emit a recording-state change
    pub fn emit_recording_state(&self, active: bool, output_path: Option<&str>) {
        self.state.lock().recording_active = active;
        self.emit(BackendEvent::RecordingStateChanged {
            active,
            output_path: output_path.map(String::from),
            size_bytes: None,
            timecode: if active { None } else { Some("00:00:05".into()) },
        });
    }

    /// Make the next connect attempt fail
    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    /// Make start_recording calls fail
    pub fn fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    /// Make stop_recording calls fail
    pub fn fail_stop(&self, fail: bool) {
        self.state.lock().fail_stop = fail;
    }

    /// Replace the settings returned by fetch_settings
    pub fn set_settings(&self, settings: BackendSettings) {
        self.state.lock().settings = settings;
    }

    /// Names of every operation invoked so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// The directory most recently passed to set_output_directory
    pub fn output_dir(&self) -> Option<PathBuf> {
        self.state.lock().output_dir.clone()
    }

    fn record(&self, call: &str) {
        self.state.lock().calls.push(call.to_string());
    }
}

#[async_trait]
impl RecordingBackend for MockBackend {
    async fn connect(&self, address: &str, _password: &str) -> Result<(), ConnectError> {
        self.record("connect");
        if self.state.lock().fail_connect {
            return Err(ConnectError::Unreachable {
                address: address.to_string(),
                message: "scripted connect failure".into(),
            });
        }
        self.emit(BackendEvent::ConnectionOpened);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BackendError> {
        self.record("disconnect");
        self.emit(BackendEvent::ConnectionClosed);
        Ok(())
    }

    async fn start_recording(&self) -> Result<(), BackendError> {
        self.record("start_recording");
        if self.state.lock().fail_start {
            return Err(BackendError::RequestRejected("scripted start failure".into()));
        }
        Ok(())
    }

    async fn stop_recording(&self) -> Result<(), BackendError> {
        self.record("stop_recording");
        if self.state.lock().fail_stop {
            return Err(BackendError::RequestRejected("scripted stop failure".into()));
        }
        Ok(())
    }

    async fn set_output_directory(&self, path: &Path) -> Result<(), BackendError> {
        self.record("set_output_directory");
        self.state.lock().output_dir = Some(path.to_path_buf());
        Ok(())
    }

    async fn query_recording_active(&self) -> Result<bool, BackendError> {
        self.record("query_recording_active");
        Ok(self.state.lock().recording_active)
    }

    async fn fetch_settings(&self) -> Result<BackendSettings, BackendError> {
        self.record("fetch_settings");
        Ok(self.state.lock().settings.clone())
    }
}
