//! Session state machine
//!
//! Pure transition logic: every method maps (current state, input) to
//! (next state, outcome) without touching the backend or the filesystem.
//! The controller owns one instance and performs the I/O the outcomes call
//! for.

use chrono::Utc;

use super::{ActiveBlock, LastSegment, SessionError, SessionState};

/// What the controller must do after a stop request was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    /// Issue stop_recording to the backend
    IssueStop,
    /// Backend disconnected: warn and return success without state change
    SkipDisconnected,
}

/// A confirmed start, ready to broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct StartedRecord {
    pub block_index: u32,
    pub filename: String,
    pub full_path: String,
}

/// A confirmed stop, pending segment-path resolution by the controller.
///
/// `carried_path` is the event-supplied output path when present; only when
/// it is absent may the controller fall back to directory-scan discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStop {
    pub block_index: u32,
    /// Path carried by the stop event, preferred over any discovery
    pub carried_path: Option<String>,
    /// Path captured at start confirmation, the next-best source
    pub session_path: Option<String>,
    pub size_bytes: Option<u64>,
    pub timecode: Option<String>,
}

/// The singleton session state machine
#[derive(Debug, Default)]
pub struct SessionMachine {
    state: SessionState,
    block: Option<ActiveBlock>,
    last_segment: Option<LastSegment>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The block currently being recorded, if any
    pub fn active_block(&self) -> Option<&ActiveBlock> {
        self.block.as_ref()
    }

    /// The segment produced by the previous session, retained until the
    /// next accepted start
    pub fn last_segment(&self) -> Option<&LastSegment> {
        self.last_segment.as_ref()
    }

    /// Accept or reject a start command.
    ///
    /// On acceptance the session enters Starting; the `recording_started`
    /// broadcast waits for backend confirmation.
    pub fn start_requested(
        &mut self,
        block_index: u32,
        block_text: &str,
        connected: bool,
    ) -> Result<(), SessionError> {
        if !connected {
            return Err(SessionError::BackendUnavailable);
        }
        match self.state {
            SessionState::Recording | SessionState::Starting => {
                return Err(SessionError::AlreadyRecording {
                    block_index: self.block.as_ref().map(|b| b.block_index).unwrap_or(0),
                });
            }
            SessionState::Stopping => {
                // The previous block's stop confirmation has not arrived
                // yet; starting now would orphan its terminal record.
                return Err(SessionError::AlreadyRecording {
                    block_index: self.block.as_ref().map(|b| b.block_index).unwrap_or(0),
                });
            }
            SessionState::Idle => {}
        }

        self.block = Some(ActiveBlock {
            block_index,
            block_text: block_text.to_string(),
            started_at: Utc::now(),
            segment_filename: None,
            segment_full_path: None,
        });
        self.last_segment = None;
        self.state = SessionState::Starting;
        Ok(())
    }

    /// The start request failed at the backend: roll back to Idle.
    pub fn start_failed(&mut self) {
        if self.state == SessionState::Starting {
            self.state = SessionState::Idle;
            self.block = None;
        }
    }

    /// Backend confirmed recording is active.
    ///
    /// Returns the record to broadcast, or None when the event does not
    /// belong to a start we issued (spontaneous backend activity).
    pub fn backend_started(&mut self, output_path: Option<&str>) -> Option<StartedRecord> {
        if self.state != SessionState::Starting {
            tracing::debug!(state = ?self.state, "ignoring active:true event outside Starting");
            return None;
        }
        let block = self.block.as_mut()?;

        let full_path = output_path.unwrap_or_default().to_string();
        let filename = filename_of(&full_path);
        if !full_path.is_empty() {
            block.segment_full_path = Some(full_path.clone());
            block.segment_filename = Some(filename.clone());
        }
        self.state = SessionState::Recording;
        Some(StartedRecord {
            block_index: block.block_index,
            filename,
            full_path,
        })
    }

    /// Accept or reject a stop command.
    pub fn stop_requested(&mut self, connected: bool) -> Result<StopRequest, SessionError> {
        if !connected {
            // Deliberately not an error: there is nothing to stop on a
            // backend we cannot reach, and the session state stays intact.
            return Ok(StopRequest::SkipDisconnected);
        }
        if self.state != SessionState::Recording {
            return Err(SessionError::NoActiveSession);
        }
        self.state = SessionState::Stopping;
        Ok(StopRequest::IssueStop)
    }

    /// The stop request failed at the backend: roll back to Recording so a
    /// later stop can retry.
    pub fn stop_failed(&mut self) {
        if self.state == SessionState::Stopping {
            self.state = SessionState::Recording;
        }
    }

    /// Backend confirmed recording stopped.
    ///
    /// Returns the pending stop for the controller to resolve (path
    /// preference: event-carried, then session-captured, then discovery).
    pub fn backend_stopped(
        &mut self,
        output_path: Option<&str>,
        size_bytes: Option<u64>,
        timecode: Option<&str>,
    ) -> Option<PendingStop> {
        match self.state {
            SessionState::Stopping | SessionState::Recording => {}
            SessionState::Starting => {
                // The start was never confirmed; drop the provisional block
                // so the next start is not rejected as a conflict.
                tracing::warn!("backend stopped while start was pending; rolling back to idle");
                self.state = SessionState::Idle;
                self.block = None;
                return None;
            }
            SessionState::Idle => {
                tracing::debug!("ignoring active:false event with no session");
                return None;
            }
        }
        let block = self.block.as_ref()?;
        Some(PendingStop {
            block_index: block.block_index,
            carried_path: output_path.map(String::from),
            session_path: block.segment_full_path.clone(),
            size_bytes,
            timecode: timecode.map(String::from),
        })
    }

    /// Bind the resolved segment and return to Idle.
    ///
    /// The filename/path are retained in `last_segment` until the next
    /// accepted start.
    pub fn finalize_stop(&mut self, filename: &str, full_path: &str) {
        if let Some(block) = self.block.take() {
            self.last_segment = Some(LastSegment {
                block_index: block.block_index,
                filename: filename.to_string(),
                full_path: full_path.to_string(),
            });
        }
        self.state = SessionState::Idle;
    }

    /// The backend connection dropped. The session keeps its state: a
    /// reconnect may still deliver the confirmation events, and stop while
    /// disconnected is already a safe no-op.
    pub fn connection_lost(&self) {
        if self.state != SessionState::Idle {
            tracing::warn!(state = ?self.state, "backend disconnected with a session in flight");
        }
    }
}

/// Final path component of a backend-reported output path.
fn filename_of(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_machine() -> SessionMachine {
        let mut m = SessionMachine::new();
        m.start_requested(1, "intro", true).unwrap();
        m.backend_started(Some("/out/block_1_a.mkv")).unwrap();
        m
    }

    #[test]
    fn test_start_requires_connection() {
        let mut m = SessionMachine::new();
        assert_eq!(
            m.start_requested(0, "intro", false),
            Err(SessionError::BackendUnavailable)
        );
        assert_eq!(m.state(), SessionState::Idle);
    }

    #[test]
    fn test_started_broadcast_waits_for_backend() {
        let mut m = SessionMachine::new();
        m.start_requested(2, "scene", true).unwrap();
        assert_eq!(m.state(), SessionState::Starting);

        let rec = m.backend_started(Some("/out/block_2_x.mkv")).unwrap();
        assert_eq!(rec.block_index, 2);
        assert_eq!(rec.filename, "block_2_x.mkv");
        assert_eq!(m.state(), SessionState::Recording);
    }

    #[test]
    fn test_second_start_is_a_conflict_not_an_implicit_stop() {
        let mut m = recording_machine();
        let original = m.active_block().unwrap().clone();

        let err = m.start_requested(2, "next", true).unwrap_err();
        assert_eq!(err, SessionError::AlreadyRecording { block_index: 1 });

        // Original session untouched
        let block = m.active_block().unwrap();
        assert_eq!(block.block_index, original.block_index);
        assert_eq!(block.started_at, original.started_at);
        assert_eq!(m.state(), SessionState::Recording);
    }

    #[test]
    fn test_conflict_while_starting() {
        let mut m = SessionMachine::new();
        m.start_requested(1, "intro", true).unwrap();
        assert!(matches!(
            m.start_requested(2, "next", true),
            Err(SessionError::AlreadyRecording { .. })
        ));
    }

    #[test]
    fn test_start_failure_rolls_back_to_idle() {
        let mut m = SessionMachine::new();
        m.start_requested(1, "intro", true).unwrap();
        m.start_failed();
        assert_eq!(m.state(), SessionState::Idle);
        assert!(m.active_block().is_none());
    }

    #[test]
    fn test_stop_while_disconnected_is_a_noop() {
        let mut m = recording_machine();
        assert_eq!(
            m.stop_requested(false),
            Ok(StopRequest::SkipDisconnected)
        );
        assert_eq!(m.state(), SessionState::Recording);
    }

    #[test]
    fn test_stop_without_recording_fails() {
        let mut m = SessionMachine::new();
        assert_eq!(m.stop_requested(true), Err(SessionError::NoActiveSession));
    }

    #[test]
    fn test_stop_resolution_prefers_carried_path() {
        let mut m = recording_machine();
        m.stop_requested(true).unwrap();

        let pending = m
            .backend_stopped(Some("/out/actual.mkv"), Some(900), Some("00:01:00"))
            .unwrap();
        assert_eq!(pending.carried_path.as_deref(), Some("/out/actual.mkv"));
        assert_eq!(pending.session_path.as_deref(), Some("/out/block_1_a.mkv"));
        assert_eq!(pending.size_bytes, Some(900));
    }

    #[test]
    fn test_last_segment_retained_until_next_start() {
        let mut m = recording_machine();
        m.stop_requested(true).unwrap();
        m.backend_stopped(None, None, None).unwrap();
        m.finalize_stop("block_1_a.mkv", "/out/block_1_a.mkv");

        assert_eq!(m.state(), SessionState::Idle);
        let last = m.last_segment().unwrap();
        assert_eq!(last.filename, "block_1_a.mkv");
        assert_eq!(last.block_index, 1);

        m.start_requested(2, "next", true).unwrap();
        assert!(m.last_segment().is_none());
    }

    #[test]
    fn test_spontaneous_events_are_ignored() {
        let mut m = SessionMachine::new();
        assert!(m.backend_started(Some("/out/x.mkv")).is_none());
        assert!(m.backend_stopped(None, None, None).is_none());
        assert_eq!(m.state(), SessionState::Idle);
    }

    #[test]
    fn test_stop_event_while_starting_rolls_back_to_idle() {
        let mut m = SessionMachine::new();
        m.start_requested(4, "scene", true).unwrap();

        // the backend stopped (or refused) before ever confirming the start
        assert!(m.backend_stopped(None, None, None).is_none());
        assert_eq!(m.state(), SessionState::Idle);
        assert!(m.active_block().is_none());

        // neither wedged into AlreadyRecording nor NoActiveSession
        m.start_requested(5, "next", true).unwrap();
        assert_eq!(m.state(), SessionState::Starting);
    }

    #[test]
    fn test_stop_failure_returns_to_recording() {
        let mut m = recording_machine();
        m.stop_requested(true).unwrap();
        m.stop_failed();
        assert_eq!(m.state(), SessionState::Recording);
        // the retry path stays open
        assert_eq!(m.stop_requested(true), Ok(StopRequest::IssueStop));
    }
}
