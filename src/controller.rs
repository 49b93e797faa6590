//! Controller: the single control loop
//!
//! One actor task owns the connection status, the session state machine,
//! the broadcast hub, and the merge-in-flight flag. Client commands,
//! backend events, and merge completions are all funneled through one
//! receiver, so no session state is ever mutated from two places at once.
//! Merges run on a blocking worker; the loop stays responsive while ffmpeg
//! works.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{BackendEvent, BackendEventReceiver, ConnectionStatus, RecordingBackend};
use crate::config::Config;
use crate::error::{AppError, AppResult, BackendError};
use crate::hub::{BroadcastHub, ListenerReceiver};
use crate::merge::{FfmpegTranscoder, MergeError, MergeJob, MergePipeline, MergeResult, Transcoder};
use crate::protocol::{ClientCommand, ServerEvent};
use crate::session::machine::StopRequest;
use crate::session::{ActiveBlock, LastSegment, SessionMachine, SessionState};
use crate::store::SegmentStore;

/// Point-in-time controller state for the out-of-band query surface
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub connected: bool,
    pub backend_address: String,
    pub session_state: SessionState,
    pub active_block: Option<ActiveBlock>,
    pub last_segment: Option<LastSegment>,
    pub merge_in_flight: bool,
    pub listeners: usize,
}

/// Callback used by open_video_folder; OS reveal integration lives outside
/// this crate.
pub type FolderOpener = Box<dyn Fn(&Path) + Send + Sync>;

enum LoopInput {
    Command {
        cmd: ClientCommand,
        reply: oneshot::Sender<AppResult<()>>,
    },
    DelayedStop,
    MergeFinished(Result<MergeResult, MergeError>),
    Attach {
        reply: oneshot::Sender<(Uuid, ListenerReceiver)>,
    },
    Detach(Uuid),
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle for talking to a running controller
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<LoopInput>,
    status: Arc<RwLock<StatusSnapshot>>,
    store: SegmentStore,
}

impl ControllerHandle {
    /// Submit a control command and wait for the issuing caller's result.
    /// Broadcast side effects go to listeners, not through this reply.
    pub async fn command(&self, cmd: ClientCommand) -> AppResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LoopInput::Command { cmd, reply })
            .map_err(|_| AppError::ControllerClosed)?;
        rx.await.map_err(|_| AppError::ControllerClosed)?
    }

    /// Attach a broadcast listener; it immediately receives the catch-up
    /// snapshot (connection status and segment listing).
    pub async fn attach_listener(&self) -> AppResult<(Uuid, ListenerReceiver)> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LoopInput::Attach { reply })
            .map_err(|_| AppError::ControllerClosed)?;
        rx.await.map_err(|_| AppError::ControllerClosed)
    }

    /// Detach a previously attached listener
    pub fn detach_listener(&self, id: Uuid) {
        let _ = self.tx.send(LoopInput::Detach(id));
    }

    /// Current controller status (read without entering the loop)
    pub fn status(&self) -> StatusSnapshot {
        self.status.read().clone()
    }

    /// Segment registry for the out-of-band query surface
    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    /// Gracefully shut down: disconnect the backend, then stop the loop
    pub async fn shutdown(&self) -> AppResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LoopInput::Shutdown { reply })
            .map_err(|_| AppError::ControllerClosed)?;
        rx.await.map_err(|_| AppError::ControllerClosed)
    }
}

/// The control-loop actor
pub struct Controller {
    config: Config,
    backend: Arc<dyn RecordingBackend>,
    store: SegmentStore,
    pipeline: Arc<MergePipeline>,
    hub: BroadcastHub,
    machine: SessionMachine,
    connection: ConnectionStatus,
    merge_in_flight: bool,
    folder_opener: Option<FolderOpener>,
    status: Arc<RwLock<StatusSnapshot>>,
    self_tx: mpsc::UnboundedSender<LoopInput>,
}

impl Controller {
    /// Spawn a controller with the ffmpeg binary from the config
    pub fn spawn(
        config: Config,
        backend: Arc<dyn RecordingBackend>,
        backend_events: BackendEventReceiver,
    ) -> (ControllerHandle, JoinHandle<()>) {
        let transcoder = Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone()));
        Self::spawn_with(config, backend, backend_events, transcoder, None)
    }

    /// Spawn a controller with an explicit transcoder and folder opener
    pub fn spawn_with(
        config: Config,
        backend: Arc<dyn RecordingBackend>,
        mut backend_events: BackendEventReceiver,
        transcoder: Arc<dyn Transcoder>,
        folder_opener: Option<FolderOpener>,
    ) -> (ControllerHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = SegmentStore::new(&config);
        let pipeline = Arc::new(MergePipeline::new(
            store.clone(),
            config.merge_extension().to_string(),
            transcoder,
        ));
        let status = Arc::new(RwLock::new(StatusSnapshot::default()));

        let handle = ControllerHandle {
            tx: tx.clone(),
            status: status.clone(),
            store: store.clone(),
        };

        let mut controller = Controller {
            config,
            backend,
            store,
            pipeline,
            hub: BroadcastHub::new(),
            machine: SessionMachine::new(),
            connection: ConnectionStatus::default(),
            merge_in_flight: false,
            folder_opener,
            status,
            self_tx: tx,
        };

        let join = tokio::spawn(async move {
            tracing::info!("controller loop started");
            loop {
                let input = tokio::select! {
                    Some(input) = rx.recv() => input,
                    Some(event) = backend_events.recv() => {
                        controller.handle_backend_event(event);
                        controller.publish_status();
                        continue;
                    }
                    else => break,
                };

                let stop = controller.handle_input(input).await;
                controller.publish_status();
                if stop {
                    break;
                }
            }
            tracing::info!("controller loop exited");
        });

        (handle, join)
    }

    fn publish_status(&self) {
        *self.status.write() = StatusSnapshot {
            connected: self.connection.connected,
            backend_address: self.connection.address.clone(),
            session_state: self.machine.state(),
            active_block: self.machine.active_block().cloned(),
            last_segment: self.machine.last_segment().cloned(),
            merge_in_flight: self.merge_in_flight,
            listeners: self.hub.len(),
        };
    }

    /// Returns true when the loop should exit.
    async fn handle_input(&mut self, input: LoopInput) -> bool {
        match input {
            LoopInput::Command { cmd, reply } => {
                let result = self.handle_command(cmd).await;
                if let Err(e) = &result {
                    tracing::warn!("command failed: {e}");
                }
                // status must reflect the command before the caller sees
                // its reply
                self.publish_status();
                let _ = reply.send(result);
            }
            LoopInput::DelayedStop => self.handle_delayed_stop().await,
            LoopInput::MergeFinished(result) => self.handle_merge_finished(result),
            LoopInput::Attach { reply } => {
                let snapshot = vec![
                    ServerEvent::ObsStatus {
                        connected: self.connection.connected,
                        error: self.connection.last_error.clone(),
                    },
                    ServerEvent::Segments {
                        files: self.store.list(),
                    },
                ];
                let _ = reply.send(self.hub.attach(snapshot));
            }
            LoopInput::Detach(id) => self.hub.detach(id),
            LoopInput::Shutdown { reply } => {
                if self.connection.connected {
                    if let Err(e) = self.backend.disconnect().await {
                        tracing::warn!("graceful disconnect failed: {e}");
                    }
                }
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    async fn handle_command(&mut self, cmd: ClientCommand) -> AppResult<()> {
        match cmd {
            ClientCommand::ConnectObs { address, password } => {
                self.connect(&address, &password).await
            }
            ClientCommand::StartRecording {
                block_index,
                block_text,
            } => self.start_recording(block_index, &block_text).await,
            ClientCommand::StopRecording {} => self.stop_recording().await,
            ClientCommand::TestRecording {} => self.test_recording().await,
            ClientCommand::MergeVideos {
                blocks,
                project_name,
            } => self.merge_videos(blocks, project_name),
            ClientCommand::RefreshSettings {} => self.refresh_settings().await,
            ClientCommand::OpenVideoFolder {} => {
                match &self.folder_opener {
                    Some(open) => open(self.store.output_dir()),
                    None => tracing::info!("no folder opener configured; ignoring"),
                }
                Ok(())
            }
        }
    }

    async fn connect(&mut self, address: &str, password: &str) -> AppResult<()> {
        tracing::info!(address, "connecting to recording backend");
        self.connection.address = address.to_string();

        match self.backend.connect(address, password).await {
            Ok(()) => {
                // connected flips on ConnectionOpened; the event stream is
                // the authority, the call only means "request accepted"
                Ok(())
            }
            Err(e) => {
                self.connection.connected = false;
                self.connection.last_error = Some(e.to_string());
                self.hub.broadcast(&ServerEvent::ObsStatus {
                    connected: false,
                    error: Some(e.to_string()),
                });
                Err(e.into())
            }
        }
    }

    async fn start_recording(&mut self, block_index: u32, block_text: &str) -> AppResult<()> {
        self.machine
            .start_requested(block_index, block_text, self.connection.connected)?;

        let issued = match self
            .backend
            .set_output_directory(&self.config.output_dir)
            .await
        {
            Ok(()) => self.backend.start_recording().await,
            Err(e) => Err(e),
        };
        if let Err(e) = issued {
            self.machine.start_failed();
            return Err(e.into());
        }

        tracing::info!(block_index, "start issued, awaiting backend confirmation");
        Ok(())
    }

    async fn stop_recording(&mut self) -> AppResult<()> {
        match self.machine.stop_requested(self.connection.connected)? {
            StopRequest::SkipDisconnected => {
                tracing::warn!("stop requested while backend disconnected; nothing to do");
                Ok(())
            }
            StopRequest::IssueStop => {
                if let Err(e) = self.backend.stop_recording().await {
                    self.machine.stop_failed();
                    return Err(e.into());
                }
                tracing::info!("stop issued, awaiting backend confirmation");
                Ok(())
            }
        }
    }

    async fn test_recording(&mut self) -> AppResult<()> {
        self.start_recording(0, "test recording").await?;

        // Unconditional stop after the configured delay, regardless of
        // whatever state the session is in by then.
        let tx = self.self_tx.clone();
        let delay = self.config.test_recording_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(LoopInput::DelayedStop);
        });
        Ok(())
    }

    async fn handle_delayed_stop(&mut self) {
        // Fire-and-forget: nobody awaits this, so failures are logged only.
        if let Err(e) = self.stop_recording().await {
            tracing::warn!("test recording stop failed: {e}");
        }
    }

    fn merge_videos(&mut self, blocks: Vec<String>, project_name: String) -> AppResult<()> {
        if self.merge_in_flight {
            return Err(MergeError::MergeInProgress.into());
        }

        // Validate on the loop so the caller learns about an empty set
        // before any worker is spawned; the completion broadcast follows
        // this step deterministically.
        self.pipeline.validate(&blocks)?;

        self.merge_in_flight = true;
        let pipeline = self.pipeline.clone();
        let tx = self.self_tx.clone();
        let job = MergeJob {
            blocks,
            project_name,
        };
        tokio::task::spawn_blocking(move || {
            let result = pipeline.run(&job);
            let _ = tx.send(LoopInput::MergeFinished(result));
        });
        Ok(())
    }

    fn handle_merge_finished(&mut self, result: Result<MergeResult, MergeError>) {
        self.merge_in_flight = false;
        match result {
            Ok(result) => {
                self.hub.broadcast(&ServerEvent::VideoMerged {
                    output_file: result
                        .output_path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| result.output_path.to_string_lossy().to_string()),
                    file_size: result.size_bytes,
                    blocks_used: result.blocks_used,
                    strategy_used: result.strategy_used,
                });
            }
            Err(e) => {
                tracing::error!("merge failed: {e}");
                self.hub.broadcast(&ServerEvent::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    async fn refresh_settings(&mut self) -> AppResult<()> {
        if !self.connection.connected {
            return Err(BackendError::NotConnected.into());
        }
        let settings = self.backend.fetch_settings().await?;
        self.hub.broadcast(&ServerEvent::Settings(settings));
        Ok(())
    }

    fn handle_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::ConnectionOpened => {
                tracing::info!("backend connection opened");
                self.connection.connected = true;
                self.connection.last_error = None;
                self.hub.broadcast(&ServerEvent::ObsStatus {
                    connected: true,
                    error: None,
                });
            }
            BackendEvent::ConnectionClosed => {
                tracing::info!("backend connection closed");
                self.connection.connected = false;
                self.machine.connection_lost();
                self.hub.broadcast(&ServerEvent::ObsStatus {
                    connected: false,
                    error: None,
                });
            }
            BackendEvent::ConnectionError(message) => {
                tracing::warn!("backend connection error: {message}");
                self.connection.connected = false;
                self.connection.last_error = Some(message.clone());
                self.machine.connection_lost();
                self.hub.broadcast(&ServerEvent::ObsStatus {
                    connected: false,
                    error: Some(message),
                });
            }
            BackendEvent::RecordingStateChanged {
                active: true,
                output_path,
                ..
            } => {
                if let Some(record) = self.machine.backend_started(output_path.as_deref()) {
                    tracing::info!(
                        block_index = record.block_index,
                        filename = %record.filename,
                        "recording confirmed started"
                    );
                    self.hub.broadcast(&ServerEvent::RecordingStarted {
                        filename: record.filename,
                        full_path: record.full_path,
                        block_index: record.block_index,
                    });
                }
            }
            BackendEvent::RecordingStateChanged {
                active: false,
                output_path,
                size_bytes,
                timecode,
            } => {
                let pending = match self.machine.backend_stopped(
                    output_path.as_deref(),
                    size_bytes,
                    timecode.as_deref(),
                ) {
                    Some(pending) => pending,
                    None => return,
                };

                // Path resolution order: event-carried, session-captured,
                // then directory discovery as a last resort (racy under
                // concurrent writers).
                let full_path = pending
                    .carried_path
                    .clone()
                    .or_else(|| pending.session_path.clone())
                    .or_else(|| {
                        tracing::warn!(
                            "stop event carried no path; falling back to newest file scan"
                        );
                        self.store.newest().map(|f| f.full_path)
                    })
                    .unwrap_or_default();

                let path = PathBuf::from(&full_path);
                let file_exists = !full_path.is_empty() && path.exists();
                let output_bytes = pending
                    .size_bytes
                    .or_else(|| SegmentStore::file_size(&path).ok())
                    .unwrap_or(0);
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();

                if !file_exists {
                    tracing::warn!(
                        %full_path,
                        "backend reported stop but segment file is not on disk yet"
                    );
                }

                self.hub.broadcast(&ServerEvent::RecordingStopped {
                    filename: filename.clone(),
                    full_path: full_path.clone(),
                    block_index: pending.block_index,
                    output_bytes,
                    timecode: pending.timecode.clone(),
                    file_exists,
                });
                self.machine.finalize_stop(&filename, &full_path);
                tracing::info!(
                    block_index = pending.block_index,
                    %filename,
                    file_exists,
                    "recording confirmed stopped"
                );
            }
        }
    }
}
