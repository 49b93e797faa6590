//! blockreel - segmented recording controller
//!
//! Drives an external recording engine (connected over a control protocol)
//! to capture discrete "blocks" of a production, tracks the segment file
//! each block produces, and merges an ordered subset of segments into one
//! artifact via ffmpeg, stream-copy first with a re-encoding fallback.
//!
//! The crate is transport-agnostic: client commands ([`protocol::ClientCommand`])
//! enter through a [`controller::ControllerHandle`], broadcast events
//! ([`protocol::ServerEvent`]) leave through attached listeners, and the
//! recording engine sits behind the [`backend::RecordingBackend`] trait plus
//! its event stream. Wire those to whatever transport the deployment uses.

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod hub;
pub mod merge;
pub mod protocol;
pub mod session;
pub mod store;

pub use backend::{BackendEvent, RecordingBackend};
pub use config::Config;
pub use controller::{Controller, ControllerHandle, StatusSnapshot};
pub use error::{AppError, AppResult};
pub use merge::{MergePipeline, MergeResult, MergeStrategy};
pub use protocol::{ClientCommand, ServerEvent};
pub use session::SessionState;
pub use store::{SegmentFile, SegmentStore};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing for binaries and demos embedding the controller
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blockreel=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("blockreel v{}", env!("CARGO_PKG_VERSION"));
}
