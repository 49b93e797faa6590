//! Scripted end-to-end run against the mock backend.
//!
//! Records two blocks, merges them, and prints every broadcast event.
//! Useful for eyeballing the controller without a live recording engine;
//! real deployments wire a transport to [`ControllerHandle`] instead.

use anyhow::Result;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use blockreel::backend::MockBackend;
use blockreel::{ClientCommand, Config, Controller};

#[tokio::main]
async fn main() -> Result<()> {
    blockreel::init_tracing();

    let dir = tempfile::tempdir()?;
    let config = Config::new(dir.path());

    let (backend, events) = MockBackend::new();
    let (handle, _join) = Controller::spawn(config, Arc::new(backend.clone()), events);

    let (_, mut listener) = handle.attach_listener().await?;
    tokio::spawn(async move {
        while let Some(event) = listener.recv().await {
            println!("broadcast: {}", serde_json::to_string(&event).unwrap());
        }
    });

    handle
        .command(ClientCommand::ConnectObs {
            address: "ws://localhost:4455".into(),
            password: String::new(),
        })
        .await?;

    for block in 0..2u32 {
        handle
            .command(ClientCommand::StartRecording {
                block_index: block,
                block_text: format!("block {block}"),
            })
            .await?;

        // the mock stands in for the engine: confirm, write a file, stop
        let segment = dir.path().join(format!("block_{block}_demo.mkv"));
        fs::write(&segment, format!("demo segment {block}"))?;
        backend.emit_recording_state(true, segment.to_str());
        tokio::time::sleep(Duration::from_millis(50)).await;

        handle.command(ClientCommand::StopRecording {}).await?;
        backend.emit_recording_state(false, segment.to_str());
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    handle
        .command(ClientCommand::MergeVideos {
            blocks: vec!["block_0_demo.mkv".into(), "block_1_demo.mkv".into()],
            project_name: "demo_project".into(),
        })
        .await?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    println!("final status: {}", serde_json::to_string(&handle.status())?);
    handle.shutdown().await?;
    Ok(())
}
