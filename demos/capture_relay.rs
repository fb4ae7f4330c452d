//! Capture host example
//!
//! Spawns ffmpeg with a synthetic test pattern encoded as MJPEG, demuxes the
//! frames from its stdout, and serves a second ffmpeg's raw PCM output to
//! local WebSocket clients.
//!
//! Run with: cargo run --example capture_relay
//!
//! Requires ffmpeg on PATH. Listen to the audio with any WebSocket client:
//!   websocat --binary ws://127.0.0.1:<port> > audio.pcm

use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

use rendezvous_rs::media::capture::is_available;
use rendezvous_rs::media::{AudioRelay, CaptureConfig, CaptureSession};
use rendezvous_rs::server::{AudioRelayServer, AudioServerConfig};

fn video_command() -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args([
        "-hide_banner",
        "-loglevel",
        "error",
        "-re",
        "-f",
        "lavfi",
        "-i",
        "testsrc=size=640x360:rate=15",
        "-f",
        "mjpeg",
        "-q:v",
        "5",
        "pipe:1",
    ]);
    cmd
}

fn audio_command() -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args([
        "-hide_banner",
        "-loglevel",
        "error",
        "-re",
        "-f",
        "lavfi",
        "-i",
        "sine=frequency=440:sample_rate=48000",
        "-f",
        "s16le",
        "-ac",
        "1",
        "pipe:1",
    ])
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .kill_on_drop(true);
    cmd
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rendezvous_rs=debug".parse()?)
                .add_directive("capture_relay=debug".parse()?),
        )
        .init();

    if !is_available("ffmpeg").await {
        eprintln!("ffmpeg not found on PATH");
        std::process::exit(1);
    }

    let relay = Arc::new(AudioRelay::new());
    let audio_server =
        AudioRelayServer::bind(AudioServerConfig::default(), Arc::clone(&relay)).await?;
    println!("Audio endpoint: ws://{}", audio_server.local_addr()?);

    let (mut session, mut frames) =
        CaptureSession::spawn(video_command(), CaptureConfig::default())?;

    let mut audio_child = audio_command().spawn()?;
    if let Some(stdout) = audio_child.stdout.take() {
        session.attach_audio(stdout, Arc::clone(&relay));
    }

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let audio_task = tokio::spawn(async move {
        audio_server
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await
    });

    let mut count = 0u64;
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                count += 1;
                if count % 15 == 0 {
                    println!("{} frames, last {} bytes", count, frame.len());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping capture...");
                break;
            }
        }
    }

    let stats = session.stop().await?;
    let _ = audio_child.kill().await;
    let _ = stop_tx.send(());
    audio_task.await??;

    println!(
        "Captured {} frames from {} bytes ({} overflows)",
        stats.frames, stats.bytes_in, stats.overflows
    );

    Ok(())
}
