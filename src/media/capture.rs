//! Encoding subprocess lifecycle
//!
//! A capture session owns one external encoder process (typically ffmpeg
//! writing MJPEG to stdout). Its stdout is pumped through a [`FrameDemuxer`]
//! into a frame channel, an optional raw PCM reader is pumped into an
//! [`AudioRelay`], and stderr is forwarded to `tracing`.
//!
//! Stopping is polite first: `q` is written to stdin and the process gets a
//! grace period to finalize its outputs before it is killed.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, SubprocessError};

use super::audio::AudioRelay;
use super::demux::{DemuxConfig, DemuxStats, FrameDemuxer};

/// Capture session configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Time the process gets to exit after `q` before it is killed
    pub stop_grace_period: Duration,

    /// Read buffer size for stdout and audio pipes
    pub read_chunk_size: usize,

    /// Frames queued for the consumer before the reader waits
    pub frame_channel_capacity: usize,

    /// Exit codes that count as success (ffmpeg exits 255 when stopped with `q`)
    pub success_codes: Vec<i32>,

    /// Frame demuxer settings
    pub demux: DemuxConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            stop_grace_period: Duration::from_secs(1),
            read_chunk_size: 64 * 1024,
            frame_channel_capacity: 16,
            success_codes: vec![0, 255],
            demux: DemuxConfig::default(),
        }
    }
}

impl CaptureConfig {
    pub fn stop_grace_period(mut self, period: Duration) -> Self {
        self.stop_grace_period = period;
        self
    }

    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    pub fn frame_channel_capacity(mut self, capacity: usize) -> Self {
        self.frame_channel_capacity = capacity.max(1);
        self
    }

    pub fn success_codes(mut self, codes: impl Into<Vec<i32>>) -> Self {
        self.success_codes = codes.into();
        self
    }

    pub fn demux(mut self, demux: DemuxConfig) -> Self {
        self.demux = demux;
        self
    }
}

/// A running encoder process
pub struct CaptureSession {
    child: Child,
    stdin: Option<ChildStdin>,
    frame_task: Option<JoinHandle<io::Result<DemuxStats>>>,
    audio_task: Option<JoinHandle<io::Result<u64>>>,
    stderr_task: Option<JoinHandle<()>>,
    config: CaptureConfig,
}

impl CaptureSession {
    /// Spawn the prepared command and start pumping its stdout
    ///
    /// Stdio of the command is overridden: all three streams are piped.
    /// Returns the session and the channel complete frames arrive on.
    pub fn spawn(
        mut command: Command,
        config: CaptureConfig,
    ) -> Result<(Self, mpsc::Receiver<Bytes>)> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or(SubprocessError::MissingPipe("stdout"))?;
        let stdin = child.stdin.take();
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(log_stderr(stderr)));

        let (tx, rx) = mpsc::channel(config.frame_channel_capacity);
        let demuxer = FrameDemuxer::with_config(config.demux.clone());
        let frame_task = tokio::spawn(pump_frames(stdout, demuxer, tx, config.read_chunk_size));

        tracing::info!(pid = ?pid, "Capture started");

        Ok((
            Self {
                child,
                stdin,
                frame_task: Some(frame_task),
                audio_task: None,
                stderr_task,
                config,
            },
            rx,
        ))
    }

    /// Pump a raw PCM reader (the encoder's audio output) into the relay
    pub fn attach_audio<R>(&mut self, reader: R, relay: Arc<AudioRelay>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        if let Some(old) = self.audio_task.take() {
            old.abort();
        }
        self.audio_task = Some(tokio::spawn(pump_audio(
            reader,
            relay,
            self.config.read_chunk_size,
        )));
    }

    /// OS process id, while the process is running
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit on its own
    pub async fn wait(&mut self) -> Result<DemuxStats> {
        let status = self.child.wait().await?;
        let stats = self.finish().await;

        tracing::info!(status = %status, frames = stats.frames, "Capture exited");
        exit_result(status, &self.config.success_codes)?;
        Ok(stats)
    }

    /// Ask the process to quit, killing it after the grace period
    ///
    /// A process that has to be killed is not an error: stopping was requested.
    pub async fn stop(&mut self) -> Result<DemuxStats> {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.write_all(b"q").await {
                tracing::debug!(error = %e, "Could not send quit to encoder");
            }
            let _ = stdin.shutdown().await;
        }

        match tokio::time::timeout(self.config.stop_grace_period, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                let stats = self.finish().await;
                tracing::info!(status = %status, frames = stats.frames, "Capture stopped");
                exit_result(status, &self.config.success_codes)?;
                Ok(stats)
            }
            Err(_) => {
                tracing::warn!(
                    grace_ms = self.config.stop_grace_period.as_millis() as u64,
                    "Encoder did not exit in time, killing"
                );
                self.child.kill().await?;
                let stats = self.finish().await;
                Ok(stats)
            }
        }
    }

    /// Kill the process immediately
    pub async fn kill(&mut self) -> Result<DemuxStats> {
        self.stdin = None;
        self.child.kill().await?;
        Ok(self.finish().await)
    }

    /// Collect the reader tasks once the process is gone
    async fn finish(&mut self) -> DemuxStats {
        if let Some(task) = self.audio_task.take() {
            task.abort();
        }

        let mut stats = DemuxStats::default();
        if let Some(task) = self.frame_task.take() {
            let abort = task.abort_handle();
            match tokio::time::timeout(self.config.stop_grace_period, task).await {
                Ok(Ok(Ok(final_stats))) => stats = final_stats,
                Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Frame reader failed"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Frame reader panicked"),
                Err(_) => {
                    tracing::warn!("Frame consumer stalled, abandoning reader");
                    abort.abort();
                }
            }
        }

        if let Some(task) = self.stderr_task.take() {
            if tokio::time::timeout(Duration::from_millis(100), task).await.is_err() {
                tracing::debug!("Encoder stderr still open after exit");
            }
        }

        stats
    }
}

/// Map an exit status to success or failure
pub fn exit_result(
    status: ExitStatus,
    success_codes: &[i32],
) -> std::result::Result<(), SubprocessError> {
    match status.code() {
        Some(code) if success_codes.contains(&code) => Ok(()),
        Some(code) => Err(SubprocessError::NonZeroExit(code)),
        None => Err(SubprocessError::Terminated),
    }
}

/// Check that an encoder binary can be launched (`<program> -version`)
pub async fn is_available(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Read a byte stream through the demuxer into a frame channel
///
/// Ends at EOF or when the consumer drops the channel. The demuxer is reset
/// before returning and its final counters are returned.
pub async fn pump_frames<R>(
    mut reader: R,
    mut demuxer: FrameDemuxer,
    frames: mpsc::Sender<Bytes>,
    chunk_size: usize,
) -> io::Result<DemuxStats>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        let mut consumer_gone = false;
        for frame in demuxer.push(&buf[..n]) {
            if frames.send(frame).await.is_err() {
                consumer_gone = true;
                break;
            }
        }
        if consumer_gone {
            tracing::debug!("Frame consumer gone, stopping reader");
            break;
        }
    }

    demuxer.reset();
    Ok(demuxer.stats())
}

/// Read raw audio chunks into the relay
///
/// Returns the number of chunks read.
pub async fn pump_audio<R>(
    mut reader: R,
    relay: Arc<AudioRelay>,
    chunk_size: usize,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut chunks = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        relay.publish(Bytes::copy_from_slice(&buf[..n])).await;
        chunks += 1;
    }

    tracing::debug!(chunks, "Audio pipe ended");
    Ok(chunks)
}

async fn log_stderr<R>(stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(output = %line, "Encoder log"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Encoder stderr read failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::media::demux::{JPEG_EOI, JPEG_SOI};
    use crate::media::SubscriberState;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut out = JPEG_SOI.to_vec();
        out.extend_from_slice(body);
        out.extend_from_slice(&JPEG_EOI);
        out
    }

    #[tokio::test]
    async fn test_pump_frames_across_reads() {
        let frame = jpeg(b"image");
        let (head, tail) = frame.split_at(3);
        let reader = tokio_test::io::Builder::new()
            .read(b"noise")
            .read(head)
            .read(tail)
            .read(&jpeg(b"next"))
            .build();

        let (tx, mut rx) = mpsc::channel(8);
        let stats = pump_frames(reader, FrameDemuxer::new(), tx, 4096)
            .await
            .unwrap();

        assert_eq!(stats.frames, 2);
        assert_eq!(rx.recv().await.unwrap().as_ref(), frame.as_slice());
        assert_eq!(rx.recv().await.unwrap().as_ref(), jpeg(b"next").as_slice());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_pump_frames_stops_when_consumer_drops() {
        let reader = tokio_test::io::Builder::new()
            .read(&jpeg(b"a"))
            .build();

        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let stats = pump_frames(reader, FrameDemuxer::new(), tx, 4096)
            .await
            .unwrap();
        assert_eq!(stats.frames, 1);
    }

    #[tokio::test]
    async fn test_pump_audio_publishes_chunks() {
        let relay = Arc::new(AudioRelay::new());
        let mut sub = relay.subscribe().await;
        sub.open();
        assert_eq!(sub.state(), SubscriberState::Open);

        let reader = tokio_test::io::Builder::new()
            .read(&[1, 2, 3, 4])
            .read(&[5, 6])
            .build();

        let chunks = pump_audio(reader, relay.clone(), 1024).await.unwrap();
        assert_eq!(chunks, 2);
        assert_eq!(sub.recv().await.unwrap().as_ref(), &[1, 2, 3, 4]);
        assert_eq!(sub.recv().await.unwrap().as_ref(), &[5, 6]);
    }

    #[cfg(unix)]
    fn exit_with(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_codes() {
        use std::os::unix::process::ExitStatusExt;

        let success = [0, 255];
        assert_eq!(exit_result(exit_with(0), &success), Ok(()));
        assert_eq!(exit_result(exit_with(255), &success), Ok(()));
        assert_eq!(
            exit_result(exit_with(1), &success),
            Err(SubprocessError::NonZeroExit(1))
        );
        assert_eq!(
            exit_result(ExitStatus::from_raw(9), &success),
            Err(SubprocessError::Terminated)
        );
    }

    #[cfg(unix)]
    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_reads_frames_from_process() {
        let (mut session, mut rx) = CaptureSession::spawn(
            sh(r"printf 'xx\377\330AB\377\331\377\330C\377\331'"),
            CaptureConfig::default(),
        )
        .unwrap();

        assert_eq!(rx.recv().await.unwrap().as_ref(), jpeg(b"AB").as_slice());
        assert_eq!(rx.recv().await.unwrap().as_ref(), jpeg(b"C").as_slice());

        let stats = session.wait().await.unwrap();
        assert_eq!(stats.frames, 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_is_polite_first() {
        // Exits 255 as soon as it reads the quit request
        let (mut session, _rx) =
            CaptureSession::spawn(sh("read q; exit 255"), CaptureConfig::default()).unwrap();

        session.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_kills_after_grace_period() {
        let config = CaptureConfig::default().stop_grace_period(Duration::from_millis(100));
        let (mut session, _rx) =
            CaptureSession::spawn(sh("exec sleep 30"), config).unwrap();

        session.stop().await.unwrap();
        assert!(session.id().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_exit_is_reported() {
        let (mut session, _rx) =
            CaptureSession::spawn(sh("exit 3"), CaptureConfig::default()).unwrap();

        match session.wait().await {
            Err(Error::Subprocess(SubprocessError::NonZeroExit(3))) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_encoder_is_unavailable() {
        assert!(!is_available("definitely-not-an-encoder-binary").await);
    }
}
