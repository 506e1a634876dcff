use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg not found")]
    FfmpegNotFound,
}

/// Pulls the source stream through a child ffmpeg, remuxed to MPEG-TS with
/// original timestamps preserved. Works for files, HTTP(S) streams and RTSP
/// cameras alike; reconnecting after a failure is the caller's concern.
pub struct FfmpegIngest {
    child: Child,
    stdout: ChildStdout,
}

impl FfmpegIngest {
    pub fn spawn(url: &str) -> Result<Self, IngestError> {
        let mut args: Vec<&str> = vec!["-hide_banner", "-loglevel", "warning"];
        if url.starts_with("rtsp://") {
            args.extend(["-rtsp_transport", "tcp"]);
        }
        args.extend([
            "-i",
            url,
            "-c",
            "copy",
            "-f",
            "mpegts",
            "-mpegts_copyts",
            "1",
            "-",
        ]);

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    IngestError::FfmpegNotFound
                } else {
                    IngestError::Io(e)
                }
            })?;

        let stdout = child.stdout.take().expect("stdout piped");
        tracing::info!(url, "source ingest started");

        Ok(Self { child, stdout })
    }

    /// Read the next chunk of transport-stream bytes. Returns 0 at end of
    /// stream.
    pub fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Drop for FfmpegIngest {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
