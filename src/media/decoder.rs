use std::io::{Read, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const ANALYSIS_WIDTH: i32 = 320;
pub const ANALYSIS_HEIGHT: i32 = 240;
const VIDEO_FRAME_SIZE: usize = (ANALYSIS_WIDTH * ANALYSIS_HEIGHT * 3) as usize;

const AUDIO_CHUNK_SAMPLES: usize = 1024;

const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Decodes video transport cells into raw BGR frames at the analysis
/// resolution via a child ffmpeg. The fps filter resamples the stream onto a
/// uniform grid, so the n-th output frame sits at `n / sample_fps` seconds
/// after the first video timestamp.
pub struct FrameDecoder {
    feed_tx: Option<SyncSender<Vec<u8>>>,
    frame_rx: Receiver<Vec<u8>>,
    child: Option<Child>,
    _writer_handle: JoinHandle<()>,
    _reader_handle: JoinHandle<()>,
}

impl FrameDecoder {
    pub fn new(sample_fps: u32) -> Result<Self, std::io::Error> {
        let mut child = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "quiet",
                "-f",
                "mpegts",
                "-i",
                "pipe:0",
                "-an",
                "-vf",
                &format!("fps={sample_fps},scale={ANALYSIS_WIDTH}:{ANALYSIS_HEIGHT}"),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "bgr24",
                "pipe:1",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child.stdin.take().expect("stdin piped");
        let stdout = child.stdout.take().expect("stdout piped");

        let (feed_tx, feed_rx) = mpsc::sync_channel::<Vec<u8>>(16);
        let (frame_tx, frame_rx) = mpsc::sync_channel::<Vec<u8>>(64);

        let writer_handle = thread::spawn(move || {
            let mut stdin = stdin;
            while let Ok(data) = feed_rx.recv() {
                if stdin.write_all(&data).is_err() {
                    break;
                }
                if stdin.flush().is_err() {
                    break;
                }
            }
        });

        let reader_handle = thread::spawn(move || {
            let mut stdout = stdout;
            let mut buf = vec![0u8; VIDEO_FRAME_SIZE];
            while stdout.read_exact(&mut buf).is_ok() {
                if frame_tx.send(buf.clone()).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            feed_tx: Some(feed_tx),
            frame_rx,
            child: Some(child),
            _writer_handle: writer_handle,
            _reader_handle: reader_handle,
        })
    }

    /// Queue transport cells for decoding. Returns false once the decoder
    /// pipeline has gone away.
    pub fn feed(&mut self, cells: &[u8]) -> bool {
        match &self.feed_tx {
            Some(tx) => tx.send(cells.to_vec()).is_ok(),
            None => false,
        }
    }

    /// Drain every frame the decoder has produced so far without blocking.
    pub fn poll(&mut self) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        loop {
            match self.frame_rx.try_recv() {
                Ok(frame) => frames.push(frame),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        frames
    }

    /// Close the input side and collect the frames still in flight.
    pub fn finish(mut self) -> Vec<Vec<u8>> {
        self.feed_tx.take();
        let mut frames = Vec::new();
        loop {
            match self.frame_rx.recv_timeout(DRAIN_TIMEOUT) {
                Ok(frame) => frames.push(frame),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        frames
    }

    pub fn is_alive(&mut self) -> bool {
        self.child
            .as_mut()
            .map(|c| c.try_wait().ok().flatten().is_none())
            .unwrap_or(false)
    }
}

impl Drop for FrameDecoder {
    fn drop(&mut self) {
        // Close the feed channel so the writer thread exits
        self.feed_tx.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Decodes audio transport cells into mono f32 samples via a child ffmpeg.
/// Sample counts are exact, so the stream position of a chunk is
/// `samples_seen / sample_rate` after the first audio timestamp.
pub struct SampleDecoder {
    feed_tx: Option<SyncSender<Vec<u8>>>,
    chunk_rx: Receiver<Vec<f32>>,
    child: Option<Child>,
    _writer_handle: JoinHandle<()>,
    _reader_handle: JoinHandle<()>,
}

impl SampleDecoder {
    pub fn new(sample_rate: u32) -> Result<Self, std::io::Error> {
        let mut child = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "quiet",
                "-f",
                "mpegts",
                "-i",
                "pipe:0",
                "-vn",
                "-f",
                "f32le",
                "-ac",
                "1",
                "-ar",
                &sample_rate.to_string(),
                "pipe:1",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child.stdin.take().expect("stdin piped");
        let stdout = child.stdout.take().expect("stdout piped");

        let (feed_tx, feed_rx) = mpsc::sync_channel::<Vec<u8>>(16);
        let (chunk_tx, chunk_rx) = mpsc::sync_channel::<Vec<f32>>(64);

        let writer_handle = thread::spawn(move || {
            let mut stdin = stdin;
            while let Ok(data) = feed_rx.recv() {
                if stdin.write_all(&data).is_err() {
                    break;
                }
                if stdin.flush().is_err() {
                    break;
                }
            }
        });

        let reader_handle = thread::spawn(move || read_sample_chunks(stdout, chunk_tx));

        Ok(Self {
            feed_tx: Some(feed_tx),
            chunk_rx,
            child: Some(child),
            _writer_handle: writer_handle,
            _reader_handle: reader_handle,
        })
    }

    pub fn feed(&mut self, cells: &[u8]) -> bool {
        match &self.feed_tx {
            Some(tx) => tx.send(cells.to_vec()).is_ok(),
            None => false,
        }
    }

    pub fn poll(&mut self) -> Vec<Vec<f32>> {
        let mut chunks = Vec::new();
        loop {
            match self.chunk_rx.try_recv() {
                Ok(chunk) => chunks.push(chunk),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        chunks
    }

    pub fn finish(mut self) -> Vec<Vec<f32>> {
        self.feed_tx.take();
        let mut chunks = Vec::new();
        loop {
            match self.chunk_rx.recv_timeout(DRAIN_TIMEOUT) {
                Ok(chunk) => chunks.push(chunk),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        chunks
    }

    pub fn is_alive(&mut self) -> bool {
        self.child
            .as_mut()
            .map(|c| c.try_wait().ok().flatten().is_none())
            .unwrap_or(false)
    }
}

impl Drop for SampleDecoder {
    fn drop(&mut self) {
        self.feed_tx.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn read_sample_chunks(mut stdout: ChildStdout, chunk_tx: SyncSender<Vec<f32>>) {
    let mut buf = vec![0u8; AUDIO_CHUNK_SAMPLES * 4];
    let mut filled = 0;
    loop {
        match stdout.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                if filled == buf.len() {
                    if chunk_tx.send(bytes_to_samples(&buf)).is_err() {
                        return;
                    }
                    filled = 0;
                }
            }
            Err(_) => break,
        }
    }
    // Deliver the trailing partial chunk at end of stream
    let whole = filled - filled % 4;
    if whole > 0 {
        let _ = chunk_tx.send(bytes_to_samples(&buf[..whole]));
    }
}

fn bytes_to_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
