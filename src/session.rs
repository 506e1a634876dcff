use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::analysis::{
    frame_similarity, is_frame_black, AudioChunk, AudioComparator, BoundaryEvent, DeadAirTracker,
    SceneCutTracker, SilenceDetector, SimilarityWeights,
};
use crate::config::Config;
use crate::media::{
    AudioFrame, FfmpegIngest, FrameDecoder, IngestError, SampleDecoder, StreamKind, TsDemuxer,
    VideoFrame, ANALYSIS_HEIGHT, ANALYSIS_WIDTH,
};
use crate::mux::{PacketSink, SegmentMuxer, TsFileSink};
use crate::storage::{BoundaryStore, CutStore, SegmentJournal, SegmentRecord};

const INGEST_CHUNK: usize = 188 * 64;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("source ingest failed: {0}")]
    Ingest(#[from] IngestError),
    #[error("source read failed: {0}")]
    Read(std::io::Error),
    #[error("decoder failed: {0}")]
    Decoder(std::io::Error),
    #[error("journal failed: {0}")]
    Journal(std::io::Error),
    #[error("output directory failed: {0}")]
    Output(std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEvent {
    Boundary(BoundaryEvent),
    Cut(f64),
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub end_time_secs: f64,
    pub boundaries: Vec<BoundaryEvent>,
    pub cuts: Vec<f64>,
}

/// The single-threaded segmentation pipeline.
///
/// Consumes decoded frames in arrival order (video before audio on equal
/// timestamps, matching demultiplexer emission), keeps the latest black and
/// silence flags, and drives the dead-air and scene trackers. Detected
/// events land in the stores and the journal as they fire, so they are
/// emitted in non-decreasing timestamp order.
pub struct StreamSession<C> {
    black_threshold: f64,
    weights: SimilarityWeights,
    silence: SilenceDetector,
    dead_air: DeadAirTracker,
    scene: SceneCutTracker<C>,
    boundary_store: BoundaryStore,
    cut_store: CutStore,
    journal: Option<SegmentJournal>,
    is_black: bool,
    is_silent: bool,
    previous_frame: Option<VideoFrame>,
    current_time_secs: f64,
}

impl<C: AudioComparator> StreamSession<C> {
    pub fn new(
        config: &Config,
        comparator: C,
        boundary_store: BoundaryStore,
        cut_store: CutStore,
        journal: Option<SegmentJournal>,
    ) -> Self {
        Self {
            black_threshold: config.black.threshold,
            weights: config.scene.weights,
            silence: SilenceDetector::new(&config.silence_config()),
            dead_air: DeadAirTracker::new(&config.dead_air_config()),
            scene: SceneCutTracker::new(&config.scene_config(), comparator),
            boundary_store,
            cut_store,
            journal,
            is_black: false,
            is_silent: false,
            previous_frame: None,
            current_time_secs: 0.0,
        }
    }

    pub fn handle_video(&mut self, frame: VideoFrame) -> Vec<SessionEvent> {
        let time_secs = frame.time_secs;
        self.current_time_secs = self.current_time_secs.max(time_secs);
        let mut events = Vec::new();

        let black = is_frame_black(&frame, self.black_threshold);
        if black != self.is_black {
            tracing::info!(
                time_secs = format!("{:.2}", time_secs),
                black,
                "black state changed"
            );
            self.is_black = black;
        }

        if let Some(event) = self.dead_air.observe(time_secs, self.is_black, self.is_silent) {
            self.record_boundary(event);
            events.push(SessionEvent::Boundary(event));
        }

        let similarity = frame_similarity(&frame, self.previous_frame.as_ref(), &self.weights);
        if let Some(cut) = self.scene.observe_similarity(time_secs, similarity) {
            self.record_cut(cut);
            events.push(SessionEvent::Cut(cut));
        }

        self.previous_frame = Some(frame);
        events
    }

    pub fn handle_audio(&mut self, frame: AudioFrame) -> Vec<SessionEvent> {
        let time_secs = frame.time_secs;
        self.current_time_secs = self.current_time_secs.max(time_secs);
        let mut events = Vec::new();

        let silent = self.silence.push(&frame.samples);
        if silent != self.is_silent {
            tracing::info!(
                time_secs = format!("{:.2}", time_secs),
                silent,
                "silence state changed"
            );
            self.is_silent = silent;
        }

        if let Some(event) = self.dead_air.observe(time_secs, self.is_black, self.is_silent) {
            self.record_boundary(event);
            events.push(SessionEvent::Boundary(event));
        }

        let chunk = AudioChunk {
            time_secs,
            samples: frame.samples,
        };
        for cut in self.scene.observe_audio(chunk) {
            self.record_cut(cut);
            events.push(SessionEvent::Cut(cut));
        }

        events
    }

    pub fn current_time_secs(&self) -> f64 {
        self.current_time_secs
    }

    /// End of stream or duration limit: the open dead-air candidate is
    /// discarded, pending cuts resolve against the audio that exists, and
    /// the final scene segment closes.
    pub fn finish(mut self) -> SessionOutcome {
        self.dead_air.finish();
        for cut in self.scene.finish(self.current_time_secs) {
            self.record_cut(cut);
        }
        self.outcome()
    }

    /// Abort mid-stream: open candidates and pending cuts are discarded, not
    /// force-confirmed, so no boundary is fabricated from partial evidence.
    pub fn abort(mut self) -> SessionOutcome {
        self.dead_air.finish();
        self.scene.discard_pending();
        self.outcome()
    }

    fn outcome(self) -> SessionOutcome {
        SessionOutcome {
            end_time_secs: self.current_time_secs,
            boundaries: self.boundary_store.snapshot(),
            cuts: self.cut_store.snapshot(),
        }
    }

    fn record_boundary(&mut self, event: BoundaryEvent) {
        self.boundary_store.insert(event);
        if let Some(journal) = &mut self.journal {
            if let Err(e) = journal.append(&SegmentRecord::boundary(&event)) {
                tracing::warn!(error = %e, "failed to journal boundary event");
            }
        }
    }

    fn record_cut(&mut self, time_secs: f64) {
        self.cut_store.insert(time_secs);
        if let Some(journal) = &mut self.journal {
            if let Err(e) = journal.append(&SegmentRecord::cut(time_secs)) {
                tracing::warn!(error = %e, "failed to journal cut event");
            }
        }
    }
}

/// Run a full session against the configured source: ingest, demultiplex,
/// decode, classify, and collect events until end of stream, the duration
/// limit, or an abort through `shutdown`.
pub fn run_stream(config: &Config, shutdown: &AtomicBool) -> Result<SessionOutcome, SessionError> {
    let journal = match &config.output.journal_path {
        Some(path) => Some(SegmentJournal::create(path).map_err(SessionError::Journal)?),
        None => None,
    };

    let mut session = StreamSession::new(
        config,
        config.comparator(),
        BoundaryStore::new(),
        CutStore::new(),
        journal,
    );

    let mut muxer = match &config.output.units_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(SessionError::Output)?;
            let dir = dir.clone();
            Some(SegmentMuxer::new(move |index: u32| {
                TsFileSink::create(&dir.join(format!("unit_{index:04}.ts")))
            }))
        }
        None => None,
    };

    let mut ingest = FfmpegIngest::spawn(&config.source.url)?;
    let mut demux = TsDemuxer::new();
    let mut video_decoder =
        FrameDecoder::new(config.source.sample_fps).map_err(SessionError::Decoder)?;
    let mut audio_decoder =
        SampleDecoder::new(config.source.sample_rate).map_err(SessionError::Decoder)?;

    let fps = config.source.sample_fps as f64;
    let rate = config.source.sample_rate as f64;
    let mut video_base: Option<f64> = None;
    let mut audio_base: Option<f64> = None;
    let mut video_frames: u64 = 0;
    let mut audio_samples: u64 = 0;

    let mut buf = vec![0u8; INGEST_CHUNK];
    let mut aborted = false;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("session aborted at frame boundary");
            aborted = true;
            break;
        }

        if !video_decoder.is_alive() {
            tracing::warn!("video decoder died, restarting");
            video_decoder =
                FrameDecoder::new(config.source.sample_fps).map_err(SessionError::Decoder)?;
        }
        if !audio_decoder.is_alive() {
            tracing::warn!("audio decoder died, restarting");
            audio_decoder =
                SampleDecoder::new(config.source.sample_rate).map_err(SessionError::Decoder)?;
        }

        let n = ingest.read(&mut buf).map_err(SessionError::Read)?;
        if n == 0 {
            tracing::info!("source stream ended");
            break;
        }

        for packet in demux.push(&buf[..n]) {
            match packet.kind {
                StreamKind::Video => {
                    video_base.get_or_insert(packet.time_secs());
                    video_decoder.feed(&packet.cells);
                }
                StreamKind::Audio => {
                    audio_base.get_or_insert(packet.time_secs());
                    audio_decoder.feed(&packet.cells);
                }
            }
            if let Some(muxer) = muxer.as_mut() {
                muxer.write(&packet);
            }
        }

        if let Some(base) = video_base {
            for data in video_decoder.poll() {
                let frame = video_frame(base, &mut video_frames, fps, data);
                let events = session.handle_video(frame);
                apply_events(&events, &mut muxer);
            }
        }
        if let Some(base) = audio_base {
            for samples in audio_decoder.poll() {
                let frame = audio_frame(base, &mut audio_samples, rate, config, samples);
                let events = session.handle_audio(frame);
                apply_events(&events, &mut muxer);
            }
        }

        if let Some(limit) = config.source.duration_limit_secs {
            if session.current_time_secs() >= limit {
                tracing::info!(limit_secs = limit, "duration limit reached");
                break;
            }
        }
    }

    if aborted {
        if let Some(muxer) = muxer {
            muxer.finish();
        }
        return Ok(session.abort());
    }

    // Flush the demuxer and drain both decoders
    for packet in demux.flush() {
        match packet.kind {
            StreamKind::Video => {
                video_base.get_or_insert(packet.time_secs());
                video_decoder.feed(&packet.cells);
            }
            StreamKind::Audio => {
                audio_base.get_or_insert(packet.time_secs());
                audio_decoder.feed(&packet.cells);
            }
        }
        if let Some(muxer) = muxer.as_mut() {
            muxer.write(&packet);
        }
    }
    if let Some(base) = video_base {
        for data in video_decoder.finish() {
            let frame = video_frame(base, &mut video_frames, fps, data);
            let events = session.handle_video(frame);
            apply_events(&events, &mut muxer);
        }
    }
    if let Some(base) = audio_base {
        for samples in audio_decoder.finish() {
            let frame = audio_frame(base, &mut audio_samples, rate, config, samples);
            let events = session.handle_audio(frame);
            apply_events(&events, &mut muxer);
        }
    }

    if let Some(muxer) = muxer {
        muxer.finish();
    }

    Ok(session.finish())
}

fn video_frame(base: f64, frames_seen: &mut u64, fps: f64, data: Vec<u8>) -> VideoFrame {
    let time_secs = base + *frames_seen as f64 / fps;
    *frames_seen += 1;
    VideoFrame {
        time_secs,
        width: ANALYSIS_WIDTH,
        height: ANALYSIS_HEIGHT,
        data,
    }
}

fn audio_frame(
    base: f64,
    samples_seen: &mut u64,
    rate: f64,
    config: &Config,
    samples: Vec<f32>,
) -> AudioFrame {
    let time_secs = base + *samples_seen as f64 / rate;
    *samples_seen += samples.len() as u64;
    AudioFrame {
        time_secs,
        sample_rate: config.source.sample_rate,
        samples,
    }
}

fn apply_events<S: PacketSink, F: FnMut(u32) -> std::io::Result<S>>(
    events: &[SessionEvent],
    muxer: &mut Option<SegmentMuxer<S, F>>,
) {
    let Some(muxer) = muxer.as_mut() else {
        return;
    };
    for event in events {
        if let SessionEvent::Cut(time_secs) = event {
            muxer.rotate(*time_secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    struct StubComparator {
        similar: bool,
    }

    impl AudioComparator for StubComparator {
        fn are_similar(&self, _before: &[f32], _after: &[f32]) -> bool {
            self.similar
        }
    }

    const WIDTH: i32 = 32;
    const HEIGHT: i32 = 32;
    const SAMPLE_RATE: u32 = 8000;
    // 0.05s grid: one video frame and one audio chunk per tick
    const TICK_SECS: f64 = 0.05;
    const CHUNK_SAMPLES: usize = 400;

    fn test_config() -> Config {
        Config::from_str(
            "[source]\nurl = \"test\"\nsample_rate = 8000\n[silence]\nwindow_secs = 0.05",
        )
        .unwrap()
    }

    fn session(similar_audio: bool) -> StreamSession<StubComparator> {
        StreamSession::new(
            &test_config(),
            StubComparator {
                similar: similar_audio,
            },
            BoundaryStore::new(),
            CutStore::new(),
            None,
        )
    }

    fn video(time_secs: f64, value: u8) -> VideoFrame {
        VideoFrame {
            time_secs,
            width: WIDTH,
            height: HEIGHT,
            data: vec![value; (WIDTH * HEIGHT * 3) as usize],
        }
    }

    fn audio(time_secs: f64, amplitude: f32) -> AudioFrame {
        AudioFrame {
            time_secs,
            sample_rate: SAMPLE_RATE,
            samples: vec![amplitude; CHUNK_SAMPLES],
        }
    }

    /// 40s synthetic stream, dead air at 10.0-10.5s and a jitter run at
    /// 10.6-10.65s: exactly one boundary covering the opening segment.
    #[test]
    fn boundary_fires_once_for_synthetic_stream() {
        let mut session = session(true);

        let ticks = (40.0 / TICK_SECS) as usize;
        for i in 0..ticks {
            let t = i as f64 * TICK_SECS;
            let in_main_gap = (10.0..10.5).contains(&t);
            let in_jitter_gap = (10.6..10.65).contains(&t);
            let dead = in_main_gap || in_jitter_gap;

            // Video first, then audio, matching demultiplexer emission order
            session.handle_video(video(t, if dead { 0 } else { 180 }));
            session.handle_audio(audio(t, if dead { 0.0 } else { 0.1 }));
        }

        let outcome = session.finish();
        assert_eq!(outcome.boundaries.len(), 1);
        let boundary = outcome.boundaries[0];
        assert!(boundary.start_secs.abs() < 1e-9);
        assert!((boundary.end_secs - 10.0).abs() < 1e-9);
    }

    #[test]
    fn definite_visual_change_confirms_a_cut() {
        let mut session = session(true);

        let ticks = (8.0 / TICK_SECS) as usize;
        for i in 0..ticks {
            let t = i as f64 * TICK_SECS;
            let value = if t < 5.0 { 30 } else { 220 };
            session.handle_video(video(t, value));
            session.handle_audio(audio(t, 0.1));
        }

        let outcome = session.finish();
        assert!(
            outcome.cuts.iter().any(|c| (c - 5.0).abs() < 1e-9),
            "expected cut at 5.0, got {:?}",
            outcome.cuts
        );
    }

    #[test]
    fn static_stream_yields_no_boundaries_and_one_final_cut() {
        let mut session = session(true);

        let ticks = (10.0 / TICK_SECS) as usize;
        for i in 0..ticks {
            let t = i as f64 * TICK_SECS;
            session.handle_video(video(t, 180));
            session.handle_audio(audio(t, 0.1));
        }

        let outcome = session.finish();
        assert!(outcome.boundaries.is_empty());
        // Only the final segment close
        assert_eq!(outcome.cuts.len(), 1);
        assert!((outcome.cuts[0] - outcome.end_time_secs).abs() < 1e-9);
    }

    #[test]
    fn abort_discards_open_dead_air_candidate() {
        let mut session = session(true);

        for i in 0..100 {
            let t = i as f64 * TICK_SECS;
            session.handle_video(video(t, 180));
            session.handle_audio(audio(t, 0.1));
        }
        // Dead air opens and the stream stops inside it
        for i in 100..120 {
            let t = i as f64 * TICK_SECS;
            session.handle_video(video(t, 0));
            session.handle_audio(audio(t, 0.0));
        }

        let outcome = session.finish();
        assert!(outcome.boundaries.is_empty());
    }

    #[test]
    fn abort_discards_pending_cuts() {
        // Comparator reports "different", so finish() confirms pending cuts
        // while abort() must drop the same ones
        let mut finished = session(false);
        let mut aborted = session(false);

        for i in 0..50 {
            let t = i as f64 * TICK_SECS;
            // Half-changed frames land in the ambiguous similarity band
            let value = if i % 2 == 0 { 60 } else { 110 };
            finished.handle_video(half_frame(t, 60, value));
            finished.handle_audio(audio(t, 0.1));
            aborted.handle_video(half_frame(t, 60, value));
            aborted.handle_audio(audio(t, 0.1));
        }

        let finished = finished.finish();
        assert!(
            !finished.cuts.is_empty(),
            "expected pending cuts to force-resolve at end of stream"
        );
        let aborted = aborted.abort();
        assert_eq!(aborted.cuts, Vec::<f64>::new());
    }

    fn half_frame(time_secs: f64, left: u8, right: u8) -> VideoFrame {
        let mut data = vec![left; (WIDTH * HEIGHT * 3) as usize];
        for row in 0..HEIGHT as usize {
            for col in (WIDTH as usize / 2)..WIDTH as usize {
                let at = (row * WIDTH as usize + col) * 3;
                data[at] = right;
                data[at + 1] = right;
                data[at + 2] = right;
            }
        }
        VideoFrame {
            time_secs,
            width: WIDTH,
            height: HEIGHT,
            data,
        }
    }

    #[test]
    fn events_are_emitted_in_timestamp_order() {
        let mut session = session(true);

        let mut event_times = Vec::new();
        let ticks = (30.0 / TICK_SECS) as usize;
        for i in 0..ticks {
            let t = i as f64 * TICK_SECS;
            let dead = (12.0..13.5).contains(&t) || (24.0..25.0).contains(&t);
            let events = session.handle_video(video(t, if dead { 0 } else { 180 }));
            event_times.extend(events.iter().map(event_time));
            let events = session.handle_audio(audio(t, if dead { 0.0 } else { 0.1 }));
            event_times.extend(events.iter().map(event_time));
        }

        assert!(!event_times.is_empty());
        for pair in event_times.windows(2) {
            assert!(pair[0] <= pair[1], "events out of order: {event_times:?}");
        }
    }

    fn event_time(event: &SessionEvent) -> f64 {
        match event {
            SessionEvent::Boundary(b) => b.end_secs,
            SessionEvent::Cut(t) => *t,
        }
    }
}
