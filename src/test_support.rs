//! Instrumented decoder and output stubs for unit tests.

use crate::error::{PlaybackError, PlaybackResult};
use crate::playback::traits::{
    CHANNEL_COUNT, CallbackResult, Control, DecoderFactory, ModuleDecoder, OutputBackend,
    OutputStream, RenderCallback, RenderParam, StreamConfig,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Nominal rate the stub measures positions in.
pub(crate) const STUB_RATE: u32 = 48_000;

/// Value written for every rendered sample.
pub(crate) const STUB_LEVEL: f32 = 0.25;

pub(crate) struct StubDecoder {
    total_frames: u64,
    cursor: u64,
    tempo: f64,
    pitch: f64,
    pub(crate) repeat_count: i32,
    pub(crate) gain_millibel: i32,
    pub(crate) separation: i32,
    metadata: HashMap<String, String>,
    live: Option<Arc<AtomicUsize>>,
}

impl StubDecoder {
    pub(crate) fn new(total_frames: u64) -> Self {
        Self {
            total_frames,
            cursor: 0,
            tempo: 1.0,
            pitch: 1.0,
            repeat_count: 0,
            gain_millibel: 0,
            separation: 100,
            metadata: HashMap::new(),
            live: None,
        }
    }

    pub(crate) fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    fn tracked(mut self, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        self.live = Some(live);
        self
    }
}

impl Drop for StubDecoder {
    fn drop(&mut self) {
        if let Some(live) = &self.live {
            live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl ModuleDecoder for StubDecoder {
    fn render_interleaved_stereo(&mut self, _sample_rate: u32, out: &mut [f32]) -> usize {
        let wanted = (out.len() / CHANNEL_COUNT) as u64;
        let frames = wanted.min(self.total_frames - self.cursor) as usize;
        out[..frames * CHANNEL_COUNT].fill(STUB_LEVEL);
        self.cursor += frames as u64;
        frames
    }

    fn position_seconds(&self) -> f64 {
        self.cursor as f64 / STUB_RATE as f64
    }

    fn duration_seconds(&self) -> f64 {
        self.total_frames as f64 / STUB_RATE as f64
    }

    fn set_position_seconds(&mut self, seconds: f64) -> f64 {
        let frame = (seconds.max(0.0) * STUB_RATE as f64) as u64;
        self.cursor = frame.min(self.total_frames);
        self.position_seconds()
    }

    fn set_repeat_count(&mut self, count: i32) {
        self.repeat_count = count;
    }

    fn set_render_param(&mut self, param: RenderParam) {
        match param {
            RenderParam::MasterGainMillibel(gain) => self.gain_millibel = gain,
            RenderParam::StereoSeparationPercent(percent) => self.separation = percent,
        }
    }

    fn set_control(&mut self, control: Control, value: f64) {
        match control {
            Control::TempoFactor => self.tempo = value,
            Control::PitchFactor => self.pitch = value,
        }
    }

    fn control(&self, control: Control) -> f64 {
        match control {
            Control::TempoFactor => self.tempo,
            Control::PitchFactor => self.pitch,
        }
    }

    fn metadata(&self, key: &str) -> Option<String> {
        self.metadata.get(key).cloned()
    }

    fn current_order(&self) -> i32 {
        (self.cursor / 4096) as i32
    }

    fn current_pattern(&self) -> i32 {
        self.current_order() % 8
    }

    fn current_row(&self) -> i32 {
        ((self.cursor / 64) % 64) as i32
    }

    fn num_channels(&self) -> i32 {
        4
    }

    fn num_patterns(&self) -> i32 {
        8
    }

    fn num_orders(&self) -> i32 {
        12
    }

    fn num_instruments(&self) -> i32 {
        0
    }

    fn num_samples(&self) -> i32 {
        15
    }
}

/// Accepts bytes starting with `MOD`; a trailing little-endian `u32` after the
/// magic sets the length in frames.
#[derive(Default)]
pub(crate) struct StubFactory {
    pub(crate) live: Arc<AtomicUsize>,
    pub(crate) created: AtomicUsize,
}

impl StubFactory {
    pub(crate) fn module(frames: u32) -> Vec<u8> {
        let mut bytes = b"MOD".to_vec();
        bytes.extend_from_slice(&frames.to_le_bytes());
        bytes
    }

    pub(crate) fn live_decoders(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl DecoderFactory for StubFactory {
    type Decoder = StubDecoder;

    fn create(&self, bytes: &[u8]) -> PlaybackResult<StubDecoder> {
        let Some(rest) = bytes.strip_prefix(b"MOD") else {
            return Err(PlaybackError::load("unrecognised module header"));
        };
        let frames = match rest.get(..4) {
            Some(len) => u32::from_le_bytes([len[0], len[1], len[2], len[3]]),
            None => STUB_RATE * 10,
        };

        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(StubDecoder::new(u64::from(frames))
            .with_metadata("title", "stub module")
            .with_metadata("type", "mod")
            .tracked(Arc::clone(&self.live)))
    }
}

#[derive(Default)]
pub(crate) struct BackendLog {
    pub(crate) opens: AtomicUsize,
    pub(crate) starts: AtomicUsize,
    pub(crate) pauses: AtomicUsize,
    pub(crate) stops: AtomicUsize,
    pub(crate) closes: AtomicUsize,
    pub(crate) live: AtomicUsize,
    pub(crate) fail_open: AtomicBool,
    pub(crate) fail_start: AtomicBool,
    next_id: AtomicUsize,
    callback: Mutex<Option<(usize, Arc<dyn RenderCallback>)>>,
    pub(crate) last_config: Mutex<Option<StreamConfig>>,
}

impl BackendLog {
    pub(crate) fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Output backend driven by the test thread instead of a device.
#[derive(Clone, Default)]
pub(crate) struct ManualBackend {
    pub(crate) log: Arc<BackendLog>,
}

impl ManualBackend {
    /// The render callback of the open stream
    pub(crate) fn callback(&self) -> Option<Arc<dyn RenderCallback>> {
        self.log
            .callback
            .lock()
            .as_ref()
            .map(|(_, callback)| Arc::clone(callback))
    }

    /// Pull `frames` stereo frames through the open stream's render callback.
    pub(crate) fn pull(&self, frames: usize) -> Option<(Vec<f32>, CallbackResult)> {
        let callback = self.callback()?;
        let mut buffer = vec![f32::NAN; frames * CHANNEL_COUNT];
        let result = callback.render(&mut buffer);
        Some((buffer, result))
    }

    /// Render into a caller-supplied buffer.
    pub(crate) fn render_into(&self, buffer: &mut [f32]) -> Option<CallbackResult> {
        let callback = self.callback()?;
        Some(callback.render(buffer))
    }

    /// Simulate the transport closing the stream after a fatal error.
    pub(crate) fn fail_stream(&self, reason: &str) {
        let callback = self.log.callback.lock().take();
        if let Some((_, callback)) = callback {
            callback.on_error_after_close(PlaybackError::stream_lost(reason));
        }
    }

    pub(crate) fn has_stream(&self) -> bool {
        self.log.callback.lock().is_some()
    }
}

impl OutputBackend for ManualBackend {
    type Stream = ManualStream;

    fn open(
        &self,
        config: &StreamConfig,
        callback: Arc<dyn RenderCallback>,
    ) -> PlaybackResult<ManualStream> {
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        *self.log.last_config.lock() = Some(config.clone());

        if self.log.fail_open.load(Ordering::SeqCst) {
            return Err(PlaybackError::stream_open("device unavailable"));
        }

        let id = self.log.next_id.fetch_add(1, Ordering::SeqCst);
        self.log.live.fetch_add(1, Ordering::SeqCst);
        *self.log.callback.lock() = Some((id, callback));

        Ok(ManualStream {
            id,
            log: Arc::clone(&self.log),
            closed: false,
        })
    }
}

pub(crate) struct ManualStream {
    id: usize,
    log: Arc<BackendLog>,
    closed: bool,
}

impl OutputStream for ManualStream {
    fn request_start(&mut self) -> PlaybackResult<()> {
        if self.log.fail_start.load(Ordering::SeqCst) {
            return Err(PlaybackError::stream_control("start", "device busy"));
        }
        self.log.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn request_pause(&mut self) -> PlaybackResult<()> {
        self.log.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn request_stop(&mut self) -> PlaybackResult<()> {
        self.log.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        self.log.live.fetch_sub(1, Ordering::SeqCst);

        let mut callback = self.log.callback.lock();
        if callback.as_ref().is_some_and(|(id, _)| *id == self.id) {
            *callback = None;
        }
    }
}

impl Drop for ManualStream {
    fn drop(&mut self) {
        self.close();
    }
}
