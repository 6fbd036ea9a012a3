//! Playback engine: control-plane operations.
//!
//! The engine owns one decoder and one output stream. Control operations may be
//! called from any thread; the output stream calls back into the engine from
//! its own real-time thread (see [`render`](super::render)).
//!
//! # Locking
//!
//! * `decoder` guards every decoder access, including the render path.
//! * `stream` guards the output stream handle. The render path never takes it.
//! * When both are needed, `stream` is taken first. The decoder lock is never
//!   held across a stream request, so a transport that waits for an in-flight
//!   callback cannot deadlock against the render path.
//! * `playing` / `stop_requested` are atomics read by the render path without
//!   any lock.

use super::state::{AtomicPlaybackState, ModuleInfo, PlaybackEvent, PlaybackState};
use super::traits::{
    Control, DecoderFactory, ModuleDecoder, OutputBackend, OutputStream, RenderParam,
};
use crate::config::EngineConfig;
use crate::error::{PlaybackError, PlaybackResult};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Tempo and pitch factor reported when nothing is loaded.
pub const NEUTRAL_FACTOR: f64 = 1.0;

/// Shared engine state. The output stream holds an `Arc` to this as its
/// render callback.
pub(crate) struct EngineCore<F: DecoderFactory, B: OutputBackend> {
    pub(super) config: EngineConfig,
    factory: F,
    pub(super) backend: B,
    pub(super) decoder: Mutex<Option<F::Decoder>>,
    pub(super) stream: Mutex<Option<B::Stream>>,
    pub(super) playing: AtomicBool,
    pub(super) stop_requested: AtomicBool,
    /// Identity of the installed stream; bumped on every open and close.
    pub(super) generation: AtomicU64,
    pub(super) state: AtomicPlaybackState,
    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
    pub(super) this: Weak<Self>,
}

impl<F, B> EngineCore<F, B>
where
    F: DecoderFactory + 'static,
    B: OutputBackend + 'static,
{
    fn new(factory: F, backend: B, config: EngineConfig) -> Arc<Self> {
        let (events_tx, events_rx) = channel::bounded(config.event_capacity.max(1));

        Arc::new_cyclic(|this| Self {
            config,
            factory,
            backend,
            decoder: Mutex::new(None),
            stream: Mutex::new(None),
            playing: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            state: AtomicPlaybackState::new(PlaybackState::Idle),
            events_tx,
            events_rx,
            this: this.clone(),
        })
    }

    /// Queue an event without blocking, discarding the oldest one when full.
    pub(super) fn emit(&self, event: PlaybackEvent) {
        if let Err(TrySendError::Full(event)) = self.events_tx.try_send(event) {
            let _ = self.events_rx.try_recv();
            let _ = self.events_tx.try_send(event);
        }
    }

    fn with_decoder<R>(&self, f: impl FnOnce(&mut F::Decoder) -> R) -> Option<R> {
        self.decoder.lock().as_mut().map(f)
    }

    fn load(&self, bytes: &[u8]) -> PlaybackResult<()> {
        let mut stream = self.stream.lock();
        if self.playing.load(Ordering::Acquire) {
            debug!("Stopping current module before load");
            self.stop_locked(&mut stream);
        }

        let info = {
            let mut slot = self.decoder.lock();
            let replaced = slot.take().is_some();
            if replaced {
                debug!("Destroyed previous module");
            }

            match self.factory.create(bytes) {
                Ok(decoder) => {
                    let info = ModuleInfo::from_decoder(&decoder);
                    *slot = Some(decoder);
                    info
                }
                Err(err) => {
                    self.playing.store(false, Ordering::Release);
                    self.state.store(PlaybackState::Idle);
                    error!(%err, size = bytes.len(), "Failed to load module");
                    drop(slot);
                    drop(stream);
                    if replaced {
                        self.emit(PlaybackEvent::Unloaded);
                    }
                    return Err(err);
                }
            }
        };

        info!(
            title = %info.title,
            module_type = %info.type_long,
            duration_seconds = info.duration_seconds,
            "Module loaded"
        );

        self.state.store(PlaybackState::Loaded);
        if stream.is_none() {
            *stream = self.open_stream();
        }
        drop(stream);

        self.emit(PlaybackEvent::Loaded(info));
        Ok(())
    }

    fn load_from_path(&self, path: &Path) -> PlaybackResult<()> {
        debug!(path = %path.display(), "Loading module from file");

        let bytes = std::fs::read(path).map_err(|source| {
            error!(path = %path.display(), %source, "Failed to read module file");
            PlaybackError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;

        self.load(&bytes)
    }

    fn unload(&self) {
        let mut stream = self.stream.lock();
        self.stop_locked(&mut stream);

        if self.decoder.lock().take().is_some() {
            self.state.store(PlaybackState::Idle);
            drop(stream);
            debug!("Unloaded module");
            self.emit(PlaybackEvent::Unloaded);
        }
    }

    fn play(&self) -> PlaybackResult<()> {
        let mut slot = self.stream.lock();
        if self.decoder.lock().is_none() {
            error!("Cannot play: no module loaded");
            return Err(PlaybackError::NoModuleLoaded);
        }

        let Some(stream) = slot.as_mut() else {
            error!("Cannot play: no audio stream");
            return Err(PlaybackError::NoStream);
        };

        if self.playing.load(Ordering::Acquire) {
            debug!("Already playing");
            return Ok(());
        }

        // State goes first so a render that sees `playing` also sees Playing.
        let previous = self.state.load();
        self.stop_requested.store(false, Ordering::Release);
        self.state.store(PlaybackState::Playing);
        self.playing.store(true, Ordering::Release);

        if let Err(err) = stream.request_start() {
            self.playing.store(false, Ordering::Release);
            self.state.store(previous);
            error!(%err, "Failed to start stream");
            return Err(err);
        }

        info!("Playback started");
        self.emit(PlaybackEvent::Started);
        Ok(())
    }

    fn pause(&self) {
        let mut slot = self.stream.lock();
        if !self.playing.swap(false, Ordering::AcqRel) {
            debug!("Already paused");
            return;
        }

        if let Some(stream) = slot.as_mut() {
            if let Err(err) = stream.request_pause() {
                warn!(%err, "Failed to pause stream");
            }
        }

        self.state.store(PlaybackState::Paused);
        info!("Playback paused");
        self.emit(PlaybackEvent::Paused);
    }

    fn stop(&self) {
        let mut slot = self.stream.lock();
        self.stop_locked(&mut slot);
    }

    /// Stop and rewind. Caller holds the stream lock.
    fn stop_locked(&self, slot: &mut Option<B::Stream>) {
        if !self.playing.load(Ordering::Acquire) {
            debug!("Already stopped");
            return;
        }

        // Set before clearing `playing` so an in-flight render that runs dry
        // does not report end of track.
        self.stop_requested.store(true, Ordering::Release);
        self.playing.store(false, Ordering::Release);

        if let Some(stream) = slot.as_mut() {
            if let Err(err) = stream.request_stop() {
                warn!(%err, "Failed to stop stream");
            }
        }

        self.with_decoder(|decoder| decoder.set_position_seconds(0.0));

        self.state.store(PlaybackState::Stopped);
        info!("Playback stopped");
        self.emit(PlaybackEvent::Stopped);
    }

    fn seek(&self, seconds: f64) {
        match self.with_decoder(|decoder| decoder.set_position_seconds(seconds)) {
            Some(applied) => debug!(requested = seconds, applied, "Seeked"),
            None => debug!("Cannot seek: no module loaded"),
        }
    }

    fn set_render_param(&self, param: RenderParam) {
        if self
            .with_decoder(|decoder| decoder.set_render_param(param))
            .is_some()
        {
            debug!(?param, "Render parameter set");
        }
    }

    fn set_control(&self, control: Control, value: f64) {
        if self
            .with_decoder(|decoder| decoder.set_control(control, value))
            .is_some()
        {
            debug!(key = control.key(), value, "Control set");
        }
    }

    fn control(&self, control: Control) -> f64 {
        self.with_decoder(|decoder| decoder.control(control))
            .unwrap_or(NEUTRAL_FACTOR)
    }

    pub(super) fn release(&self) {
        self.unload();

        let mut slot = self.stream.lock();
        self.destroy_stream(&mut slot);
    }
}

/// Real-time tracker-module playback engine.
///
/// Generic over the decoder capability `F` and the output transport `B`. All
/// methods take `&self`; share the engine between threads with an `Arc`.
///
/// Dropping the engine unloads the module and closes the output stream.
pub struct Engine<F, B>
where
    F: DecoderFactory + 'static,
    B: OutputBackend + 'static,
{
    core: Arc<EngineCore<F, B>>,
}

impl<F, B> Engine<F, B>
where
    F: DecoderFactory + 'static,
    B: OutputBackend + 'static,
{
    /// Create an engine. No stream is opened until the first successful load.
    pub fn new(factory: F, backend: B, config: EngineConfig) -> Self {
        debug!(sample_rate = config.sample_rate, "Playback engine created");
        Self {
            core: EngineCore::new(factory, backend, config),
        }
    }

    /// Create an engine with the default configuration.
    pub fn with_defaults(factory: F, backend: B) -> Self {
        Self::new(factory, backend, EngineConfig::default())
    }

    /// The engine's configuration
    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// The output backend the engine opens streams through
    pub fn backend(&self) -> &B {
        &self.core.backend
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<EngineCore<F, B>> {
        &self.core
    }

    // ========== Module management ==========

    /// Load a module from memory, replacing any loaded module.
    ///
    /// On failure nothing stays loaded. The output stream is opened on the
    /// first successful load and kept across later loads.
    pub fn load(&self, bytes: &[u8]) -> PlaybackResult<()> {
        self.core.load(bytes)
    }

    /// Read a module file fully into memory and [`load`](Self::load) it.
    pub fn load_from_path(&self, path: impl AsRef<Path>) -> PlaybackResult<()> {
        self.core.load_from_path(path.as_ref())
    }

    /// Stop playback if needed and destroy the loaded module.
    ///
    /// The output stream is kept open.
    pub fn unload(&self) {
        self.core.unload()
    }

    /// Unload the module and close the output stream.
    pub fn release(&self) {
        self.core.release()
    }

    // ========== Transport ==========

    /// Start or resume playback.
    ///
    /// Fails without a loaded module or an output stream. Calling it while
    /// already playing succeeds without issuing another start request.
    pub fn play(&self) -> PlaybackResult<()> {
        self.core.play()
    }

    /// Pause playback, keeping the current position. No-op if not playing.
    pub fn pause(&self) {
        self.core.pause()
    }

    /// Stop playback and rewind to the start. No-op if not playing.
    pub fn stop(&self) {
        self.core.stop()
    }

    /// Seek to `seconds`. The decoder clamps out-of-range positions.
    pub fn seek(&self, seconds: f64) {
        self.core.seek(seconds)
    }

    // ========== Configuration ==========

    /// Set repeat count: -1 for infinite, 0 to play once, n for n repeats
    pub fn set_repeat_count(&self, count: i32) {
        if self
            .core
            .with_decoder(|decoder| decoder.set_repeat_count(count))
            .is_some()
        {
            debug!(count, "Repeat count set");
        }
    }

    /// Set master gain in millibel
    pub fn set_master_gain(&self, gain_millibel: i32) {
        self.core
            .set_render_param(RenderParam::MasterGainMillibel(gain_millibel));
    }

    /// Set stereo separation in percent (0-200, 100 = unmodified)
    pub fn set_stereo_separation(&self, percent: i32) {
        self.core
            .set_render_param(RenderParam::StereoSeparationPercent(percent));
    }

    /// Set tempo factor (0.25 to 2.0, 1.0 = unmodified)
    pub fn set_tempo_factor(&self, factor: f64) {
        self.core.set_control(Control::TempoFactor, factor)
    }

    /// Current tempo factor, 1.0 when nothing is loaded
    pub fn tempo_factor(&self) -> f64 {
        self.core.control(Control::TempoFactor)
    }

    /// Set pitch factor (0.25 to 2.0, 1.0 = unmodified)
    pub fn set_pitch_factor(&self, factor: f64) {
        self.core.set_control(Control::PitchFactor, factor)
    }

    /// Current pitch factor, 1.0 when nothing is loaded
    pub fn pitch_factor(&self) -> f64 {
        self.core.control(Control::PitchFactor)
    }

    // ========== State queries ==========

    /// Whether the engine is producing audio
    pub fn is_playing(&self) -> bool {
        self.core.playing.load(Ordering::Acquire)
    }

    /// Current transport state
    pub fn state(&self) -> PlaybackState {
        self.core.state.load()
    }

    /// Whether an output stream is currently open
    pub fn has_stream(&self) -> bool {
        self.core.stream.lock().is_some()
    }

    /// Whether a module is currently loaded
    pub fn is_loaded(&self) -> bool {
        self.core.decoder.lock().is_some()
    }

    /// Current position in seconds, 0.0 when nothing is loaded
    pub fn position_seconds(&self) -> f64 {
        self.core
            .with_decoder(|decoder| decoder.position_seconds())
            .unwrap_or(0.0)
    }

    /// Module duration in seconds, 0.0 when nothing is loaded
    pub fn duration_seconds(&self) -> f64 {
        self.core
            .with_decoder(|decoder| decoder.duration_seconds())
            .unwrap_or(0.0)
    }

    /// Receiver for engine events.
    ///
    /// All receivers share one bounded queue: each event is delivered to a
    /// single receiver, and the oldest event is dropped when the queue is full.
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.core.events_rx.clone()
    }

    // ========== Module information ==========

    /// Metadata value for `key` (e.g. "title", "artist", "type_long"), empty
    /// when absent or nothing is loaded
    pub fn metadata(&self, key: &str) -> String {
        self.core
            .with_decoder(|decoder| decoder.metadata(key))
            .flatten()
            .unwrap_or_default()
    }

    /// Snapshot of the loaded module's metadata and structure
    pub fn module_info(&self) -> Option<ModuleInfo> {
        self.core
            .with_decoder(|decoder| ModuleInfo::from_decoder(decoder))
    }

    /// Current order index, -1 when nothing is loaded
    pub fn current_order(&self) -> i32 {
        self.core
            .with_decoder(|decoder| decoder.current_order())
            .unwrap_or(-1)
    }

    /// Current pattern index, -1 when nothing is loaded
    pub fn current_pattern(&self) -> i32 {
        self.core
            .with_decoder(|decoder| decoder.current_pattern())
            .unwrap_or(-1)
    }

    /// Current row, -1 when nothing is loaded
    pub fn current_row(&self) -> i32 {
        self.core
            .with_decoder(|decoder| decoder.current_row())
            .unwrap_or(-1)
    }

    /// Number of channels, 0 when nothing is loaded
    pub fn num_channels(&self) -> i32 {
        self.core
            .with_decoder(|decoder| decoder.num_channels())
            .unwrap_or(0)
    }

    /// Number of patterns, 0 when nothing is loaded
    pub fn num_patterns(&self) -> i32 {
        self.core
            .with_decoder(|decoder| decoder.num_patterns())
            .unwrap_or(0)
    }

    /// Number of orders, 0 when nothing is loaded
    pub fn num_orders(&self) -> i32 {
        self.core
            .with_decoder(|decoder| decoder.num_orders())
            .unwrap_or(0)
    }

    /// Number of instruments, 0 when nothing is loaded
    pub fn num_instruments(&self) -> i32 {
        self.core
            .with_decoder(|decoder| decoder.num_instruments())
            .unwrap_or(0)
    }

    /// Number of samples, 0 when nothing is loaded
    pub fn num_samples(&self) -> i32 {
        self.core
            .with_decoder(|decoder| decoder.num_samples())
            .unwrap_or(0)
    }
}

impl<F, B> Drop for Engine<F, B>
where
    F: DecoderFactory + 'static,
    B: OutputBackend + 'static,
{
    fn drop(&mut self) {
        debug!("Playback engine dropped");
        self.core.release();
    }
}
