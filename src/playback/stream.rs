//! Output stream lifecycle: open, teardown and recovery after transport errors.

use super::engine::EngineCore;
use super::state::{PlaybackEvent, PlaybackState};
use super::traits::{
    CallbackResult, DecoderFactory, OutputBackend, OutputStream, RenderCallback,
};
use crate::error::PlaybackError;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};

/// Render source and error sink handed to one output stream.
///
/// Errors are tagged with the generation of the stream they came from, so a
/// late report from a stream that was already replaced is ignored.
struct StreamCallback<F: DecoderFactory, B: OutputBackend> {
    core: Arc<EngineCore<F, B>>,
    generation: u64,
}

impl<F, B> RenderCallback for StreamCallback<F, B>
where
    F: DecoderFactory + 'static,
    B: OutputBackend + 'static,
{
    fn render(&self, out: &mut [f32]) -> CallbackResult {
        self.core.render(out)
    }

    fn on_error_after_close(&self, error: PlaybackError) {
        self.core.handle_stream_error(self.generation, error);
    }
}

impl<F, B> EngineCore<F, B>
where
    F: DecoderFactory + 'static,
    B: OutputBackend + 'static,
{
    /// Open a new stream. Caller holds the stream lock.
    pub(super) fn open_stream(&self) -> Option<B::Stream> {
        let core = self.this.upgrade()?;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let callback: Arc<dyn RenderCallback> = Arc::new(StreamCallback { core, generation });
        let config = self.config.stream_config();

        match self.backend.open(&config, callback) {
            Ok(stream) => {
                info!(
                    generation,
                    sample_rate = config.sample_rate,
                    channels = config.channels,
                    performance_mode = ?config.performance_mode,
                    sharing_mode = ?config.sharing_mode,
                    "Output stream opened"
                );
                Some(stream)
            }
            Err(err) => {
                error!(%err, "Failed to open output stream");
                None
            }
        }
    }

    /// Stop and close the stream in `slot`, if any. Caller holds the stream lock.
    pub(super) fn destroy_stream(&self, slot: &mut Option<B::Stream>) {
        let Some(mut stream) = slot.take() else {
            return;
        };
        self.generation.fetch_add(1, Ordering::AcqRel);

        if self.playing.swap(false, Ordering::AcqRel) {
            self.state
                .transition(PlaybackState::Playing, PlaybackState::Paused);
            if let Err(err) = stream.request_stop() {
                warn!(%err, "Failed to stop stream before closing");
            }
        }
        stream.close();
        debug!("Output stream closed");
    }

    /// React to the transport closing stream `generation` after a fatal error.
    ///
    /// Playback is paused, position kept. With `recreate_on_error` a fresh
    /// stream replaces the dead one; the caller resumes with `play`.
    fn handle_stream_error(&self, generation: u64, err: PlaybackError) {
        let mut slot = self.stream.lock();
        if generation != self.generation.load(Ordering::Acquire) {
            debug!(%err, generation, "Ignoring error from a replaced stream");
            return;
        }

        error!(%err, "Output stream failed");
        self.state
            .transition(PlaybackState::Playing, PlaybackState::Paused);
        self.playing.store(false, Ordering::Release);
        self.emit(PlaybackEvent::StreamLost(err.to_string()));

        self.destroy_stream(&mut slot);

        if !self.config.recreate_on_error {
            warn!("Stream recreation disabled; output stays closed until the next load");
            return;
        }

        match self.open_stream() {
            Some(stream) => {
                *slot = Some(stream);
                drop(slot);
                info!("Output stream recovered");
                self.emit(PlaybackEvent::StreamRecovered);
            }
            None => warn!("Stream recovery failed; output stays closed until the next load"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::error::PlaybackError;
    use crate::playback::state::{PlaybackEvent, PlaybackState};
    use crate::playback::traits::RenderCallback;
    use crate::test_support::{BackendLog, ManualBackend, STUB_RATE, StubFactory};
    use crate::Engine;
    use std::sync::atomic::Ordering;

    fn playing(config: EngineConfig) -> (Engine<StubFactory, ManualBackend>, ManualBackend) {
        let backend = ManualBackend::default();
        let engine = Engine::new(StubFactory::default(), backend.clone(), config);
        engine.load(&StubFactory::module(STUB_RATE * 10)).unwrap();
        engine.play().unwrap();
        engine.seek(2.0);
        (engine, backend)
    }

    #[test]
    fn test_stream_error_recreates_stream() {
        let (engine, backend) = playing(EngineConfig::default());
        let events = engine.events();
        let _ = events.try_iter().count();

        backend.fail_stream("device unplugged");

        assert!(!engine.is_playing());
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert!(engine.has_stream());
        assert!(backend.has_stream());
        assert_eq!(BackendLog::count(&backend.log.opens), 2);
        assert_eq!(BackendLog::count(&backend.log.closes), 1);
        assert_eq!(BackendLog::count(&backend.log.live), 1);

        let received: Vec<_> = events.try_iter().collect();
        assert!(matches!(received[0], PlaybackEvent::StreamLost(ref reason) if reason.contains("device unplugged")));
        assert_eq!(received[1], PlaybackEvent::StreamRecovered);

        // position survives and playback resumes on the new stream
        assert_eq!(engine.position_seconds(), 2.0);
        engine.play().unwrap();
        assert!(engine.is_playing());
        assert!(backend.pull(64).is_some());
    }

    #[test]
    fn test_stream_error_without_recreation() {
        let config = EngineConfig::default().with_recreate_on_error(false);
        let (engine, backend) = playing(config);

        backend.fail_stream("device unplugged");

        assert!(!engine.has_stream());
        assert_eq!(BackendLog::count(&backend.log.opens), 1);
        assert!(matches!(engine.play(), Err(PlaybackError::NoStream)));
        assert!(engine.is_loaded());

        // the next load opens a fresh stream
        engine.load(&StubFactory::module(STUB_RATE)).unwrap();
        assert!(engine.has_stream());
        assert_eq!(BackendLog::count(&backend.log.opens), 2);
    }

    #[test]
    fn test_failed_recovery_leaves_stream_closed() {
        let (engine, backend) = playing(EngineConfig::default());
        backend.log.fail_open.store(true, Ordering::SeqCst);

        backend.fail_stream("device unplugged");

        assert!(!engine.has_stream());
        assert_eq!(BackendLog::count(&backend.log.live), 0);
        assert!(matches!(engine.play(), Err(PlaybackError::NoStream)));

        backend.log.fail_open.store(false, Ordering::SeqCst);
        engine.load(&StubFactory::module(STUB_RATE)).unwrap();
        assert!(engine.has_stream());
    }

    #[test]
    fn test_stream_error_after_release_is_ignored() {
        let (engine, backend) = playing(EngineConfig::default());
        let callback = backend.callback().unwrap();
        let events = engine.events();
        engine.release();
        let _ = events.try_iter().count();

        callback.on_error_after_close(PlaybackError::stream_lost("late error"));

        assert!(!engine.has_stream());
        assert_eq!(BackendLog::count(&backend.log.opens), 1);
        assert_eq!(events.try_iter().count(), 0);
    }

    #[test]
    fn test_late_error_leaves_replacement_stream_alone() {
        let (engine, backend) = playing(EngineConfig::default());
        let stale = backend.callback().unwrap();
        engine.release();

        engine.load(&StubFactory::module(STUB_RATE * 10)).unwrap();
        engine.play().unwrap();
        let events = engine.events();
        let _ = events.try_iter().count();

        stale.on_error_after_close(PlaybackError::stream_lost("late error"));

        assert!(engine.is_playing());
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(engine.has_stream());
        assert_eq!(BackendLog::count(&backend.log.opens), 2);
        assert_eq!(BackendLog::count(&backend.log.closes), 1);
        assert_eq!(events.try_iter().count(), 0);
    }

    #[test]
    fn test_repeated_error_from_same_stream_recovers_once() {
        let (engine, backend) = playing(EngineConfig::default());
        let failed = backend.callback().unwrap();

        backend.fail_stream("device unplugged");
        failed.on_error_after_close(PlaybackError::stream_lost("device unplugged"));

        assert!(engine.has_stream());
        assert_eq!(BackendLog::count(&backend.log.opens), 2);
        assert_eq!(BackendLog::count(&backend.log.live), 1);
    }

    #[test]
    fn test_release_closes_stream_once() {
        let (engine, backend) = playing(EngineConfig::default());

        engine.release();
        engine.release();

        assert!(!engine.is_loaded());
        assert!(!engine.has_stream());
        assert_eq!(BackendLog::count(&backend.log.closes), 1);
        assert_eq!(BackendLog::count(&backend.log.stops), 1);
    }
}
