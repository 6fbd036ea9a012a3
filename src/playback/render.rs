//! Render path, invoked by the output stream on its real-time thread.

use super::engine::EngineCore;
use super::state::{PlaybackEvent, PlaybackState};
use super::traits::{CHANNEL_COUNT, CallbackResult, DecoderFactory, ModuleDecoder, OutputBackend};
use std::sync::atomic::Ordering;
use tracing::debug;

impl<F, B> EngineCore<F, B>
where
    F: DecoderFactory + 'static,
    B: OutputBackend + 'static,
{
    /// Fill `out` with interleaved stereo frames from the loaded module.
    pub(super) fn render(&self, out: &mut [f32]) -> CallbackResult {
        if !self.playing.load(Ordering::Acquire) {
            out.fill(0.0);
            return CallbackResult::Continue;
        }

        let requested = out.len() / CHANNEL_COUNT;
        let rendered = {
            let mut slot = self.decoder.lock();
            let Some(decoder) = slot.as_mut() else {
                out.fill(0.0);
                return CallbackResult::Continue;
            };
            decoder
                .render_interleaved_stereo(
                    self.config.sample_rate,
                    &mut out[..requested * CHANNEL_COUNT],
                )
                .min(requested)
        };

        // Also covers a trailing partial frame when `out` has odd length.
        out[rendered * CHANNEL_COUNT..].fill(0.0);

        if rendered == 0 && !self.stop_requested.load(Ordering::Acquire) {
            self.state
                .transition(PlaybackState::Playing, PlaybackState::Ended);
            self.playing.store(false, Ordering::Release);
            self.emit(PlaybackEvent::EndOfTrack);
            debug!("Module playback ended");
            return CallbackResult::Stop;
        }

        CallbackResult::Continue
    }
}
