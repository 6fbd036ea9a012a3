//! Output transport backed by CPAL.
//!
//! A `cpal::Stream` is not `Send`, so each stream lives on a dedicated owner
//! thread and is driven by commands. The device callback never blocks on the
//! owner thread: it only flips an atomic and posts with `try_send`.

use super::traits::{CallbackResult, OutputBackend, OutputStream, RenderCallback, StreamConfig};
use crate::error::{PlaybackError, PlaybackResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

const COMMAND_CAPACITY: usize = 32;

enum Command {
    Start(Sender<PlaybackResult<()>>),
    Pause,
    Stop,
    /// The render callback returned [`CallbackResult::Stop`]
    Halted,
    /// The device reported a fatal error
    Failed(PlaybackError),
    Close,
}

/// Opens output streams on the default CPAL host.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalBackend;

impl CpalBackend {
    /// Create a backend for the default host
    pub const fn new() -> Self {
        Self
    }

    /// Names of the output devices on the default host
    pub fn output_device_names(&self) -> PlaybackResult<Vec<String>> {
        let host = cpal::default_host();
        Ok(host
            .output_devices()?
            .filter_map(|device| device.name().ok())
            .collect())
    }
}

impl OutputBackend for CpalBackend {
    type Stream = CpalStream;

    fn open(
        &self,
        config: &StreamConfig,
        callback: Arc<dyn RenderCallback>,
    ) -> PlaybackResult<CpalStream> {
        let (commands, inbox) = channel::bounded(COMMAND_CAPACITY);
        let (ready_tx, ready_rx) = channel::bounded(1);

        let owner = OwnerThread {
            config: config.clone(),
            callback,
            commands: commands.clone(),
            inbox,
            halted: Arc::new(AtomicBool::new(true)),
        };

        let thread = thread::Builder::new()
            .name("mod-player-output".to_string())
            .spawn(move || owner.run(ready_tx))
            .map_err(|err| PlaybackError::backend("cpal", err.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(CpalStream {
                commands,
                thread: Some(thread),
            }),
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(PlaybackError::backend("cpal", "output thread exited during open"))
            }
        }
    }
}

struct OwnerThread {
    config: StreamConfig,
    callback: Arc<dyn RenderCallback>,
    commands: Sender<Command>,
    inbox: Receiver<Command>,
    halted: Arc<AtomicBool>,
}

impl OwnerThread {
    fn run(self, ready: Sender<PlaybackResult<()>>) {
        let mut stream = match self.build() {
            Ok(stream) => {
                let _ = ready.send(Ok(()));
                Some(stream)
            }
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };
        drop(ready);

        for command in self.inbox.iter() {
            match command {
                Command::Start(reply) => {
                    let result = match &stream {
                        Some(stream) => {
                            self.halted.store(false, Ordering::Release);
                            stream.play().map_err(PlaybackError::from)
                        }
                        None => Err(PlaybackError::NoStream),
                    };
                    let _ = reply.send(result);
                }
                Command::Pause | Command::Stop => {
                    self.halted.store(true, Ordering::Release);
                    self.pause(stream.as_ref());
                }
                Command::Halted => {
                    // a Start may have been processed since the callback halted
                    if self.halted.load(Ordering::Acquire) {
                        self.pause(stream.as_ref());
                    }
                }
                Command::Failed(err) => {
                    if stream.take().is_some() {
                        debug!("Dropped failed CPAL stream");
                        self.notify_closed(err);
                    }
                }
                Command::Close => break,
            }
        }

        drop(stream);
        debug!("CPAL output thread finished");
    }

    fn pause(&self, stream: Option<&cpal::Stream>) {
        if let Some(stream) = stream {
            if let Err(err) = stream.pause() {
                warn!(%err, "Failed to pause CPAL stream");
            }
        }
    }

    /// Report the error from a separate thread so the engine can close this
    /// stream (which joins the owner thread) without deadlocking.
    fn notify_closed(&self, err: PlaybackError) {
        let callback = Arc::clone(&self.callback);
        let spawned = thread::Builder::new()
            .name("mod-player-recovery".to_string())
            .spawn(move || callback.on_error_after_close(err));

        if let Err(spawn_err) = spawned {
            error!(%spawn_err, "Failed to spawn stream recovery thread");
        }
    }

    fn build(&self) -> PlaybackResult<cpal::Stream> {
        let host = cpal::default_host();
        let device = select_device(&host, self.config.device.as_deref())?;

        let stream_config = cpal::StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: match self.config.buffer_frames {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };
        debug!(
            performance_mode = ?self.config.performance_mode,
            sharing_mode = ?self.config.sharing_mode,
            "CPAL ignores performance and sharing hints"
        );

        let callback = Arc::clone(&self.callback);
        let halted = Arc::clone(&self.halted);
        let commands = self.commands.clone();
        let error_commands = self.commands.clone();

        let stream = device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if halted.load(Ordering::Acquire) {
                    data.fill(0.0);
                    return;
                }
                if callback.render(data) == CallbackResult::Stop {
                    halted.store(true, Ordering::Release);
                    let _ = commands.try_send(Command::Halted);
                }
            },
            move |err| match err {
                cpal::StreamError::DeviceNotAvailable => {
                    let _ = error_commands.try_send(Command::Failed(err.into()));
                }
                other => warn!(err = %other, "CPAL stream error"),
            },
            None,
        )?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = self.config.sample_rate,
            channels = self.config.channels,
            "CPAL output stream built"
        );
        Ok(stream)
    }
}

fn select_device(host: &cpal::Host, preferred: Option<&str>) -> PlaybackResult<cpal::Device> {
    if let Some(name) = preferred {
        let found = host
            .output_devices()?
            .find(|device| device.name().is_ok_and(|device_name| device_name == name));
        match found {
            Some(device) => return Ok(device),
            None => warn!(device = name, "Preferred output device not found, using default"),
        }
    }

    host.default_output_device()
        .ok_or_else(|| PlaybackError::stream_open("No default output device"))
}

/// Handle to a CPAL stream living on its owner thread.
pub struct CpalStream {
    commands: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl CpalStream {
    fn send(&self, operation: &'static str, command: Command) -> PlaybackResult<()> {
        self.commands
            .send(command)
            .map_err(|_| PlaybackError::stream_control(operation, "output thread has exited"))
    }
}

impl OutputStream for CpalStream {
    fn request_start(&mut self) -> PlaybackResult<()> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.send("start", Command::Start(reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| PlaybackError::stream_control("start", "output thread has exited"))?
    }

    fn request_pause(&mut self) -> PlaybackResult<()> {
        self.send("pause", Command::Pause)
    }

    fn request_stop(&mut self) -> PlaybackResult<()> {
        self.send("stop", Command::Stop)
    }

    fn close(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.commands.send(Command::Close);

        if thread.thread().id() != thread::current().id() && thread.join().is_err() {
            warn!("CPAL output thread panicked");
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.close();
    }
}
