use std::sync::{
    mpsc::{self, Sender},
    Mutex,
};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::warn;
use rodio::{source::SineWave, OutputStream, OutputStreamHandle, Sink, Source};

use super::{log_alert, Cue, Notifier, TerminalNotifier};

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens the audio output. Runs on the audio thread.
pub type OpenOutput = fn() -> Result<(OutputStream, OutputStreamHandle), String>;

pub fn default_output() -> Result<(OutputStream, OutputStreamHandle), String> {
    OutputStream::try_default().map_err(|e| format!("Failed to create audio output stream: {}", e))
}

fn tone(cue: Cue) -> (f32, Duration) {
    match cue {
        Cue::Warning => (660.0, Duration::from_millis(200)),
        Cue::Completed => (880.0, Duration::from_millis(700)),
    }
}

struct PlayRequest {
    cue: Cue,
    volume: f32,
    reply: Sender<Result<(), String>>,
}

fn ensure_sink<'a>(
    open: OpenOutput,
    stream: &mut Option<OutputStream>,
    sink: &'a mut Option<Sink>,
) -> Result<&'a Sink, String> {
    if sink.is_none() {
        let (s, handle) = open()?;
        let new_sink =
            Sink::try_new(&handle).map_err(|e| format!("Failed to create audio sink: {}", e))?;
        *stream = Some(s);
        *sink = Some(new_sink);
    }
    sink.as_ref()
        .ok_or_else(|| "audio sink unavailable".to_string())
}

/// Owns the audio thread. The output stream is not `Send`, so it lives on
/// that thread and each play request is answered over a reply channel.
pub struct SoundEngineHandle {
    tx: Mutex<Option<Sender<PlayRequest>>>,
    open: OpenOutput,
}

impl SoundEngineHandle {
    pub fn new() -> Self {
        Self::with_output(default_output)
    }

    pub fn with_output(open: OpenOutput) -> Self {
        Self {
            tx: Mutex::new(None),
            open,
        }
    }

    fn ensure_thread(&self) -> Result<Sender<PlayRequest>> {
        let mut guard = self
            .tx
            .lock()
            .map_err(|_| anyhow!("audio handle poisoned"))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<PlayRequest>();
        let open = self.open;
        thread::Builder::new()
            .name("timespent-audio".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                while let Ok(request) = rx.recv() {
                    let played = ensure_sink(open, &mut _stream, &mut sink).map(|sink| {
                        let (frequency, length) = tone(request.cue);
                        sink.append(
                            SineWave::new(frequency)
                                .take_duration(length)
                                .amplify(request.volume),
                        );
                    });
                    let _ = request.reply.send(played);
                }
            })?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    /// Queues the cue's tone. Errors when no output device can be opened.
    pub fn play(&self, cue: Cue, volume: f32) -> Result<()> {
        let tx = self.ensure_thread()?;
        let (reply, answer) = mpsc::channel();
        tx.send(PlayRequest {
            cue,
            volume: volume.clamp(0.0, 1.0),
            reply,
        })
        .map_err(|_| anyhow!("audio thread stopped"))?;

        match answer.recv_timeout(REPLY_TIMEOUT) {
            Ok(played) => played.map_err(|e| anyhow!(e)),
            Err(_) => Err(anyhow!("audio thread did not answer")),
        }
    }
}

impl Default for SoundEngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Plays a tone at the configured volume and prints the cue. When the tone
/// cannot be played the terminal takes over and rings the bell.
pub struct SoundNotifier {
    engine: SoundEngineHandle,
    sound_enabled: bool,
    volume: f32,
    terminal: TerminalNotifier,
}

impl SoundNotifier {
    pub fn new(sound_enabled: bool, volume: f32) -> Self {
        Self::with_parts(
            SoundEngineHandle::new(),
            sound_enabled,
            volume,
            TerminalNotifier::new(sound_enabled, volume),
        )
    }

    pub fn with_parts(
        engine: SoundEngineHandle,
        sound_enabled: bool,
        volume: f32,
        terminal: TerminalNotifier,
    ) -> Self {
        Self {
            engine,
            sound_enabled,
            volume: volume.clamp(0.0, 1.0),
            terminal,
        }
    }
}

impl Notifier for SoundNotifier {
    fn play(&self, cue: Cue, detail: Option<&str>) -> Result<()> {
        if self.sound_enabled && self.volume > 0.0 {
            self.engine.play(cue, self.volume)?;
        }
        self.terminal.announce(cue, detail, false)
    }

    fn alert(&self, cue: Cue, detail: Option<&str>) {
        if let Err(err) = self.terminal.play(cue, detail) {
            warn!("terminal alert failed: {err:#}");
            log_alert(cue, detail);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{signal, tests::SharedBuf};

    fn no_device() -> Result<(OutputStream, OutputStreamHandle), String> {
        Err("no output device".to_string())
    }

    fn notifier(sound_enabled: bool, volume: f32, buf: &SharedBuf) -> SoundNotifier {
        SoundNotifier::with_parts(
            SoundEngineHandle::with_output(no_device),
            sound_enabled,
            volume,
            TerminalNotifier::with_writer(sound_enabled, volume, Box::new(buf.clone())),
        )
    }

    #[test]
    fn missing_device_is_reported() {
        let engine = SoundEngineHandle::with_output(no_device);
        let err = engine.play(Cue::Warning, 0.5).unwrap_err();
        assert!(err.to_string().contains("no output device"));
        // the thread stays up for the next request
        assert!(engine.play(Cue::Completed, 0.5).is_err());
    }

    #[test]
    fn missing_device_falls_back_to_the_bell() {
        let buf = SharedBuf::default();
        let notifier = notifier(true, 0.5, &buf);
        assert!(notifier.play(Cue::Completed, Some("Write report")).is_err());

        signal(&notifier, Cue::Completed, Some("Write report"));
        let written = buf.contents();
        assert!(written.starts_with('\x07'));
        assert_eq!(written.matches("Time is up!").count(), 1);
        assert!(written.contains("Write report"));
    }

    #[test]
    fn muted_sound_skips_the_device() {
        let buf = SharedBuf::default();
        let notifier = notifier(false, 0.5, &buf);
        notifier.play(Cue::Warning, None).unwrap();

        let written = buf.contents();
        assert!(!written.contains('\x07'));
        assert!(written.contains("Almost there"));
    }
}
