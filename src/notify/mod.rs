//! Sound and notification channel for the near-zero warning and completion.
//!
//! A failing channel never blocks completion: callers go through [`signal`],
//! which degrades to the notifier's alert.

mod sound;

pub use sound::{default_output, OpenOutput, SoundEngineHandle, SoundNotifier};

use std::io::{self, Write};
use std::sync::Mutex;

use anyhow::{Context, Result};
use log::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// One second before zero.
    Warning,
    Completed,
}

impl Cue {
    fn message(self) -> &'static str {
        match self {
            Cue::Warning => "Almost there...",
            Cue::Completed => "Time is up! Task completed.",
        }
    }
}

pub trait Notifier: Send + Sync {
    fn play(&self, cue: Cue, detail: Option<&str>) -> Result<()>;

    /// Last resort when [`Notifier::play`] fails.
    fn alert(&self, cue: Cue, detail: Option<&str>) {
        log_alert(cue, detail);
    }
}

fn log_alert(cue: Cue, detail: Option<&str>) {
    match detail {
        Some(detail) => warn!("{} ({detail})", cue.message()),
        None => warn!("{}", cue.message()),
    }
}

pub fn signal(notifier: &dyn Notifier, cue: Cue, detail: Option<&str>) {
    if let Err(err) = notifier.play(cue, detail) {
        warn!("notification failed, falling back to alert: {err:#}");
        notifier.alert(cue, detail);
    }
}

/// Rings the terminal bell and prints the cue. Volume 0 or a disabled sound
/// setting keeps the bell quiet but still prints.
pub struct TerminalNotifier {
    sound_enabled: bool,
    volume: f32,
    out: Mutex<Box<dyn Write + Send>>,
}

impl TerminalNotifier {
    pub fn new(sound_enabled: bool, volume: f32) -> Self {
        Self::with_writer(sound_enabled, volume, Box::new(io::stdout()))
    }

    pub fn with_writer(sound_enabled: bool, volume: f32, out: Box<dyn Write + Send>) -> Self {
        Self {
            sound_enabled,
            volume: volume.clamp(0.0, 1.0),
            out: Mutex::new(out),
        }
    }

    fn audible(&self) -> bool {
        self.sound_enabled && self.volume > 0.0
    }

    fn announce(&self, cue: Cue, detail: Option<&str>, bell: bool) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("notification writer poisoned"))?;
        if bell {
            out.write_all(b"\x07").context("failed to ring bell")?;
        }
        let written = match (cue, detail) {
            (Cue::Completed, Some(detail)) => writeln!(out, "\n{} {detail}", cue.message()),
            _ => writeln!(out, "\n{}", cue.message()),
        };
        written.context("failed to write notification")?;
        out.flush().context("failed to flush notification")
    }
}

impl Notifier for TerminalNotifier {
    fn play(&self, cue: Cue, detail: Option<&str>) -> Result<()> {
        self.announce(cue, detail, self.audible())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[derive(Clone, Default)]
    pub(crate) struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct CountingAlerts {
        inner: TerminalNotifier,
        alerts: AtomicUsize,
    }

    impl Notifier for CountingAlerts {
        fn play(&self, cue: Cue, detail: Option<&str>) -> Result<()> {
            self.inner.play(cue, detail)
        }

        fn alert(&self, _cue: Cue, _detail: Option<&str>) {
            self.alerts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn rings_bell_when_audible() {
        let buf = SharedBuf::default();
        let notifier = TerminalNotifier::with_writer(true, 0.5, Box::new(buf.clone()));
        notifier.play(Cue::Completed, Some("Write report")).unwrap();

        let written = buf.contents();
        assert!(written.starts_with('\x07'));
        assert!(written.contains("Time is up! Task completed. Write report"));
    }

    #[test]
    fn muted_volume_skips_bell() {
        let buf = SharedBuf::default();
        let notifier = TerminalNotifier::with_writer(true, 0.0, Box::new(buf.clone()));
        notifier.play(Cue::Warning, None).unwrap();

        let written = buf.contents();
        assert!(!written.contains('\x07'));
        assert!(written.contains("Almost there"));
    }

    #[test]
    fn failed_channel_falls_back_to_alert() {
        let notifier = CountingAlerts {
            inner: TerminalNotifier::with_writer(true, 1.0, Box::new(BrokenWriter)),
            alerts: AtomicUsize::new(0),
        };
        signal(&notifier, Cue::Completed, None);
        assert_eq!(notifier.alerts.load(Ordering::SeqCst), 1);
    }
}
