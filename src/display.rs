use crate::error::{Result, StreamguardError};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, is_raw_mode_enabled};
use image::{ImageFormat, RgbImage};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Key reported by a display sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
    /// Ctrl+C pressed while the terminal is in raw mode
    Interrupt,
}

impl Key {
    /// Keys that request a graceful stop
    pub fn is_quit(&self) -> bool {
        matches!(self, Key::Char('q') | Key::Char('Q') | Key::Escape | Key::Interrupt)
    }
}

/// Where annotated frames go, and where the quit key comes from
pub trait DisplaySink: Send {
    /// Present a frame in the named window
    fn show(&mut self, window: &str, image: &RgbImage) -> Result<()>;

    /// Wait up to `timeout` for a key press
    fn poll_key(&mut self, timeout: Duration) -> Option<Key>;

    /// Keep the current frame up for `duration`, discarding key presses
    fn hold(&mut self, duration: Duration) {
        let _ = self.poll_key(duration);
    }
}

/// Stderr log sink that stays readable while the keyboard holds raw mode.
///
/// Raw mode turns off output post-processing, so a bare `\n` moves down
/// without returning the cursor; lines are rewritten with `\r\n` then.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalLogWriter;

impl Write for TerminalLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut stderr = io::stderr().lock();
        if is_raw_mode_enabled().unwrap_or(false) {
            stderr.write_all(&crlf_line_endings(buf))?;
        } else {
            stderr.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

fn crlf_line_endings(buf: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len() + 8);
    for chunk in buf.split_inclusive(|b| *b == b'\n') {
        match chunk.strip_suffix(b"\n") {
            Some(line) => {
                out.extend_from_slice(line.strip_suffix(b"\r").unwrap_or(line));
                out.extend_from_slice(b"\r\n");
            }
            None => out.extend_from_slice(chunk),
        }
    }
    out
}

/// Writes the latest shown frame to a JPEG file, replacing it atomically
#[derive(Debug, Clone)]
pub struct PreviewWriter {
    path: PathBuf,
}

impl PreviewWriter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn write(&self, image: &RgbImage) -> Result<()> {
        let tmp = self.path.with_extension("tmp.jpg");
        image
            .save_with_format(&tmp, ImageFormat::Jpeg)
            .map_err(|e| StreamguardError::display(format!("Failed to write preview: {}", e)))?;
        fs::rename(&tmp, &self.path)?;
        trace!("Preview updated at {}", self.path.display());
        Ok(())
    }
}

/// Display for unattended runs: optional preview file, never any key press
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    preview: Option<PreviewWriter>,
    frames_shown: u64,
}

impl HeadlessDisplay {
    pub fn new(preview: Option<PreviewWriter>) -> Self {
        Self {
            preview,
            frames_shown: 0,
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl DisplaySink for HeadlessDisplay {
    fn show(&mut self, window: &str, image: &RgbImage) -> Result<()> {
        self.frames_shown += 1;
        trace!("[{}] frame {}x{}", window, image.width(), image.height());
        if let Some(preview) = &self.preview {
            preview.write(image)?;
        }
        Ok(())
    }

    fn poll_key(&mut self, _timeout: Duration) -> Option<Key> {
        None
    }
}

/// Interactive display: raw-mode terminal keyboard plus the preview file
pub struct TerminalDisplay {
    preview: Option<PreviewWriter>,
    raw_mode: bool,
}

impl TerminalDisplay {
    pub fn new(preview: Option<PreviewWriter>) -> Result<Self> {
        enable_raw_mode().map_err(|e| {
            StreamguardError::display(format!("Failed to enable raw mode for keyboard input: {}", e))
        })?;
        info!("Keyboard input active - press 'q' or Esc to quit");

        Ok(Self {
            preview,
            raw_mode: true,
        })
    }

    fn translate(code: KeyCode, modifiers: KeyModifiers) -> Option<Key> {
        match code {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(Key::Interrupt),
            KeyCode::Char(c) => Some(Key::Char(c)),
            KeyCode::Esc => Some(Key::Escape),
            _ => None,
        }
    }
}

impl DisplaySink for TerminalDisplay {
    fn show(&mut self, window: &str, image: &RgbImage) -> Result<()> {
        trace!("[{}] frame {}x{}", window, image.width(), image.height());
        if let Some(preview) = &self.preview {
            preview.write(image)?;
        }
        Ok(())
    }

    fn poll_key(&mut self, timeout: Duration) -> Option<Key> {
        wait_for_key(timeout, true, next_terminal_event)
    }

    fn hold(&mut self, duration: Duration) {
        wait_for_key(duration, false, next_terminal_event);
    }
}

fn next_terminal_event(timeout: Duration) -> io::Result<Option<Event>> {
    if event::poll(timeout)? {
        event::read().map(Some)
    } else {
        Ok(None)
    }
}

/// Consume terminal events until a key press or until `timeout` has passed.
///
/// Resizes, releases and unmapped keys never cut the wait short. With
/// `stop_on_key` unset every key is discarded and the full timeout elapses.
fn wait_for_key<F>(timeout: Duration, stop_on_key: bool, mut next_event: F) -> Option<Key>
where
    F: FnMut(Duration) -> io::Result<Option<Event>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match next_event(remaining) {
            Ok(Some(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                match TerminalDisplay::translate(key.code, key.modifiers) {
                    Some(key) if stop_on_key => {
                        debug!("Key pressed: {:?}", key);
                        return Some(key);
                    }
                    Some(key) => debug!("Ignoring {:?} while holding frame", key),
                    None => {}
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => return None,
            Err(e) => {
                warn!("Error reading keyboard event: {}", e);
                return None;
            }
        }

        if remaining.is_zero() {
            return None;
        }
    }
}

impl Drop for TerminalDisplay {
    fn drop(&mut self) {
        if self.raw_mode {
            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEvent;
    use image::Rgb;

    #[test]
    fn test_quit_keys() {
        assert!(Key::Char('q').is_quit());
        assert!(Key::Escape.is_quit());
        assert!(Key::Interrupt.is_quit());
        assert!(!Key::Char('x').is_quit());
    }

    #[test]
    fn test_ctrl_c_translates_to_interrupt() {
        assert_eq!(
            TerminalDisplay::translate(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(Key::Interrupt)
        );
        assert_eq!(
            TerminalDisplay::translate(KeyCode::Char('c'), KeyModifiers::NONE),
            Some(Key::Char('c'))
        );
        assert_eq!(TerminalDisplay::translate(KeyCode::Enter, KeyModifiers::NONE), None);
    }

    fn scripted_events(events: Vec<Event>) -> impl FnMut(Duration) -> io::Result<Option<Event>> {
        let mut events: std::collections::VecDeque<Event> = events.into();
        move |remaining| match events.pop_front() {
            Some(event) => Ok(Some(event)),
            None => {
                std::thread::sleep(remaining);
                Ok(None)
            }
        }
    }

    fn press(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn test_poll_skips_resize_and_returns_next_key() {
        let events = scripted_events(vec![Event::Resize(80, 24), press(KeyCode::Char('q'))]);

        let key = wait_for_key(Duration::from_secs(5), true, events);

        assert_eq!(key, Some(Key::Char('q')));
    }

    #[test]
    fn test_hold_lasts_full_duration_despite_events() {
        let events = scripted_events(vec![
            press(KeyCode::Char('q')),
            Event::Resize(100, 40),
            press(KeyCode::Esc),
        ]);
        let hold = Duration::from_millis(60);

        let started = Instant::now();
        let key = wait_for_key(hold, false, events);

        assert_eq!(key, None);
        assert!(started.elapsed() >= hold);
    }

    #[test]
    fn test_poll_times_out_without_key() {
        let events = scripted_events(vec![Event::FocusGained]);
        assert_eq!(wait_for_key(Duration::from_millis(10), true, events), None);
    }

    #[test]
    fn test_raw_mode_log_lines_return_carriage() {
        assert_eq!(
            crlf_line_endings(b"INFO first\nINFO second\n"),
            b"INFO first\r\nINFO second\r\n".to_vec()
        );
        assert_eq!(crlf_line_endings(b"already\r\npartial"), b"already\r\npartial".to_vec());
        assert!(crlf_line_endings(b"").is_empty());
    }

    #[test]
    fn test_headless_writes_preview() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.jpg");
        let mut display = HeadlessDisplay::new(Some(PreviewWriter::new(&path)));

        let image = RgbImage::from_pixel(16, 16, Rgb([200, 10, 10]));
        display.show("main", &image).unwrap();
        display.show("main", &image).unwrap();

        assert_eq!(display.frames_shown(), 2);
        assert_eq!(image::open(&path).unwrap().width(), 16);
        assert_eq!(display.poll_key(Duration::from_millis(500)), None);
    }
}
