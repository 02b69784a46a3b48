use crate::config::ReconnectConfig;
use crate::error::{Result, StreamguardError};
use crate::event_log::EventLog;
use crate::source::StreamSource;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Stream connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Nothing attempted yet
    Idle,
    /// Opening the source for the first time
    Connecting,
    /// Source open and delivering frames
    Connected,
    /// Reopening after a mid-stream read failure
    Reconnecting,
    /// Retry budget exhausted
    Failed,
}

/// Fixed-delay retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Consecutive open attempts per episode
    pub max_attempts: u32,
    /// Delay between attempts
    pub backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff: config.backoff(),
        }
    }
}

/// Blocking delay between attempts, swappable in tests
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Drives a [`StreamSource`] through open, reopen and terminal failure.
///
/// Each episode (initial connect or reconnect after a read failure) gets the
/// full attempt budget; the counter resets when the source opens.
pub struct ReconnectManager {
    policy: ReconnectPolicy,
    sleeper: Box<dyn Sleeper>,
    state: StreamState,
    attempt_count: u32,
    episodes: u64,
}

impl ReconnectManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self::with_sleeper(policy, Box::new(TokioSleeper))
    }

    pub fn with_sleeper(policy: ReconnectPolicy, sleeper: Box<dyn Sleeper>) -> Self {
        Self {
            policy,
            sleeper,
            state: StreamState::Idle,
            attempt_count: 0,
            episodes: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Failed open attempts in the current episode
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Number of connect/reconnect episodes started
    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Open the source for the first time
    pub async fn connect(&mut self, source: &mut StreamSource, log: &EventLog) -> Result<()> {
        self.begin_episode(StreamState::Connecting);
        self.run_episode(source, log).await
    }

    /// Release the broken handle and open the source again
    pub async fn reconnect(&mut self, source: &mut StreamSource, log: &EventLog) -> Result<()> {
        if self.state != StreamState::Connected {
            warn!("Reconnect requested from {:?} state", self.state);
        }

        self.begin_episode(StreamState::Reconnecting);
        source.release();
        self.run_episode(source, log).await
    }

    fn begin_episode(&mut self, state: StreamState) {
        debug!("Stream state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.attempt_count = 0;
        self.episodes += 1;
    }

    async fn run_episode(&mut self, source: &mut StreamSource, log: &EventLog) -> Result<()> {
        loop {
            info!(
                "Attempting to open video source... (Try {}/{})",
                self.attempt_count + 1,
                self.policy.max_attempts
            );

            match source.open() {
                Ok(handle) => {
                    info!(
                        "Stream started successfully (session {})",
                        handle.session()
                    );
                    self.state = StreamState::Connected;
                    self.attempt_count = 0;
                    log.record("Video stream started successfully.")?;
                    return Ok(());
                }
                Err(e) if e.is_recoverable() => {
                    self.attempt_count += 1;
                    warn!("Cannot open video source: {}", e);
                    log.record("Video source open failed.")?;

                    if self.attempt_count >= self.policy.max_attempts {
                        self.state = StreamState::Failed;
                        error!(
                            "Failed to open video source after {} attempts",
                            self.attempt_count
                        );
                        log.record("Failed to open video source after multiple attempts.")?;
                        return Err(StreamguardError::ReconnectExhausted {
                            attempts: self.attempt_count,
                        });
                    }

                    debug!("Waiting {:?} before next open attempt", self.policy.backoff);
                    self.sleeper.sleep(self.policy.backoff).await;
                }
                Err(e) => {
                    self.state = StreamState::Failed;
                    error!("Unrecoverable error opening video source: {}", e);
                    log.record(format!("Video source open failed: {}", e))?;
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::read_records;
    use crate::frame::Frame;
    use crate::source::scripted::ScriptedBackend;
    use crate::source::CaptureBackend;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct RecordingSleeper {
        sleeps: Arc<Mutex<Vec<Duration>>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().push(duration);
        }
    }

    fn manager(sleeper: &RecordingSleeper) -> ReconnectManager {
        ReconnectManager::with_sleeper(ReconnectPolicy::default(), Box::new(sleeper.clone()))
    }

    fn messages(path: &std::path::Path) -> Vec<String> {
        read_records(path)
            .unwrap()
            .into_iter()
            .map(|r| r.message)
            .collect()
    }

    #[tokio::test]
    async fn test_connect_first_try() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let log = EventLog::open(&path, None).unwrap();
        let sleeper = RecordingSleeper::default();
        let mut manager = manager(&sleeper);
        let mut source = StreamSource::new(Box::new(ScriptedBackend::frames(0)), "cam");

        assert_eq!(manager.state(), StreamState::Idle);
        manager.connect(&mut source, &log).await.unwrap();

        assert_eq!(manager.state(), StreamState::Connected);
        assert_eq!(manager.attempt_count(), 0);
        assert!(source.is_open());
        assert!(sleeper.sleeps.lock().is_empty());
        assert_eq!(messages(&path), vec!["Video stream started successfully."]);
    }

    #[tokio::test]
    async fn test_permanent_failure_uses_exactly_max_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let log = EventLog::open(&path, None).unwrap();
        let sleeper = RecordingSleeper::default();
        let mut manager = manager(&sleeper);
        let backend = ScriptedBackend::new(vec![], vec![]);
        let usage = backend.usage();
        let mut source = StreamSource::new(Box::new(backend), "rtsp://gone");

        let err = manager.connect(&mut source, &log).await.unwrap_err();

        assert!(matches!(err, StreamguardError::ReconnectExhausted { attempts: 3 }));
        assert_eq!(manager.state(), StreamState::Failed);
        assert_eq!(usage.open_attempts(), 3);
        assert_eq!(*sleeper.sleeps.lock(), vec![Duration::from_secs(2); 2]);
        assert_eq!(
            messages(&path),
            vec![
                "Video source open failed.",
                "Video source open failed.",
                "Video source open failed.",
                "Failed to open video source after multiple attempts.",
            ]
        );
    }

    #[tokio::test]
    async fn test_recovers_on_last_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path().join("events.log"), None).unwrap();
        let sleeper = RecordingSleeper::default();
        let mut manager = manager(&sleeper);
        let backend = ScriptedBackend::new(vec![false, false, true], vec![]);
        let mut source = StreamSource::new(Box::new(backend), "cam");

        manager.connect(&mut source, &log).await.unwrap();

        assert_eq!(manager.state(), StreamState::Connected);
        assert_eq!(manager.attempt_count(), 0);
        assert_eq!(sleeper.sleeps.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_each_outage_gets_full_budget() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path().join("events.log"), None).unwrap();
        let sleeper = RecordingSleeper::default();
        let mut manager = manager(&sleeper);
        // initial open, then two outages that each need all three attempts
        let backend = ScriptedBackend::new(
            vec![true, false, false, true, false, false, true],
            vec![],
        );
        let usage = backend.usage();
        let mut source = StreamSource::new(Box::new(backend), "cam");

        manager.connect(&mut source, &log).await.unwrap();
        manager.reconnect(&mut source, &log).await.unwrap();
        assert_eq!(manager.attempt_count(), 0);
        manager.reconnect(&mut source, &log).await.unwrap();

        assert_eq!(manager.state(), StreamState::Connected);
        assert_eq!(manager.episodes(), 3);
        assert_eq!(usage.open_attempts(), 7);
        assert_eq!(usage.max_open_sessions(), 1);
    }

    struct BrokenBackend;

    impl CaptureBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn open(&mut self, _source_ref: &str) -> Result<()> {
            Err(StreamguardError::system("decoder runtime unavailable"))
        }

        fn read(&mut self) -> std::result::Result<Frame, String> {
            Err("never opened".to_string())
        }

        fn release(&mut self) {}
    }

    #[tokio::test]
    async fn test_unrecoverable_open_error_is_logged_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let log = EventLog::open(&path, None).unwrap();
        let sleeper = RecordingSleeper::default();
        let mut manager = manager(&sleeper);
        let mut source = StreamSource::new(Box::new(BrokenBackend), "video2.mp4");

        let err = manager.connect(&mut source, &log).await.unwrap_err();

        assert!(matches!(err, StreamguardError::System { .. }));
        assert_eq!(manager.state(), StreamState::Failed);
        assert!(sleeper.sleeps.lock().is_empty());
        assert_eq!(
            messages(&path),
            vec!["Video source open failed: System error: decoder runtime unavailable"]
        );
    }

    #[tokio::test]
    async fn test_reconnect_releases_before_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path().join("events.log"), None).unwrap();
        let sleeper = RecordingSleeper::default();
        let mut manager = manager(&sleeper);
        let backend = ScriptedBackend::new(vec![true, true], vec![]);
        let usage = backend.usage();
        let mut source = StreamSource::new(Box::new(backend), "cam");

        manager.connect(&mut source, &log).await.unwrap();
        manager.reconnect(&mut source, &log).await.unwrap();

        assert_eq!(usage.releases(), 1);
        assert_eq!(source.handle().unwrap().session(), 2);
    }
}
