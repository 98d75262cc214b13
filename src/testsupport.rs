//! Shared test fixtures for the transport, engine and sidecar test modules.

use crate::protocol::Event;
use crate::transport::EventStream;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::timeout;

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary directory fixture with best-effort cleanup.
#[derive(Debug)]
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    /// Create a unique temporary directory with a readable prefix.
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir().join(format!("vox-{prefix}-{millis}-{suffix}"));
        fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write UTF-8 text to a child path, creating parent directories as needed.
    pub fn write_text(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories for fixture");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        path
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Next event, failing the test after two seconds of silence.
pub async fn recv_event(events: &mut EventStream) -> Event {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event timeout")
        .expect("event channel closed")
}

/// `turn_complete` or `error`.
pub fn is_terminal(event: &Event) -> bool {
    matches!(event, Event::TurnComplete { .. } | Event::Error { .. })
}

/// Collect events up to and including the next terminal one.
pub async fn events_until_terminal(events: &mut EventStream) -> Vec<Event> {
    let mut seen = Vec::new();
    loop {
        let event = recv_event(events).await;
        let done = is_terminal(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::EventSink;

    #[test]
    fn temp_dir_fixture_writes_and_cleans_up() {
        let root;
        {
            let fixture = TestTempDir::new("fixture");
            let file = fixture.write_text("nested/file.txt", "hello");
            assert_eq!(fs::read_to_string(file).expect("read"), "hello");
            root = fixture.path().to_path_buf();
        }
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn collects_through_first_terminal_event() {
        let (sink, mut events) = EventSink::channel();
        sink.emit(Event::StreamingText { text: "a".into() });
        sink.emit(Event::error("boom"));
        sink.emit(Event::turn_complete());
        let seen = events_until_terminal(&mut events).await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], Event::error("boom"));
        assert_eq!(recv_event(&mut events).await, Event::turn_complete());
    }
}
