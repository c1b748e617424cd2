//! WARN-level log capture for unit tests.

use std::io;
use std::sync::{Arc, Mutex};

use tracing::subscriber::DefaultGuard;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        let writer = self.clone();
        tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish()
    }
}

/// Run `f` with a capturing subscriber; returns its output and the logs.
pub(crate) fn capture_logs<F: FnOnce() -> R, R>(f: F) -> (R, String) {
    let buf = SharedBuf::default();
    let out = tracing::subscriber::with_default(buf.subscriber(), f);
    (out, buf.contents())
}

/// Thread-local capture that lasts until dropped. Use from
/// current-thread `#[tokio::test]`s, where every poll stays on this thread.
pub(crate) struct LogCapture {
    buf: SharedBuf,
    _guard: DefaultGuard,
}

impl LogCapture {
    pub(crate) fn start() -> Self {
        let buf = SharedBuf::default();
        let guard = tracing::subscriber::set_default(buf.subscriber());
        Self { buf, _guard: guard }
    }

    pub(crate) fn contents(&self) -> String {
        self.buf.contents()
    }
}
