use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tracing::warn;

/// Shared stdout sink for resource lines and alert banners.
///
/// Blocks are written under one lock so output from the pod and event feeds
/// never interleaves within a banner.
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    pub fn stdout() -> Self {
        Self::from_writer(std::io::stdout())
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn print<S: AsRef<str>>(&self, lines: &[S]) {
        let mut out = self.out.lock();
        let result = lines
            .iter()
            .try_for_each(|line| writeln!(out, "{}", line.as_ref()))
            .and_then(|_| out.flush());
        if let Err(e) = result {
            warn!(error = %e, "Failed to write to console");
        }
    }
}

/// In-memory writer for capturing console output in tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub fn console() -> (Console, Self) {
        let buffer = Self::default();
        (Console::from_writer(buffer.clone()), buffer)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
