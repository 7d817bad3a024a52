// External crates
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::fmt::MakeWriter;

type SharedStream = Mutex<Box<dyn Write + Send>>;

/// Shared gate in front of the process' stdout and stderr.
///
/// While suppressed every write and flush through the gate is discarded and
/// reported as successful. A parent agent may stop draining our pipes once it
/// has asked us to exit, so the final shutdown window writes nothing until the
/// gate is resumed.
pub struct OutputGate {
    suppressed: AtomicBool,
    out: SharedStream,
    err: SharedStream,
}

impl OutputGate {
    /// Gate over the real process streams.
    pub fn stdio() -> Arc<Self> {
        Self::new(io::stdout(), io::stderr())
    }

    /// Gate over arbitrary writers.
    pub fn new<O, E>(out: O, err: E) -> Arc<Self>
    where
        O: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        Arc::new(Self {
            suppressed: AtomicBool::new(false),
            out: Mutex::new(Box::new(out)),
            err: Mutex::new(Box::new(err)),
        })
    }

    /// Start discarding output.
    pub fn suppress(&self) {
        self.suppressed.store(true, Ordering::SeqCst);
    }

    /// Stop discarding output.
    pub fn resume(&self) {
        self.suppressed.store(false, Ordering::SeqCst);
    }

    /// Whether output is currently being discarded.
    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }

    /// Suppress output until the returned guard is dropped.
    pub fn suppressed(&self) -> SuppressGuard<'_> {
        self.suppress();
        SuppressGuard { gate: self }
    }

    /// Writer bound to stdout.
    pub fn stdout(self: &Arc<Self>) -> GatedWriter {
        GatedWriter {
            gate: Arc::clone(self),
            stream: Stream::Out,
        }
    }

    /// Write one line to stdout.
    pub fn println(&self, line: &str) -> io::Result<()> {
        self.write_line(Stream::Out, line)
    }

    /// Write one line to stderr.
    pub fn eprintln(&self, line: &str) -> io::Result<()> {
        self.write_line(Stream::Err, line)
    }

    /// Flush both streams.
    pub fn flush(&self) -> io::Result<()> {
        if self.is_suppressed() {
            return Ok(());
        }
        self.out.lock().flush()?;
        self.err.lock().flush()
    }

    fn write_line(&self, stream: Stream, line: &str) -> io::Result<()> {
        if self.is_suppressed() {
            return Ok(());
        }
        let mut target = self.stream(stream).lock();
        target.write_all(line.as_bytes())?;
        target.write_all(b"\n")
    }

    fn stream(&self, stream: Stream) -> &SharedStream {
        match stream {
            Stream::Out => &self.out,
            Stream::Err => &self.err,
        }
    }
}

impl fmt::Debug for OutputGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputGate")
            .field("suppressed", &self.is_suppressed())
            .finish_non_exhaustive()
    }
}

/// Restores output when dropped.
#[derive(Debug)]
pub struct SuppressGuard<'a> {
    gate: &'a OutputGate,
}

impl Drop for SuppressGuard<'_> {
    fn drop(&mut self) {
        self.gate.resume();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Out,
    Err,
}

/// `io::Write` handle that honours the gate's suppression flag.
///
/// Also usable as a `tracing_subscriber` writer so console log output is
/// silenced together with everything else.
#[derive(Debug, Clone)]
pub struct GatedWriter {
    gate: Arc<OutputGate>,
    stream: Stream,
}

impl Write for GatedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.gate.is_suppressed() {
            return Ok(buf.len());
        }
        self.gate.stream(self.stream).lock().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.gate.is_suppressed() {
            return Ok(());
        }
        self.gate.stream(self.stream).lock().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.gate.is_suppressed() {
            return Ok(());
        }
        self.gate.stream(self.stream).lock().flush()
    }
}

impl<'a> MakeWriter<'a> for GatedWriter {
    type Writer = GatedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory stream that can be inspected after being handed to a gate.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writes_pass_through_when_open() {
        let out = Capture::default();
        let err = Capture::default();
        let gate = OutputGate::new(out.clone(), err.clone());

        gate.println("hello").unwrap();
        gate.eprintln("oops").unwrap();
        write!(gate.stdout(), "raw").unwrap();

        assert_eq!(out.contents(), "hello\nraw");
        assert_eq!(err.contents(), "oops\n");
    }

    #[test]
    fn test_suppressed_writes_are_discarded() {
        let out = Capture::default();
        let gate = OutputGate::new(out.clone(), io::sink());

        gate.suppress();
        gate.println("dropped").unwrap();
        assert_eq!(gate.stdout().write(b"also dropped").unwrap(), 12);
        gate.flush().unwrap();
        gate.resume();
        gate.println("kept").unwrap();

        assert_eq!(out.contents(), "kept\n");
    }

    #[test]
    fn test_guard_restores_output() {
        let out = Capture::default();
        let gate = OutputGate::new(out.clone(), io::sink());

        {
            let _quiet = gate.suppressed();
            assert!(gate.is_suppressed());
            gate.println("dropped").unwrap();
        }

        assert!(!gate.is_suppressed());
        gate.println("kept").unwrap();
        assert_eq!(out.contents(), "kept\n");
    }
}
