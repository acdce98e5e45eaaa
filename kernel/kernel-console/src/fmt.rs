use crate::{BufferSink, ConsoleSink};
use core::fmt::{self, Write};

/// Adapter turning any [`ConsoleSink`] into a [`core::fmt::Write`], with a
/// running byte count.
///
/// This is how all regular output is produced: `format_args!` drives the
/// adapter, the adapter drives the sink one `str` fragment at a time.
pub struct SinkWriter<S: ConsoleSink> {
    sink: S,
    written: usize,
}

impl<S: ConsoleSink> SinkWriter<S> {
    #[must_use]
    pub fn new(sink: S) -> Self {
        Self { sink, written: 0 }
    }

    /// Bytes pushed into the sink so far.
    #[inline]
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Format `args` into the sink; returns the byte count written.
    pub fn write(&mut self, args: fmt::Arguments<'_>) -> usize {
        let before = self.written;
        // Sinks are infallible; fmt errors can only come from a Display
        // impl and are ignored like everywhere else in the kernel.
        let _ = self.write_fmt(args);
        self.written - before
    }
}

impl<S: ConsoleSink> Write for SinkWriter<S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.sink.put_bytes(s.as_bytes());
        self.written += s.len();
        Ok(())
    }
}

/// Format into a caller-provided buffer and return the filled prefix as
/// `&str`.
///
/// Output beyond the buffer's capacity is truncated. The caller owns the
/// buffer and its sizing.
pub fn write_into<'a>(buf: &'a mut [u8], args: fmt::Arguments<'_>) -> &'a str {
    let mut writer = SinkWriter::new(BufferSink::new(buf));
    writer.write(args);
    let len = writer.sink.written();
    // Safety in plain sight: everything written came from &str fragments,
    // but truncation can split a multi-byte character, so re-validate.
    match core::str::from_utf8(&buf[..len]) {
        Ok(s) => s,
        Err(e) => {
            let valid = e.valid_up_to();
            core::str::from_utf8(&buf[..valid]).unwrap_or("")
        }
    }
}
