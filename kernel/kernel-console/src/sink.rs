/// A destination for console bytes.
///
/// The one operation every output device must support. Implementations are
/// expected to be cheap and infallible at this level — a full buffer drops
/// bytes, a wedged UART spins, but nothing propagates errors into the
/// formatting layer.
pub trait ConsoleSink {
    /// Emit one byte.
    fn put_byte(&mut self, byte: u8);

    /// Emit a run of bytes. Devices with a cheaper bulk path can override.
    fn put_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.put_byte(b);
        }
    }
}

/// Sink that discards everything.
///
/// Stands in for the serial console when `earlycon` was not given.
pub struct NullSink;

impl ConsoleSink for NullSink {
    #[inline]
    fn put_byte(&mut self, _byte: u8) {}
}

/// Sink writing into a caller-provided byte buffer.
///
/// Bytes beyond the buffer's capacity are dropped; [`written`](Self::written)
/// reports how many were kept. The caller owns the buffer and slices it
/// afterwards.
pub struct BufferSink<'a> {
    buf: &'a mut [u8],
    written: usize,
}

impl<'a> BufferSink<'a> {
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, written: 0 }
    }

    /// Number of bytes stored so far.
    #[inline]
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// The filled prefix of the buffer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.written]
    }
}

impl ConsoleSink for BufferSink<'_> {
    fn put_byte(&mut self, byte: u8) {
        if self.written < self.buf.len() {
            self.buf[self.written] = byte;
            self.written += 1;
        }
    }
}

impl<S: ConsoleSink + ?Sized> ConsoleSink for &mut S {
    fn put_byte(&mut self, byte: u8) {
        (**self).put_byte(byte);
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        (**self).put_bytes(bytes);
    }
}
