//! The boot command line.
//!
//! Whitespace-separated tokens, either bare flags (`earlycon`) or
//! `key=value` pairs. The line is copied once into a buffer owned by
//! [`CmdLine`]; lookups borrow from that buffer, so there is no shared
//! scratch state between callers.

/// Longest command line we keep; anything beyond is truncated.
const CMDLINE_MAX_LEN: usize = 256;

/// A parsed (well, captured) boot command line.
pub struct CmdLine {
    buf: [u8; CMDLINE_MAX_LEN],
    len: usize,
}

impl Default for CmdLine {
    fn default() -> Self {
        Self::empty()
    }
}

impl CmdLine {
    /// A command line with no tokens; every lookup misses.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            buf: [0; CMDLINE_MAX_LEN],
            len: 0,
        }
    }

    /// Capture a command line from a string (truncating at the buffer
    /// limit; non-ASCII bytes are kept verbatim and simply never match).
    #[must_use]
    pub fn from_str(line: &str) -> Self {
        let mut cmdline = Self::empty();
        let bytes = line.as_bytes();
        let len = bytes.len().min(CMDLINE_MAX_LEN);
        cmdline.buf[..len].copy_from_slice(&bytes[..len]);
        cmdline.len = len;
        cmdline
    }

    /// Capture a command line from the NUL-terminated string the
    /// bootloader left in memory.
    ///
    /// # Safety
    /// `ptr` must point at readable memory containing a NUL terminator
    /// within the bootloader-owned command-line buffer.
    #[must_use]
    pub unsafe fn from_raw(ptr: *const u8) -> Self {
        let mut cmdline = Self::empty();
        let mut i = 0;
        while i < CMDLINE_MAX_LEN {
            let b = unsafe { ptr.add(i).read() };
            if b == 0 {
                break;
            }
            cmdline.buf[i] = b;
            i += 1;
        }
        cmdline.len = i;
        cmdline
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Lossy on purpose: a bootloader handing over non-UTF-8 gets an
        // empty command line rather than a panic.
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }

    fn tokens(&self) -> impl Iterator<Item = &str> {
        self.as_str().split_ascii_whitespace()
    }

    /// Whether `flag` appears as a bare token or as the key of a
    /// `key=value` token.
    #[must_use]
    pub fn has_flag(&self, flag: &str) -> bool {
        self.tokens()
            .any(|token| token.split('=').next() == Some(flag))
    }

    /// The value of a `key=value` token, borrowed from this command line.
    #[must_use]
    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.tokens()
            .find_map(|token| token.strip_prefix(key)?.strip_prefix('='))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_flags_are_found() {
        let c = CmdLine::from_str("earlycon boottest");
        assert!(c.has_flag("earlycon"));
        assert!(c.has_flag("boottest"));
        assert!(!c.has_flag("testpanic"));
    }

    #[test]
    fn flag_is_not_a_prefix_match() {
        let c = CmdLine::from_str("earlycon2");
        assert!(!c.has_flag("earlycon"));
    }

    #[test]
    fn key_value_lookup_borrows_the_value() {
        let c = CmdLine::from_str("root=/dev/ram0 loglevel=7");
        assert_eq!(c.value_of("root"), Some("/dev/ram0"));
        assert_eq!(c.value_of("loglevel"), Some("7"));
        assert_eq!(c.value_of("init"), None);
    }

    #[test]
    fn key_of_a_pair_also_counts_as_flag() {
        let c = CmdLine::from_str("loglevel=7");
        assert!(c.has_flag("loglevel"));
    }

    #[test]
    fn concurrent_lookups_do_not_alias() {
        // Two simultaneous borrows from one line; the old static-buffer
        // design could not do this.
        let c = CmdLine::from_str("a=1 b=2");
        let a = c.value_of("a");
        let b = c.value_of("b");
        assert_eq!((a, b), (Some("1"), Some("2")));
    }

    #[test]
    fn empty_line_misses_everything() {
        let c = CmdLine::empty();
        assert!(!c.has_flag("earlycon"));
        assert_eq!(c.value_of("root"), None);
    }

    #[test]
    fn overlong_line_is_truncated_not_rejected() {
        let long = "x".repeat(300);
        let c = CmdLine::from_str(&long);
        assert_eq!(c.as_str().len(), CMDLINE_MAX_LEN);
    }
}
