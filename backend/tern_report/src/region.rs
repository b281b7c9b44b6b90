//! Dedicated scratch storage for the error path.
//!
//! Report assembly must not allocate from whatever pool just failed, so the
//! engine keeps a region with a reserved floor of capacity that survives
//! resets. Sinks borrow the buffer for line assembly and hand it back.

/// Capacity kept alive across resets so that out-of-memory reports can
/// still be formatted.
pub const RESERVED_BYTES: usize = 8 * 1024;

/// Reusable scratch buffer for report formatting.
#[derive(Debug)]
pub struct ErrorRegion {
    buf: String,
}

impl ErrorRegion {
    pub(crate) fn new() -> Self {
        ErrorRegion {
            buf: String::with_capacity(RESERVED_BYTES),
        }
    }

    /// Borrow the scratch buffer, emptied. Pair with [`ErrorRegion::put_back`].
    pub(crate) fn take(&mut self) -> String {
        let mut buf = core::mem::take(&mut self.buf);
        buf.clear();
        buf
    }

    pub(crate) fn put_back(&mut self, buf: String) {
        // Keep the larger of the two so the reserve is never lost.
        if buf.capacity() > self.buf.capacity() {
            self.buf = buf;
        }
    }

    /// Drop accumulated content but keep all capacity.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Drop content and any capacity grown beyond the reserved floor.
    pub fn reset_and_shrink(&mut self) {
        self.buf.clear();
        self.buf.shrink_to(RESERVED_BYTES);
    }
}
