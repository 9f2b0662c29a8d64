use super::*;

/// Read-only views of the arena's bookkeeping, for monitoring and tests.
impl PayloadArena {
    /// Total bytes the arena can hold.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Offset the next non-wrapping allocation starts at.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes held by leases that have not been released.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Number of live leases.
    pub fn live_leases(&self) -> usize {
        self.live.len()
    }
}
