/// Id 0 names the controller root object and is never allocated.
pub const CONTROLLER_FACET: u64 = 0;

/// Monotonic id source scoped to one comms vat instance.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next_id: u64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self {
            next_id: CONTROLLER_FACET + 1,
        }
    }
}

impl IdAllocator {
    pub fn alloc(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Resume numbering after a snapshot. Never moves backwards past the root.
    pub fn resume_at(next: u64) -> Self {
        Self {
            next_id: next.max(CONTROLLER_FACET + 1),
        }
    }
}
