//! Generation-based visited set for graph traversal.

/// Visited marks indexed by node id.
///
/// `clear` bumps a generation counter instead of zeroing the array; a full
/// reset happens only when the counter wraps.
#[derive(Debug, Clone)]
pub struct VisitedSet {
    data: Vec<u8>,
    generation: u8,
}

impl VisitedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            generation: 1,
        }
    }

    pub fn clear(&mut self) {
        if self.generation == u8::MAX {
            self.data.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    pub fn ensure_capacity(&mut self, cap: usize) {
        if cap > self.data.len() {
            self.data.resize(cap, 0);
        }
    }

    /// Mark `id`; true if it was not yet visited.
    #[inline]
    pub fn insert(&mut self, id: u32) -> bool {
        let slot = &mut self.data[id as usize];
        if *slot == self.generation {
            false
        } else {
            *slot = self.generation;
            true
        }
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new(0)
    }
}
