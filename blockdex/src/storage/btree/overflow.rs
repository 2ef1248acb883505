//! Overflow chains of record locations.
//!
//! Every leaf entry owns one chain holding the locations of all records that
//! share its key. A chain is a sequence of fixed-capacity chunks, each
//! standing in for one block-sized overflow node:
//!
//! ```text
//! leaf entry (key) -> [loc, loc, ..., loc] -> [loc, loc] -> ...
//!                      chunk 0 (full)          chunk 1
//! ```
//!
//! Appending fills the last chunk and starts a new one when it is full.

use crate::storage::Location;

/// Locations stored under one key.
///
/// # Invariants
/// - every chunk holds between 1 and `chunk_capacity` locations
/// - only the last chunk may be partially filled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationChain {
    chunks: Vec<Vec<Location>>,
    chunk_capacity: usize,
}

impl LocationChain {
    /// Create an empty chain.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_capacity` is 0.
    #[must_use]
    pub fn new(chunk_capacity: usize) -> Self {
        assert!(chunk_capacity > 0, "overflow chunk capacity must be positive");
        Self {
            chunks: Vec::new(),
            chunk_capacity,
        }
    }

    /// Append a location.
    pub fn push(&mut self, location: Location) {
        match self.chunks.last_mut() {
            Some(chunk) if chunk.len() < self.chunk_capacity => chunk.push(location),
            _ => {
                let mut chunk = Vec::with_capacity(self.chunk_capacity);
                chunk.push(location);
                self.chunks.push(chunk);
            }
        }
    }

    /// Total number of locations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::is_empty() is not const-stable
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of overflow nodes backing the chain.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Locations in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Location> + '_ {
        self.chunks.iter().flatten().copied()
    }

    /// Consume the chain, yielding its locations in insertion order.
    #[must_use]
    pub fn into_locations(self) -> Vec<Location> {
        self.chunks.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_fills_chunks() {
        let mut chain = LocationChain::new(3);
        assert!(chain.is_empty());
        assert_eq!(chain.chunk_count(), 0);

        for i in 0..7 {
            chain.push(Location::new(i, i));
        }

        assert_eq!(chain.len(), 7);
        assert_eq!(chain.chunk_count(), 3);
        let locations: Vec<_> = chain.iter().collect();
        assert_eq!(locations.first(), Some(&Location::new(0, 0)));
        assert_eq!(locations.last(), Some(&Location::new(6, 6)));
    }

    #[test]
    fn test_into_locations_preserves_order() {
        let mut chain = LocationChain::new(2);
        chain.push(Location::new(5, 1));
        chain.push(Location::new(2, 0));
        chain.push(Location::new(9, 3));
        assert_eq!(
            chain.into_locations(),
            vec![Location::new(5, 1), Location::new(2, 0), Location::new(9, 3)]
        );
    }

    #[test]
    #[should_panic(expected = "overflow chunk capacity must be positive")]
    fn test_zero_capacity() {
        let _ = LocationChain::new(0);
    }
}
