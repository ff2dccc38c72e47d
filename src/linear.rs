//! Sparse linear coverage maps.
//!
//! A [`LinearIndex`] records, for every covered input position, the leaf
//! complex that owns it. Entries are kept sorted by start position and never
//! overlap, so position lookups are a binary search and intersection checks
//! are a single merge pass over both maps.

use crate::complex::ComplexId;

/// Half-open `[begin, end)` range of input positions.
pub type Span = (usize, usize);

/// One owned run of positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Coverage {
    pub pos: usize,
    pub end: usize,
    pub owner: ComplexId,
}

impl Coverage {
    #[inline]
    fn overlaps(&self, other: &Coverage) -> bool {
        self.pos < other.end && other.pos < self.end
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinearIndex {
    entries: Vec<Coverage>,
}

impl LinearIndex {
    pub fn new() -> Self {
        LinearIndex {
            entries: Vec::new(),
        }
    }

    /// A map owning `[pos, end)` on behalf of a single complex.
    pub fn single(pos: usize, end: usize, owner: ComplexId) -> Self {
        let mut index = LinearIndex::new();
        if end > pos {
            index.entries.push(Coverage { pos, end, owner });
        }
        index
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Coverage] {
        &self.entries
    }

    pub fn begin(&self) -> Option<usize> {
        self.entries.first().map(|e| e.pos)
    }

    pub fn end(&self) -> Option<usize> {
        self.entries.last().map(|e| e.end)
    }

    /// Combined extent; `None` iff the map is empty.
    pub fn span(&self) -> Option<Span> {
        Some((self.begin()?, self.end()?))
    }

    /// Number of positions actually owned.
    pub fn covered(&self) -> usize {
        self.entries.iter().map(|e| e.end - e.pos).sum()
    }

    /// The complex owning `pos`, if any.
    pub fn owner_at(&self, pos: usize) -> Option<ComplexId> {
        let idx = self.entries.partition_point(|e| e.pos <= pos);
        if idx == 0 {
            return None;
        }
        let entry = &self.entries[idx - 1];
        (entry.end > pos).then_some(entry.owner)
    }

    /// Whether any owned position is claimed by both maps.
    pub fn intersects(&self, other: &LinearIndex) -> bool {
        let (Some((a0, a1)), Some((b0, b1))) = (self.span(), other.span()) else {
            return false;
        };
        if b0 >= a1 || b1 <= a0 {
            return false;
        }

        let (mut i, mut j) = (0, 0);
        while i < self.entries.len() && j < other.entries.len() {
            let a = &self.entries[i];
            let b = &other.entries[j];
            if a.overlaps(b) {
                return true;
            }
            if a.end <= b.pos {
                i += 1;
            } else {
                j += 1;
            }
        }
        false
    }

    /// Claim a run of positions. Fails if any of them is already owned.
    pub fn insert(&mut self, coverage: Coverage) -> bool {
        if coverage.end <= coverage.pos {
            return false;
        }
        let idx = self.entries.partition_point(|e| e.pos < coverage.pos);
        let clashes_prev = idx > 0 && self.entries[idx - 1].overlaps(&coverage);
        let clashes_next = idx < self.entries.len() && self.entries[idx].overlaps(&coverage);
        if clashes_prev || clashes_next {
            return false;
        }
        self.entries.insert(idx, coverage);
        true
    }

    /// Union with a map known not to intersect this one.
    pub fn merge(&mut self, other: &LinearIndex) {
        if other.is_empty() {
            return;
        }
        if self.end().is_some_and(|end| end <= other.entries[0].pos) {
            self.entries.extend_from_slice(&other.entries);
            return;
        }
        let mut merged = Vec::with_capacity(self.entries.len() + other.entries.len());
        let (mut i, mut j) = (0, 0);
        while i < self.entries.len() && j < other.entries.len() {
            if self.entries[i].pos <= other.entries[j].pos {
                merged.push(self.entries[i]);
                i += 1;
            } else {
                merged.push(other.entries[j]);
                j += 1;
            }
        }
        merged.extend_from_slice(&self.entries[i..]);
        merged.extend_from_slice(&other.entries[j..]);
        self.entries = merged;
    }

    /// Drop every entry that `other` contributed.
    pub fn remove_all(&mut self, other: &LinearIndex) {
        if other.is_empty() {
            return;
        }
        self.entries.retain(|e| {
            other
                .entries
                .binary_search_by_key(&e.pos, |o| o.pos)
                .map_or(true, |i| other.entries[i] != *e)
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
