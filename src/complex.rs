//! Scored candidate parses.
//!
//! A [`Complex`] is one candidate structure rooted at a unit: its own terminal
//! weight, at most one child complex per operator slot, and the sparse map of
//! input positions it covers. Complexes live in the agenda's arena and are
//! never mutated once other complexes refer to them; joining or forgetting a
//! child always produces a new complex. This keeps every stored weight a pure
//! function of the children it references.

use crate::grammar::{CodeId, Operator};
use crate::linear::{LinearIndex, Span};
use crate::unit::UnitId;
use std::sync::Arc;

/// Index of a complex in the agenda's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComplexId(u32);

impl ComplexId {
    #[inline(always)]
    pub fn new(index: u32) -> Self {
        ComplexId(index)
    }

    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A filled operator slot: the child and the bonus earned by joining it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub child: ComplexId,
    pub bonus: i32,
}

/// A resolved semantic interpretation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interp {
    pub concept: Arc<str>,
    pub code: Option<CodeId>,
    /// The slot whose join produced this reading; `None` for usages.
    pub operator: Option<Operator>,
}

/// Result of attempting to merge a child into a parent complex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined(ComplexId),
    SlotOccupied,
    LinearConflict,
    PoolExhausted,
}

impl JoinOutcome {
    pub fn joined(self) -> Option<ComplexId> {
        match self {
            JoinOutcome::Joined(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Complex {
    pub(crate) base: UnitId,
    pub(crate) own_weight: i32,
    pub(crate) weight: i32,
    pub(crate) slots: [Option<Slot>; Operator::COUNT],
    pub(crate) linear: LinearIndex,
    pub(crate) aggregate: Option<UnitId>,
    pub(crate) interps: Vec<Interp>,
    pub(crate) logic_marker: Option<UnitId>,
    pub(crate) prev_weight: i32,
    pub(crate) prev_span: Option<Span>,
    pub(crate) is_updated: bool,
}

impl Complex {
    /// An empty complex with no weight and no coverage.
    pub fn seed(base: UnitId) -> Self {
        Complex {
            base,
            own_weight: 0,
            weight: 0,
            slots: [None; Operator::COUNT],
            linear: LinearIndex::new(),
            aggregate: None,
            interps: Vec::new(),
            logic_marker: None,
            prev_weight: 0,
            prev_span: None,
            is_updated: false,
        }
    }

    /// A terminal complex owning `span` on behalf of `id`.
    pub fn terminal(base: UnitId, id: ComplexId, weight: i32, span: Span) -> Self {
        Complex {
            own_weight: weight,
            weight,
            linear: LinearIndex::single(span.0, span.1, id),
            ..Complex::seed(base)
        }
    }

    #[inline]
    pub fn base(&self) -> UnitId {
        self.base
    }

    #[inline]
    pub fn weight(&self) -> i32 {
        self.weight
    }

    pub fn own_weight(&self) -> i32 {
        self.own_weight
    }

    #[inline]
    pub fn slot(&self, op: Operator) -> Option<Slot> {
        self.slots[op.index()]
    }

    pub fn child(&self, op: Operator) -> Option<ComplexId> {
        self.slot(op).map(|s| s.child)
    }

    /// Filled slots in operator order.
    pub fn filled(&self) -> impl Iterator<Item = (Operator, Slot)> + '_ {
        Operator::ALL
            .into_iter()
            .filter_map(|op| self.slot(op).map(|s| (op, s)))
    }

    pub fn linear(&self) -> &LinearIndex {
        &self.linear
    }

    pub fn span(&self) -> Option<Span> {
        self.linear.span()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.linear.is_empty()
    }

    pub fn aggregate(&self) -> Option<UnitId> {
        self.aggregate
    }

    pub fn interps(&self) -> &[Interp] {
        &self.interps
    }

    pub fn logic_marker(&self) -> Option<UnitId> {
        self.logic_marker
    }

    pub fn is_updated(&self) -> bool {
        self.is_updated
    }

    /// Weight gained by the join that produced this complex.
    pub fn gain(&self) -> i32 {
        self.weight.saturating_sub(self.prev_weight)
    }

    /// Recompute the weight from the current children.
    ///
    /// Sums saturate at `i32::MAX`, the same way joins do.
    pub fn derive_weight(&self, arena: &[Complex]) -> i32 {
        self.filled().fold(self.own_weight, |acc, (_, slot)| {
            acc.saturating_add(arena[slot.child.index()].weight)
                .saturating_add(slot.bonus)
        })
    }

    /// Copy of `self` with `child` adopted at `op`.
    ///
    /// The caller has already checked that the slot is free and that the
    /// coverage maps do not intersect.
    pub(crate) fn adopt(&self, op: Operator, slot: Slot, child: &Complex) -> Complex {
        let mut merged = self.clone();
        merged.slots[op.index()] = Some(slot);
        merged.linear.merge(&child.linear);
        merged.weight = self
            .weight
            .saturating_add(child.weight)
            .saturating_add(slot.bonus);
        merged.prev_weight = self.weight;
        merged.prev_span = self.span();
        merged.aggregate = None;
        merged.is_updated = false;
        merged
    }

    /// Copy of `self` without the child at `op`.
    pub(crate) fn release(&self, op: Operator, child: &Complex) -> Complex {
        let mut rest = self.clone();
        let Some(slot) = rest.slots[op.index()].take() else {
            return rest;
        };
        rest.linear.remove_all(&child.linear);
        rest.weight = self
            .weight
            .saturating_sub(child.weight)
            .saturating_sub(slot.bonus);
        rest.interps.retain(|i| i.operator != Some(op));
        if op.is_sequencing() {
            rest.logic_marker = None;
        }
        rest.prev_weight = self.weight;
        rest.prev_span = self.span();
        rest.aggregate = None;
        rest.is_updated = false;
        rest
    }

    /// Same children, weight and coverage.
    pub fn same_structure(&self, other: &Complex) -> bool {
        self.base == other.base
            && self.weight == other.weight
            && self.own_weight == other.own_weight
            && self.slots == other.slots
            && self.linear == other.linear
    }
}
