//! Complex merge primitives.
//!
//! [`Agenda::join`] merges a child complex into a copy of a parent complex
//! under one operator slot and scores the result:
//! - the slot must be free and the coverage maps must not intersect
//! - weight is the parent's plus the child's plus the operator bonus
//! - structural joins bind derivations of the child code as interpretations
//! - sequencing joins look for a group marker in the gap between the peers
//! - stackable specs wrap the result in an aggregate unit
//!
//! Rejections are ordinary outcomes, never errors.

use crate::agenda::{Agenda, AgendaResult};
use crate::complex::{Complex, ComplexId, Interp, JoinOutcome, Slot};
use crate::grammar::{CodeSpec, Operator};
use crate::unit::UnitId;
use std::sync::Arc;
use tracing::{debug, trace};

impl Agenda {
    /// Whether the two complexes claim a common input position.
    pub fn check_linear_intersection(&self, a: ComplexId, b: ComplexId) -> bool {
        self.complex(a).linear().intersects(self.complex(b).linear())
    }

    /// Slot and coverage checks plus the raw merge, no scoring extras.
    pub(crate) fn merge(
        &mut self,
        parent: ComplexId,
        child: ComplexId,
        op: Operator,
        bonus: i32,
    ) -> JoinOutcome {
        let p = &self.complexes[parent.index()];
        let c = &self.complexes[child.index()];
        if p.slot(op).is_some() {
            return JoinOutcome::SlotOccupied;
        }
        if p.linear().intersects(c.linear()) {
            self.stats.conflicts += 1;
            return JoinOutcome::LinearConflict;
        }
        let merged = p.adopt(op, Slot { child, bonus }, c);
        match self.alloc_complex(merged) {
            Ok(id) => JoinOutcome::Joined(id),
            Err(_) => JoinOutcome::PoolExhausted,
        }
    }

    /// Merge `child` into a copy of `parent` under `spec`.
    pub fn join(&mut self, parent: ComplexId, child: ComplexId, spec: &CodeSpec) -> JoinOutcome {
        self.stats.join_attempts += 1;
        let op = spec.operator;
        let bonus = self.config.scoring.join_bonus(op);
        let outcome = self.merge(parent, child, op, bonus);
        let JoinOutcome::Joined(id) = outcome else {
            trace!(parent = parent.index(), child = child.index(), %op, ?outcome, "join rejected");
            return outcome;
        };
        self.stats.joins += 1;

        if op.is_sequencing() {
            self.check_logic_markers(id, parent, child);
        } else {
            self.discriminate_usage(id, parent, child, op);
        }
        self.complexes[id.index()].is_updated = true;

        if spec.stackable {
            self.make_aggregate(id);
        }
        trace!(
            joined = id.index(),
            %op,
            weight = self.complexes[id.index()].weight(),
            span = ?self.complexes[id.index()].span(),
            "joined"
        );
        outcome
    }

    /// Replacement for `complex` with every reference to `child` dropped.
    ///
    /// Returns `None` when nothing referred to `child`.
    pub fn forget(&mut self, complex: ComplexId, child: UnitId) -> AgendaResult<Option<ComplexId>> {
        let mut current = self.complexes[complex.index()].clone();
        let mut changed = false;
        for op in Operator::ALL {
            let Some(slot) = current.slot(op) else { continue };
            let old = &self.complexes[slot.child.index()];
            if old.base() != child {
                continue;
            }
            current = current.release(op, old);
            changed = true;
        }
        if !changed {
            return Ok(None);
        }
        self.alloc_complex(current).map(Some)
    }

    /// Replacement for `parent` with the child at `op` swapped for `child`.
    ///
    /// Keeps the slot's bonus. Returns `None` if the new child collides with
    /// the rest of the parent's coverage.
    pub(crate) fn replace_child(
        &mut self,
        parent: ComplexId,
        op: Operator,
        child: ComplexId,
    ) -> AgendaResult<Option<ComplexId>> {
        let p = &self.complexes[parent.index()];
        let Some(slot) = p.slot(op) else {
            return Ok(None);
        };
        let rest = p.release(op, &self.complexes[slot.child.index()]);
        let new_child = &self.complexes[child.index()];
        if rest.linear().intersects(new_child.linear()) {
            self.stats.conflicts += 1;
            return Ok(None);
        }
        let mut patched = rest.adopt(op, Slot { child, bonus: slot.bonus }, new_child);
        patched.interps = p.interps.clone();
        patched.logic_marker = p.logic_marker;
        patched.is_updated = true;
        self.alloc_complex(patched).map(Some)
    }

    /// Bind the child's derivations that name the parent's code.
    fn discriminate_usage(&mut self, id: ComplexId, parent: ComplexId, child: ComplexId, op: Operator) {
        let grammar = Arc::clone(&self.grammar);
        let parent_code = self.units[self.complexes[parent.index()].base().index()].code();
        let child_code = self.units[self.complexes[child.index()].base().index()].code();
        let (Some(parent_code), Some(child_code)) = (parent_code, child_code) else {
            return;
        };
        let (Some(parent_def), Some(child_def)) = (grammar.code(parent_code), grammar.code(child_code)) else {
            return;
        };
        let cap = self.config.interp_capacity;
        let interps = &mut self.complexes[id.index()].interps;
        for d in child_def.derivations(op) {
            if interps.len() >= cap {
                break;
            }
            if *d.arg_code != *parent_def.name {
                continue;
            }
            trace!(concept = %d.concept, parent = %parent_def.name, "usage bound");
            interps.push(Interp {
                concept: d.concept.clone(),
                code: d.code,
                operator: Some(op),
            });
        }
    }

    /// Look for a group marker strictly between two sequenced peers.
    fn check_logic_markers(&mut self, id: ComplexId, parent: ComplexId, child: ComplexId) {
        let (Some(a), Some(b)) = (
            self.complexes[parent.index()].span(),
            self.complexes[child.index()].span(),
        ) else {
            return;
        };
        let (left, right) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        if left.1 >= right.0 {
            return;
        }

        let found = (left.1..right.0).find_map(|pos| {
            self.markers_at(pos)
                .iter()
                .copied()
                .find(|&m| self.unit(m).end() <= right.0)
        });
        let Some(marker) = found else { return };

        let marker_weight = self
            .unit(marker)
            .complexes()
            .first()
            .map_or(0, |&c| self.complex(c).weight());
        let extra = self.config.scoring.group_weight(marker_weight);

        let joined = &mut self.complexes[id.index()];
        joined.weight = joined.weight.saturating_add(extra);
        if let Some(slot) = joined.slots[Operator::Next.index()].as_mut() {
            slot.bonus = slot.bonus.saturating_add(extra);
        }
        joined.logic_marker = Some(marker);
        debug!(marker = marker.index(), extra, "logical group");
    }

    /// Wrap a merged complex in a single-complex aggregate unit.
    fn make_aggregate(&mut self, id: ComplexId) {
        let Ok(aggregate) = self.allocate_aggregate() else {
            return;
        };
        let (code, span) = {
            let c = &self.complexes[id.index()];
            (self.units[c.base().index()].code(), c.span())
        };
        let Some((begin, end)) = span else { return };

        let wrapper = Complex::seed(aggregate).adopt(
            Operator::Aggregates,
            Slot { child: id, bonus: 0 },
            &self.complexes[id.index()],
        );
        let Ok(wrapper) = self.alloc_complex(wrapper) else {
            return;
        };

        let unit = &mut self.units[aggregate.index()];
        unit.code = code;
        unit.concept = code.unwrap_or(0);
        unit.position = begin;
        unit.coverage = end - begin;
        unit.is_present = true;
        unit.complexes.push(wrapper);
        self.complexes[id.index()].aggregate = Some(aggregate);
        debug!(aggregate = aggregate.index(), begin, end, "aggregate");
    }

    /// Pool-exhaustion marker for callers that only need to stop.
    pub(crate) fn complexes_exhausted(&self) -> bool {
        self.num_complexes() >= self.config.complex_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agenda::AgendaConfig;
    use crate::grammar::{
        CodeDef, CodeKind, DerivationDef, GrammarBuilder, GrammarKind, LinearOrder, SpecDef,
    };
    use crate::unit::Terminal;
    use proptest::prelude::*;

    fn grammar() -> Arc<crate::grammar::Grammar> {
        Arc::new(
            GrammarBuilder::new("t", GrammarKind::Operational)
                .code(
                    CodeDef::new("ADJ").derivation(DerivationDef::new(
                        Operator::HasAttr,
                        "NOUN",
                        "quality",
                    )),
                )
                .code(CodeDef::new("NOUN").child(SpecDef::new(Operator::HasAttr, "ADJ").pre()))
                .code(CodeDef::new("AND").kind(CodeKind::GroupMarker))
                .code(CodeDef::new("ITEM").child(SpecDef::new(Operator::Next, "ITEM").pre()))
                .build()
                .unwrap(),
        )
    }

    fn spec(op: Operator) -> CodeSpec {
        CodeSpec {
            operator: op,
            target: 0,
            linear_order: LinearOrder::Any,
            linear_contact: false,
            stackable: false,
            implied_parent: false,
        }
    }

    /// A registered terminal without linking, returning its complex.
    fn instance(agenda: &mut Agenda, code: u32, pos: usize, cov: usize) -> ComplexId {
        let unit = agenda.allocate_unit().unwrap();
        agenda
            .make_instance(unit, Some(code), &Terminal::new(code, pos, cov))
            .unwrap();
        agenda.units[unit.index()].is_present = true;
        agenda.register(unit);
        agenda.unit(unit).complexes()[0]
    }

    #[test]
    fn test_join_scores_and_binds_usage() {
        let mut agenda = Agenda::new(grammar());
        let adj = instance(&mut agenda, 1, 0, 1);
        let noun = instance(&mut agenda, 2, 1, 1);
        let id = agenda
            .join(noun, adj, &spec(Operator::HasAttr))
            .joined()
            .unwrap();
        let c = agenda.complex(id);
        assert_eq!(c.weight(), 1 + 1 + 5);
        assert_eq!(c.span(), Some((0, 2)));
        assert_eq!(c.derive_weight(&agenda.complexes), c.weight());
        assert_eq!(c.interps().len(), 1);
        assert_eq!(c.interps()[0].concept.as_ref(), "quality");
        assert!(c.is_updated());
    }

    #[test]
    fn test_join_rejects_occupied_slot_and_conflict() {
        let mut agenda = Agenda::new(grammar());
        let adj = instance(&mut agenda, 1, 0, 1);
        let other = instance(&mut agenda, 1, 2, 1);
        let noun = instance(&mut agenda, 2, 1, 1);
        let joined = agenda
            .join(noun, adj, &spec(Operator::HasAttr))
            .joined()
            .unwrap();
        assert_eq!(
            agenda.join(joined, other, &spec(Operator::HasAttr)),
            JoinOutcome::SlotOccupied
        );

        let overlapping = instance(&mut agenda, 1, 1, 1);
        assert_eq!(
            agenda.join(noun, overlapping, &spec(Operator::HasAttr)),
            JoinOutcome::LinearConflict
        );
        assert_eq!(agenda.stats().conflicts, 1);
        assert!(agenda.check_linear_intersection(noun, overlapping));
        assert!(!agenda.check_linear_intersection(noun, adj));
    }

    #[test]
    fn test_sequencing_has_no_bonus() {
        let mut agenda = Agenda::new(grammar());
        let a = instance(&mut agenda, 4, 0, 1);
        let b = instance(&mut agenda, 4, 1, 1);
        let id = agenda.join(b, a, &spec(Operator::Next)).joined().unwrap();
        assert_eq!(agenda.complex(id).weight(), 2);
        assert!(agenda.complex(id).logic_marker().is_none());
    }

    #[test]
    fn test_sequencing_across_marker_is_a_group() {
        let mut agenda = Agenda::new(grammar());
        let a = instance(&mut agenda, 4, 0, 1);
        instance(&mut agenda, 3, 1, 1);
        let b = instance(&mut agenda, 4, 2, 1);
        let id = agenda.join(b, a, &spec(Operator::Next)).joined().unwrap();
        let c = agenda.complex(id);
        // 1 + 1 + marker weight 1 + group bonus 5
        assert_eq!(c.weight(), 8);
        assert!(c.logic_marker().is_some());
        assert_eq!(c.derive_weight(&agenda.complexes), 8);
    }

    #[test]
    fn test_stackable_join_creates_aggregate() {
        let mut agenda = Agenda::new(grammar());
        let a = instance(&mut agenda, 4, 0, 1);
        let b = instance(&mut agenda, 4, 1, 1);
        let stack = CodeSpec {
            stackable: true,
            ..spec(Operator::Next)
        };
        let id = agenda.join(b, a, &stack).joined().unwrap();
        let aggregate = agenda.complex(id).aggregate().unwrap();
        let unit = agenda.unit(aggregate);
        assert!(unit.is_aggregate());
        assert!(unit.is_present());
        assert_eq!(unit.span(), (0, 2));
        let wrapper = agenda.complex(unit.complexes()[0]);
        assert_eq!(wrapper.child(Operator::Aggregates), Some(id));
        assert_eq!(wrapper.weight(), 2);
    }

    #[test]
    fn test_forget_then_rejoin_matches_direct_join() {
        let mut agenda = Agenda::new(grammar());
        let adj = instance(&mut agenda, 1, 0, 1);
        let noun = instance(&mut agenda, 2, 1, 1);
        let adj_unit = agenda.complex(adj).base();
        let direct = agenda
            .join(noun, adj, &spec(Operator::HasAttr))
            .joined()
            .unwrap();
        let forgotten = agenda.forget(direct, adj_unit).unwrap().unwrap();
        assert!(agenda.complex(forgotten).same_structure(agenda.complex(noun)));
        let again = agenda
            .join(forgotten, adj, &spec(Operator::HasAttr))
            .joined()
            .unwrap();
        assert!(agenda.complex(again).same_structure(agenda.complex(direct)));
        assert_eq!(agenda.forget(noun, adj_unit).unwrap(), None);
    }

    #[test]
    fn test_replace_child_patches_weight() {
        let mut agenda = Agenda::new(grammar());
        let adj = instance(&mut agenda, 1, 0, 1);
        let wide = instance(&mut agenda, 1, 0, 2);
        let noun = instance(&mut agenda, 2, 2, 1);
        let joined = agenda
            .join(noun, adj, &spec(Operator::HasAttr))
            .joined()
            .unwrap();
        let patched = agenda
            .replace_child(joined, Operator::HasAttr, wide)
            .unwrap()
            .unwrap();
        let c = agenda.complex(patched);
        assert_eq!(c.weight(), 1 + 8 + 5);
        assert_eq!(c.span(), Some((0, 3)));
        assert_eq!(c.derive_weight(&agenda.complexes), c.weight());
    }

    #[test]
    fn test_exhausted_complex_pool_is_an_outcome() {
        let config = AgendaConfig {
            complex_capacity: 2,
            ..Default::default()
        };
        let mut agenda = Agenda::with_config(grammar(), config);
        let a = instance(&mut agenda, 4, 0, 1);
        let b = instance(&mut agenda, 4, 1, 1);
        assert!(agenda.complexes_exhausted());
        assert_eq!(agenda.join(b, a, &spec(Operator::Next)), JoinOutcome::PoolExhausted);
    }

    proptest! {
        #[test]
        fn forget_then_rejoin_is_idempotent(
            parent_cov in 1usize..4,
            child_cov in 1usize..4,
            gap in 0usize..3,
            child_first in any::<bool>(),
            op in 0usize..Operator::COUNT,
        ) {
            let mut agenda = Agenda::new(grammar());
            let (parent_pos, child_pos) = if child_first {
                (child_cov + gap, 0)
            } else {
                (0, parent_cov + gap)
            };
            let parent = instance(&mut agenda, 4, parent_pos, parent_cov);
            let child = instance(&mut agenda, 4, child_pos, child_cov);
            let child_unit = agenda.complex(child).base();
            let spec = spec(Operator::ALL[op]);

            let direct = agenda.join(parent, child, &spec).joined().unwrap();
            let forgotten = agenda.forget(direct, child_unit).unwrap().unwrap();
            prop_assert!(agenda.complex(forgotten).same_structure(agenda.complex(parent)));
            let again = agenda.join(forgotten, child, &spec).joined().unwrap();
            prop_assert!(agenda.complex(again).same_structure(agenda.complex(direct)));
            let c = agenda.complex(again);
            prop_assert_eq!(c.derive_weight(&agenda.complexes), c.weight());
        }

        #[test]
        fn joined_weight_is_derivable(
            covs in prop::collection::vec(1usize..4, 2..6),
            ops in prop::collection::vec(0usize..Operator::COUNT, 5),
        ) {
            let mut agenda = Agenda::new(grammar());
            let mut pos = 0;
            let mut ids = Vec::new();
            for cov in &covs {
                ids.push(instance(&mut agenda, 4, pos, *cov));
                pos += cov + 1;
            }
            let mut acc = ids[0];
            for (i, &child) in ids.iter().enumerate().skip(1) {
                let op = Operator::ALL[ops[(i - 1) % ops.len()]];
                if let JoinOutcome::Joined(id) = agenda.join(acc, child, &spec(op)) {
                    acc = id;
                }
                let c = agenda.complex(acc);
                prop_assert_eq!(c.derive_weight(&agenda.complexes), c.weight());
            }
        }
    }
}
