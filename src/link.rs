//! Linking of present units into the structures around them.
//!
//! [`Agenda::link`] runs once for every unit that was really observed:
//!
//! 1. Unrecognized units and markers are left alone.
//! 2. In a positional grammar the unit absorbs the running tail.
//! 3. Otherwise [`Agenda::check_children`] looks for placeholders that were
//!    waiting for this code as a child, and [`Agenda::check_parents`] offers
//!    the unit to every parent the grammar allows, predicting a placeholder
//!    parent when none is there yet.
//!
//! Every accepted relation goes through [`Agenda::add_children`], which keeps
//! the parent's candidate pool sorted and bounded and then cascades updated
//! candidates upward through aggregates and fixed parents.

use crate::agenda::Agenda;
use crate::complex::{Complex, ComplexId, JoinOutcome, Slot};
use crate::grammar::{CodeId, CodeKind, CodeSpec, GrammarKind, LinearOrder, Operator, UNRECOGNIZED};
use crate::unit::UnitId;
use std::sync::Arc;
use tracing::{debug, trace};

impl Agenda {
    /// Connect a newly present unit to its possible children and parents.
    pub fn link(&mut self, unit: UnitId) {
        let u = &self.units[unit.index()];
        if !u.is_present {
            return;
        }
        let Some(code) = u.code.filter(|&c| c != UNRECOGNIZED) else {
            return;
        };
        let grammar = Arc::clone(&self.grammar);
        let Some(def) = grammar.code(code) else {
            return;
        };
        if def.kind != CodeKind::Ordinary {
            return;
        }
        if self.depth >= self.config.max_cascade_depth {
            self.stats.cascade_cutoffs += 1;
            debug!(unit = unit.index(), depth = self.depth, "cascade depth reached");
            return;
        }

        self.stats.links += 1;
        self.depth += 1;
        if grammar.kind() == GrammarKind::Positional {
            self.positional_link(unit);
        } else {
            if def.has_children() {
                self.check_children(unit, code);
            }
            self.check_parents(unit, code);
        }
        self.depth -= 1;
    }

    /// Chain the unit after the current tail. No bonus, no slot matching.
    ///
    /// Goes through `merge` rather than `join`, so positional chains earn no
    /// group-marker bonus and never spawn aggregates.
    fn positional_link(&mut self, unit: UnitId) {
        let Some(tail) = self.linear_last.filter(|&t| t != unit) else {
            return;
        };
        if self.units[tail.index()].end() > self.units[unit.index()].position {
            return;
        }
        let (Some(&prev), Some(&own)) = (
            self.units[tail.index()].complexes.first(),
            self.units[unit.index()].complexes.first(),
        ) else {
            return;
        };

        self.stats.join_attempts += 1;
        if let JoinOutcome::Joined(id) = self.merge(own, prev, Operator::Next, 0) {
            self.stats.joins += 1;
            self.units[unit.index()].complexes[0] = id;
            trace!(unit = unit.index(), tail = tail.index(), weight = self.complexes[id.index()].weight(), "chained");
        }
    }

    /// Satisfy placeholders that predicted `code` (or one of its ancestors)
    /// as a missing child.
    pub fn check_children(&mut self, unit: UnitId, code: CodeId) {
        let grammar = Arc::clone(&self.grammar);
        for level in grammar.lineage(code) {
            let predicted: Vec<UnitId> = self.units_of(level).to_vec();
            for pred in predicted {
                if pred == unit || self.units[pred.index()].is_present {
                    continue;
                }
                if self.units[pred.index()].code != Some(level) {
                    continue;
                }
                self.join_predicted(unit, pred, level);
            }
        }
    }

    /// Take over the children a placeholder collected.
    ///
    /// Every filled slot of the placeholder's complex is offered to `unit`
    /// under the matching child spec of `code`, subject to linear order.
    pub fn join_predicted(&mut self, unit: UnitId, pred: UnitId, code: CodeId) {
        let grammar = Arc::clone(&self.grammar);
        let Some(&seed) = self.units[pred.index()].complexes.first() else {
            return;
        };
        let slots: Vec<(Operator, Slot)> = self.complexes[seed.index()].filled().collect();
        for (op, slot) in slots {
            let child = self.complexes[slot.child.index()].base();
            if child == unit {
                continue;
            }
            let Some(child_code) = self.units[child.index()].code else {
                continue;
            };
            let Some(spec) = grammar.child_spec(code, op, child_code) else {
                continue;
            };
            if !self.check_linear_order(unit, child, spec) {
                continue;
            }
            trace!(unit = unit.index(), pred = pred.index(), child = child.index(), %op, "prediction met");
            self.add_children(unit, child, spec);
        }
    }

    /// Offer the unit to every parent relation of `code`, inherited first.
    pub fn check_parents(&mut self, unit: UnitId, code: CodeId) {
        let grammar = Arc::clone(&self.grammar);
        let lineage = grammar.lineage(code);
        for &level in lineage.iter().rev() {
            let Some(def) = grammar.code(level) else {
                continue;
            };
            for op in Operator::ALL {
                if op == Operator::IsSubclass {
                    continue;
                }
                for spec in def.parents(op) {
                    self.check_parent(unit, level, spec);
                }
            }
        }
    }

    /// Attach the unit to present parents of `parent_spec.target`, or predict one.
    ///
    /// `level` is the code (the unit's own or an ancestor) the relation was
    /// declared for.
    ///
    /// A placeholder is predicted only when no present parent took the unit.
    pub fn check_parent(&mut self, unit: UnitId, level: CodeId, parent_spec: &CodeSpec) {
        let grammar = Arc::clone(&self.grammar);
        let parent_code = parent_spec.target;
        let op = parent_spec.operator;
        let Some(child_code) = self.units[unit.index()].code else {
            return;
        };
        let Some(declared) = grammar.child_spec(parent_code, op, level) else {
            return;
        };

        let mut accepted = false;
        let candidates: Vec<UnitId> = self.units_of(parent_code).to_vec();
        for parent in candidates {
            if parent == unit {
                continue;
            }
            let p = &self.units[parent.index()];
            if !p.is_present {
                continue;
            }
            let Some(p_code) = p.code else { continue };
            let Some(spec) = grammar.child_spec(p_code, op, child_code) else {
                continue;
            };
            if !self.check_linear_order(parent, unit, spec) {
                continue;
            }
            if self.add_children(parent, unit, spec) {
                accepted = true;
            }
        }

        if !accepted {
            self.predict_parent(unit, parent_code, declared);
        }
    }

    /// Synthesize a placeholder parent holding the unit at `spec.operator`.
    ///
    /// Implied parents are made present at the child's span and linked.
    fn predict_parent(&mut self, unit: UnitId, parent_code: CodeId, spec: &CodeSpec) {
        let Ok(placeholder) = self.allocate_unit() else {
            return;
        };
        self.stats.placeholders += 1;
        let (position, coverage) = {
            let u = &self.units[unit.index()];
            (u.position, u.coverage)
        };
        {
            let p = &mut self.units[placeholder.index()];
            p.concept = parent_code;
            p.code = Some(parent_code);
            p.position = position;
            p.coverage = coverage;
        }

        if spec.implied_parent {
            let Ok(seed) = self.alloc_complex(Complex::seed(placeholder)) else {
                return;
            };
            let p = &mut self.units[placeholder.index()];
            p.complexes.push(seed);
            p.is_present = true;
            debug!(unit = unit.index(), parent = placeholder.index(), code = self.grammar.code_name(parent_code), "implied parent");
            self.add_children(placeholder, unit, spec);
            self.link(placeholder);
            self.register(placeholder);
            return;
        }

        let op = spec.operator;
        let width = self.config.pool_width;
        let child_pool = self.units[unit.index()].complexes.clone();
        let mut pool = Vec::with_capacity(width);
        for c in child_pool.into_iter().take(width) {
            let child = &self.complexes[c.index()];
            if child.is_empty() {
                continue;
            }
            let mirrored = Complex::seed(placeholder).adopt(op, Slot { child: c, bonus: 0 }, child);
            match self.alloc_complex(mirrored) {
                Ok(id) => pool.push(id),
                Err(_) => break,
            }
        }
        self.units[placeholder.index()].complexes = pool;
        trace!(unit = unit.index(), placeholder = placeholder.index(), %op, "placeholder predicted");
        self.register(placeholder);
    }

    /// Whether `child` sits where `spec` wants it relative to `parent`.
    pub fn check_linear_order(&self, parent: UnitId, child: UnitId, spec: &CodeSpec) -> bool {
        let p = &self.units[parent.index()];
        let c = &self.units[child.index()];
        let distance = match spec.linear_order {
            LinearOrder::Any => return !spec.linear_contact || c.end() == p.position || p.end() == c.position,
            LinearOrder::Pre => {
                if c.position >= p.position || c.end() > p.position {
                    return false;
                }
                let distance = p.position - c.end();
                if distance > self.config.max_contact_distance {
                    return false;
                }
                distance
            }
            LinearOrder::Post => {
                if c.position < p.end() {
                    return false;
                }
                c.position - p.end()
            }
        };
        !spec.linear_contact || distance == 0
    }

    /// Merge the child's current candidates into the parent's pool.
    ///
    /// Stale references to the child are forgotten first. Joins go to a
    /// staging area of at most `pool_width` results, untouched candidates
    /// are carried over, and the best `pool_width` survive. Returns whether
    /// any join succeeded.
    pub fn add_children(&mut self, parent: UnitId, child: UnitId, spec: &CodeSpec) -> bool {
        let width = self.config.pool_width;

        let mut existing = self.units[parent.index()].complexes.clone();
        let mut forgot = false;
        for id in existing.iter_mut() {
            match self.forget(*id, child) {
                Ok(Some(replacement)) => {
                    *id = replacement;
                    forgot = true;
                }
                Ok(None) => {}
                Err(_) => return false,
            }
        }

        let child_pool = self.units[child.index()].complexes.clone();
        let mut staged = std::mem::take(&mut self.units[parent.index()].top_complexes);
        staged.clear();

        'pairs: for &p in &existing {
            for &c in &child_pool {
                if staged.len() >= width || self.complexes_exhausted() {
                    break 'pairs;
                }
                if self.complexes[c.index()].is_empty() {
                    continue;
                }
                match self.join(p, c, spec) {
                    JoinOutcome::Joined(id) => staged.push(id),
                    JoinOutcome::PoolExhausted => break 'pairs,
                    JoinOutcome::SlotOccupied | JoinOutcome::LinearConflict => {}
                }
            }
        }
        let produced = !staged.is_empty();

        let mut kept: Vec<ComplexId> = Vec::with_capacity(width + 1);
        for id in staged.iter().copied().chain(existing.iter().copied()) {
            if self.complexes[id.index()].is_empty() {
                continue;
            }
            self.rank_insert(&mut kept, id, width);
        }
        debug_assert!(kept.len() <= width);

        staged.clear();
        let u = &mut self.units[parent.index()];
        u.top_complexes = staged;
        if produced || forgot {
            u.complexes = kept;
            trace!(parent = parent.index(), child = child.index(), pool = u.complexes.len(), "pool updated");
        }
        if produced {
            self.propagate(parent);
        }
        produced
    }

    /// Bounded insertion by descending weight.
    ///
    /// Equal weights keep arrival order; duplicates are dropped.
    pub(crate) fn rank_insert(&self, kept: &mut Vec<ComplexId>, id: ComplexId, width: usize) {
        let candidate = &self.complexes[id.index()];
        if kept
            .iter()
            .any(|&k| k == id || self.complexes[k.index()].same_structure(candidate))
        {
            return;
        }
        let at = kept
            .iter()
            .position(|&k| candidate.weight > self.complexes[k.index()].weight)
            .unwrap_or(kept.len());
        if at >= width {
            return;
        }
        kept.insert(at, id);
        kept.truncate(width);
    }

    /// Cascade the unit's freshly updated candidates upward.
    fn propagate(&mut self, unit: UnitId) {
        let pool = self.units[unit.index()].complexes.clone();
        let fixed = self.units[unit.index()].fixed_parent;
        let mut patched = false;
        for id in pool {
            if !self.complexes[id.index()].is_updated {
                continue;
            }
            self.complexes[id.index()].is_updated = false;
            if let Some(aggregate) = self.complexes[id.index()].aggregate {
                if !self.units[aggregate.index()].registered {
                    self.link(aggregate);
                    self.register(aggregate);
                }
            } else if let Some((parent, op)) = fixed {
                if !patched {
                    patched = true;
                    self.inform_fixed_parent(parent, op, unit, id);
                }
            }
        }
    }

    /// Patch a fixed parent's slot to point at the child's new best candidate.
    fn inform_fixed_parent(&mut self, parent: UnitId, op: Operator, child: UnitId, updated: ComplexId) {
        let width = self.config.pool_width;
        let pool = self.units[parent.index()].complexes.clone();
        let mut changed = false;
        let mut kept = Vec::with_capacity(width);
        for id in pool {
            let refers = self.complexes[id.index()]
                .slot(op)
                .is_some_and(|s| s.child != updated && self.complexes[s.child.index()].base() == child);
            let next = if refers {
                match self.replace_child(id, op, updated) {
                    Ok(Some(patched)) => {
                        changed = true;
                        patched
                    }
                    Ok(None) => id,
                    Err(_) => return,
                }
            } else {
                id
            };
            self.rank_insert(&mut kept, next, width);
        }
        if changed {
            trace!(parent = parent.index(), child = child.index(), %op, "fixed parent patched");
            self.units[parent.index()].complexes = kept;
            self.propagate(parent);
        }
    }
}
