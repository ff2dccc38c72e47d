//! Operational memory for one decode session.
//!
//! The agenda owns two arenas, one for [`ConcUnit`]s and one for
//! [`Complex`]es, and the indices the join engine searches:
//! - concept buckets (by code id, or baseclass id when the code has one)
//! - units by linear position
//! - delimiters and group/alternation markers by position
//!
//! Arenas are plain vectors with fixed capacities taken from
//! [`AgendaConfig`]; running out is reported as [`AgendaError::PoolExhausted`]
//! and never grows the arena. [`Agenda::reset`] rewinds everything for the
//! next input while keeping the allocations.

use crate::complex::{Complex, ComplexId, Slot};
use crate::grammar::{
    CodeId, CodeKind, Composite, Grammar, GrammarKind, Operator, UNRECOGNIZED,
};
use crate::linear::Span;
use crate::scoring::Scoring;
use crate::unit::{ConcUnit, Terminal, UnitId};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Configuration for an agenda.
#[derive(Debug, Clone)]
pub struct AgendaConfig {
    /// Capacity of the unit arena.
    pub unit_capacity: usize,
    /// Units reserved for aggregates, on top of `unit_capacity`.
    pub aggregate_capacity: usize,
    /// Capacity of the complex arena.
    pub complex_capacity: usize,
    /// Candidate complexes kept per unit.
    pub pool_width: usize,
    /// Interpretations kept per complex.
    pub interp_capacity: usize,
    /// Highest input position (exclusive) a terminal may reach.
    pub input_window: usize,
    /// Largest gap between a preceding child and its parent.
    pub max_contact_distance: usize,
    /// Nesting limit for link cascades.
    pub max_cascade_depth: usize,
    /// Join attempts after which new terminals are no longer linked (0 = unlimited).
    pub max_joins: usize,
    pub scoring: Scoring,
}

impl Default for AgendaConfig {
    fn default() -> Self {
        AgendaConfig {
            unit_capacity: 1024,
            aggregate_capacity: 256,
            complex_capacity: 16384,
            pool_width: 4,
            interp_capacity: 4,
            input_window: 256,
            max_contact_distance: 4,
            max_cascade_depth: 32,
            max_joins: 0,
            scoring: Scoring::default(),
        }
    }
}

/// Statistics about one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgendaStats {
    pub units: usize,
    pub aggregates: usize,
    pub complexes: usize,
    pub placeholders: usize,
    /// Calls to `link` that reached the join engine.
    pub links: usize,
    pub join_attempts: usize,
    pub joins: usize,
    pub conflicts: usize,
    pub pool_exhausted: usize,
    pub cascade_cutoffs: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub budget_exhausted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pool {
    Units,
    Aggregates,
    Complexes,
}

impl Pool {
    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pool::Units => "unit",
            Pool::Aggregates => "aggregate",
            Pool::Complexes => "complex",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgendaError {
    #[error("{pool} pool exhausted")]
    PoolExhausted { pool: Pool },

    #[error("terminal ending at {end} lies outside the input window of {window}")]
    InputOutOfWindow { end: usize, window: usize },
}

pub type AgendaResult<T> = Result<T, AgendaError>;

/// Owned snapshot of a complex and everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub code: CodeId,
    pub name: Arc<str>,
    pub weight: i32,
    pub span: Span,
    pub interps: Vec<Arc<str>>,
    pub logic_marker: Option<Arc<str>>,
    pub children: Vec<(Operator, Solution)>,
}

impl Solution {
    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(|(_, c)| c.size()).sum::<usize>()
    }

    pub fn child(&self, op: Operator) -> Option<&Solution> {
        self.children.iter().find(|(o, _)| *o == op).map(|(_, c)| c)
    }
}

pub struct Agenda {
    pub(crate) grammar: Arc<Grammar>,
    pub(crate) config: AgendaConfig,
    pub(crate) units: Vec<ConcUnit>,
    pub(crate) complexes: Vec<Complex>,
    num_aggregates: usize,
    concept_index: Vec<Vec<UnitId>>,
    position_index: Vec<Vec<UnitId>>,
    delimiter_index: Vec<Vec<UnitId>>,
    marker_index: Vec<Vec<UnitId>>,
    last_filled: usize,
    pub(crate) linear_last: Option<UnitId>,
    best: Option<ComplexId>,
    pub(crate) stats: AgendaStats,
    pub(crate) depth: usize,
    exhausted: [bool; 3],
}

impl Agenda {
    pub fn new(grammar: Arc<Grammar>) -> Self {
        Self::with_config(grammar, AgendaConfig::default())
    }

    pub fn with_config(grammar: Arc<Grammar>, config: AgendaConfig) -> Self {
        let num_codes = grammar.num_codes();
        Agenda {
            units: Vec::with_capacity(config.unit_capacity.min(4096)),
            complexes: Vec::with_capacity(config.complex_capacity.min(16384)),
            num_aggregates: 0,
            concept_index: vec![Vec::new(); num_codes],
            position_index: Vec::new(),
            delimiter_index: Vec::new(),
            marker_index: Vec::new(),
            last_filled: 0,
            linear_last: None,
            best: None,
            stats: AgendaStats::default(),
            depth: 0,
            exhausted: [false; 3],
            grammar,
            config,
        }
    }

    /// Rewind arenas and clear every index for the next input.
    pub fn reset(&mut self) {
        self.units.clear();
        self.complexes.clear();
        self.num_aggregates = 0;
        for index in [
            &mut self.concept_index,
            &mut self.position_index,
            &mut self.delimiter_index,
            &mut self.marker_index,
        ] {
            index.iter_mut().for_each(Vec::clear);
        }
        self.last_filled = 0;
        self.linear_last = None;
        self.best = None;
        self.stats = AgendaStats::default();
        self.depth = 0;
        self.exhausted = [false; 3];
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    pub fn config(&self) -> &AgendaConfig {
        &self.config
    }

    pub fn stats(&self) -> &AgendaStats {
        &self.stats
    }

    #[inline]
    pub fn unit(&self, id: UnitId) -> &ConcUnit {
        &self.units[id.index()]
    }

    #[inline]
    pub fn complex(&self, id: ComplexId) -> &Complex {
        &self.complexes[id.index()]
    }

    pub fn units(&self) -> impl Iterator<Item = (UnitId, &ConcUnit)> {
        self.units
            .iter()
            .enumerate()
            .map(|(i, u)| (UnitId::new(i as u32), u))
    }

    pub fn num_units(&self) -> usize {
        self.units.len()
    }

    pub fn num_complexes(&self) -> usize {
        self.complexes.len()
    }

    /// Units registered in the concept bucket of `code`.
    pub fn units_of(&self, code: CodeId) -> &[UnitId] {
        let bucket = self.grammar.bucket_of(code);
        self.concept_index
            .get(bucket as usize)
            .map_or(&[], |v| v.as_slice())
    }

    /// Present units starting at `pos`.
    pub fn units_at(&self, pos: usize) -> &[UnitId] {
        cell(&self.position_index, pos)
    }

    pub fn delimiters_at(&self, pos: usize) -> &[UnitId] {
        cell(&self.delimiter_index, pos)
    }

    pub fn markers_at(&self, pos: usize) -> &[UnitId] {
        cell(&self.marker_index, pos)
    }

    /// End of the furthest registered unit.
    pub fn last_filled(&self) -> usize {
        self.last_filled
    }

    /// Take the next free unit slot.
    pub fn allocate_unit(&mut self) -> AgendaResult<UnitId> {
        if self.units.len() - self.num_aggregates >= self.config.unit_capacity {
            return Err(self.exhaust(Pool::Units));
        }
        Ok(self.push_unit())
    }

    pub(crate) fn allocate_aggregate(&mut self) -> AgendaResult<UnitId> {
        if self.num_aggregates >= self.config.aggregate_capacity {
            return Err(self.exhaust(Pool::Aggregates));
        }
        self.num_aggregates += 1;
        self.stats.aggregates += 1;
        let id = self.push_unit();
        self.units[id.index()].is_aggregate = true;
        Ok(id)
    }

    fn push_unit(&mut self) -> UnitId {
        let id = UnitId::new(self.units.len() as u32);
        self.units.push(ConcUnit::blank());
        self.stats.units += 1;
        id
    }

    #[inline]
    pub(crate) fn next_complex_id(&self) -> ComplexId {
        ComplexId::new(self.complexes.len() as u32)
    }

    pub(crate) fn alloc_complex(&mut self, complex: Complex) -> AgendaResult<ComplexId> {
        if self.complexes.len() >= self.config.complex_capacity {
            return Err(self.exhaust(Pool::Complexes));
        }
        let id = self.next_complex_id();
        self.complexes.push(complex);
        self.stats.complexes += 1;
        Ok(id)
    }

    fn exhaust(&mut self, pool: Pool) -> AgendaError {
        self.stats.pool_exhausted += 1;
        if !self.exhausted[pool.index()] {
            self.exhausted[pool.index()] = true;
            warn!(%pool, units = self.units.len(), complexes = self.complexes.len(), "pool exhausted");
        }
        AgendaError::PoolExhausted { pool }
    }

    /// Insert a unit into the indices matching its code.
    pub fn register(&mut self, unit: UnitId) {
        let (code, pos, end, present) = {
            let u = &mut self.units[unit.index()];
            if u.registered {
                return;
            }
            u.registered = true;
            (u.code, u.position, u.end(), u.is_present)
        };
        if present {
            self.last_filled = self.last_filled.max(end);
        }

        let code = code.filter(|&c| c != UNRECOGNIZED);
        let kind = code
            .and_then(|c| self.grammar.code(c))
            .map_or(CodeKind::Ordinary, |c| c.kind);
        match (code, kind) {
            (None, _) => push_cell(&mut self.position_index, pos, unit),
            (Some(_), CodeKind::Separator) => push_cell(&mut self.delimiter_index, pos, unit),
            (Some(_), k) if k.is_marker() => push_cell(&mut self.marker_index, pos, unit),
            (Some(code), _) => {
                let bucket = self.grammar.bucket_of(code) as usize;
                if let Some(cell) = self.concept_index.get_mut(bucket) {
                    cell.push(unit);
                }
                if present {
                    push_cell(&mut self.position_index, pos, unit);
                    if self.grammar.kind() == GrammarKind::Positional {
                        self.linear_last = Some(unit);
                    }
                }
            }
        }
        trace!(unit = unit.index(), ?code, pos, present, "registered");
    }

    /// Feed one terminal of this grammar.
    pub fn feed(&mut self, terminal: &Terminal) -> AgendaResult<UnitId> {
        let code = self
            .grammar
            .code(terminal.concept)
            .map(|c| c.id)
            .filter(|&c| c != UNRECOGNIZED);
        self.feed_code(code, terminal)
    }

    /// Instantiate `code` for a terminal, link it and register it.
    pub(crate) fn feed_code(
        &mut self,
        code: Option<CodeId>,
        terminal: &Terminal,
    ) -> AgendaResult<UnitId> {
        if terminal.end() > self.config.input_window {
            return Err(AgendaError::InputOutOfWindow {
                end: terminal.end(),
                window: self.config.input_window,
            });
        }
        let grammar = Arc::clone(&self.grammar);
        if let Some(composite) = code.and_then(|c| grammar.code(c)).and_then(|c| c.composite.as_ref()) {
            return self.add_code_complex(composite, terminal);
        }

        let unit = self.allocate_unit()?;
        self.make_instance(unit, code, terminal)?;
        self.units[unit.index()].is_present = true;
        if self.within_budget() {
            self.link(unit);
        }
        self.register(unit);
        Ok(unit)
    }

    /// Instantiate every level of a rigid composition.
    ///
    /// Inner levels are produced first; each outer level mirrors its child's
    /// complexes and becomes that child's fixed parent.
    fn add_code_complex(&mut self, composite: &Composite, terminal: &Terminal) -> AgendaResult<UnitId> {
        let child = match &composite.child {
            Some((op, inner)) => Some((*op, self.add_code_complex(inner, terminal)?)),
            None => None,
        };

        let unit = self.allocate_unit()?;
        self.make_instance(unit, Some(composite.code), terminal)?;
        self.units[unit.index()].is_present = true;

        if let Some((op, child)) = child {
            self.units[child.index()].fixed_parent = Some((unit, op));
            let mut pool = Vec::new();
            for &c in &self.units[child.index()].complexes.clone() {
                let mirrored = Complex::seed(unit).adopt(
                    op,
                    Slot { child: c, bonus: 0 },
                    &self.complexes[c.index()],
                );
                pool.push(self.alloc_complex(mirrored)?);
            }
            self.units[unit.index()].complexes = pool;
        }

        if self.within_budget() {
            self.link(unit);
        }
        self.register(unit);
        Ok(unit)
    }

    fn within_budget(&mut self) -> bool {
        let max = self.config.max_joins;
        if max == 0 || self.stats.join_attempts < max {
            return true;
        }
        if !self.stats.budget_exhausted {
            self.stats.budget_exhausted = true;
            warn!(max_joins = max, "join budget exhausted, later terminals are not linked");
        }
        false
    }

    /// Merge the units produced by a subordinate agenda.
    ///
    /// A denotational grammar only translates concept ids; the others
    /// instantiate and link every denoted code.
    pub fn update(&mut self, sub: &Agenda) -> AgendaResult<()> {
        let grammar = Arc::clone(&self.grammar);
        for cell in &sub.position_index {
            for &src in cell {
                let src = sub.unit(src);
                if !src.is_present() || src.is_aggregate() {
                    continue;
                }
                let terminal = src.as_terminal();
                match grammar.kind() {
                    GrammarKind::Denotational => {
                        let code = grammar.denotations(src.concept()).first().copied();
                        let unit = match self.allocate_unit() {
                            Ok(unit) => unit,
                            Err(AgendaError::PoolExhausted { .. }) => return Ok(()),
                            Err(e) => return Err(e),
                        };
                        self.make_instance(unit, code, &terminal)?;
                        self.units[unit.index()].is_present = true;
                        self.register(unit);
                    }
                    GrammarKind::Operational | GrammarKind::Positional => {
                        if src.concept() == UNRECOGNIZED {
                            continue;
                        }
                        for &code in grammar.denotations(src.concept()) {
                            match self.feed_code(Some(code), &terminal) {
                                Ok(_) => {}
                                Err(AgendaError::PoolExhausted { .. }) => return Ok(()),
                                Err(e) => return Err(e),
                            }
                        }
                    }
                }
            }
        }
        self.finish();
        Ok(())
    }

    /// Select the best complex among present units.
    ///
    /// Highest weight wins; equal weights go to the lower code id.
    pub fn finish(&mut self) -> Option<ComplexId> {
        let mut best: Option<(i32, CodeId, ComplexId)> = None;
        for unit in &self.units {
            if !unit.is_present {
                continue;
            }
            let Some(code) = unit.code else { continue };
            for &id in &unit.complexes {
                let c = &self.complexes[id.index()];
                if c.is_empty() {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((w, bc, _)) => c.weight > w || (c.weight == w && code < bc),
                };
                if better {
                    best = Some((c.weight, code, id));
                }
            }
        }
        self.best = best.map(|(_, _, id)| id);
        if let Some((weight, code, _)) = best {
            debug!(weight, code = self.grammar.code_name(code), "best complex");
        }
        self.best
    }

    pub fn best_complex(&self) -> Option<ComplexId> {
        self.best
    }

    pub fn best(&self) -> Option<&Complex> {
        self.best.map(|id| self.complex(id))
    }

    /// Snapshot of the best complex.
    pub fn solution(&self) -> Option<Solution> {
        self.best.map(|id| self.snapshot(id))
    }

    pub fn snapshot(&self, id: ComplexId) -> Solution {
        let c = self.complex(id);
        let code = self.unit(c.base()).code().unwrap_or(UNRECOGNIZED);
        let marker = c
            .logic_marker()
            .and_then(|m| self.unit(m).code())
            .map(|m| Arc::from(self.grammar.code_name(m)));
        Solution {
            code,
            name: Arc::from(self.grammar.code_name(code)),
            weight: c.weight(),
            span: c.span().unwrap_or_else(|| self.unit(c.base()).span()),
            interps: c.interps().iter().map(|i| i.concept.clone()).collect(),
            logic_marker: marker,
            children: c
                .filled()
                .map(|(op, slot)| (op, self.snapshot(slot.child)))
                .collect(),
        }
    }
}

fn cell(index: &[Vec<UnitId>], pos: usize) -> &[UnitId] {
    index.get(pos).map_or(&[], |v| v.as_slice())
}

fn push_cell(index: &mut Vec<Vec<UnitId>>, pos: usize, unit: UnitId) {
    if index.len() <= pos {
        index.resize_with(pos + 1, Vec::new);
    }
    index[pos].push(unit);
}
