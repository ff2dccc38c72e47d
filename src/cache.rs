//! Precomputed matrix of solved atomic sequences.
//!
//! The cache addresses a flat matrix by the first `depth` concept ids of a
//! sequence (mixed radix, most significant id first, radix = the provider
//! grammar's code count). Each cell keeps a short list of tails holding the
//! remaining ids, and each tail the codes that the whole sequence stands for.
//!
//! A built cache is immutable and is shared between sessions behind an `Arc`.
//! Lookups write straight into the caller's [`Agenda`] without running the
//! join engine.

use crate::agenda::{Agenda, AgendaError};
use crate::grammar::{CodeId, ContextId, Grammar, UNRECOGNIZED};
use crate::unit::Terminal;
use std::mem;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Runs the provider's own recognition over a declared sequence.
pub trait Recognizer {
    fn recognize(&self, sequence: &str) -> Vec<Terminal>;
}

impl<F> Recognizer for F
where
    F: Fn(&str) -> Vec<Terminal>,
{
    fn recognize(&self, sequence: &str) -> Vec<Terminal> {
        self(sequence)
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Number of leading ids folded into the matrix address.
    pub depth: usize,
    /// Memory ceiling for the matrix itself.
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            depth: 3,
            max_bytes: 160 * 1024 * 1024,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache matrix of {cells} cells needs {bytes} bytes, limit is {limit}")]
    CapacityExceeded { cells: usize, bytes: usize, limit: usize },

    #[error("cache depth must be at least 1")]
    ZeroDepth,

    #[error("agenda grammar '{agenda}' is not the cached grammar '{cache}'")]
    GrammarMismatch { agenda: String, cache: String },

    #[error("no cache configured")]
    Unavailable,

    #[error(transparent)]
    Agenda(#[from] AgendaError),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// A code a cached sequence stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeMatch {
    pub code: CodeId,
    pub context: Option<ContextId>,
}

#[derive(Debug, Clone)]
struct Tail {
    ids: Vec<CodeId>,
    matches: Vec<CodeMatch>,
}

#[derive(Debug, Clone, Default)]
struct Cell {
    tails: Vec<Tail>,
    max_tail_len: usize,
}

impl Cell {
    fn find(&self, ids: &[CodeId]) -> Option<&Tail> {
        self.tails.iter().find(|t| t.ids == ids)
    }
}

/// Counters for one lookup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupStats {
    pub hits: usize,
    pub misses: usize,
    pub units: usize,
}

#[derive(Debug)]
pub struct LinearCache {
    grammar: Arc<Grammar>,
    provider: Arc<Grammar>,
    config: CacheConfig,
    radix: usize,
    row_sizes: Vec<usize>,
    cells: Vec<Option<Box<Cell>>>,
    num_sequences: usize,
    num_tails: usize,
}

impl LinearCache {
    /// Allocate the matrix for sequences of `provider` concept ids that
    /// stand for codes of `grammar`.
    pub fn build_matrix(
        grammar: Arc<Grammar>,
        provider: Arc<Grammar>,
        config: CacheConfig,
    ) -> CacheResult<Self> {
        if config.depth == 0 {
            return Err(CacheError::ZeroDepth);
        }
        let radix = provider.num_codes();
        let cell_size = mem::size_of::<Option<Box<Cell>>>();
        let too_big = |cells: usize| CacheError::CapacityExceeded {
            cells,
            bytes: cells.saturating_mul(cell_size),
            limit: config.max_bytes,
        };
        let cells = u32::try_from(config.depth)
            .ok()
            .and_then(|d| radix.checked_pow(d))
            .ok_or_else(|| too_big(usize::MAX))?;
        if cells.saturating_mul(cell_size) > config.max_bytes {
            let err = too_big(cells);
            warn!(%err, "linear cache disabled");
            return Err(err);
        }

        let mut row_sizes = vec![1; config.depth];
        for i in (0..config.depth - 1).rev() {
            row_sizes[i] = row_sizes[i + 1] * radix;
        }

        info!(radix, depth = config.depth, cells, "linear cache matrix allocated");
        Ok(LinearCache {
            grammar,
            provider,
            radix,
            row_sizes,
            cells: std::iter::repeat_with(|| None).take(cells).collect(),
            config,
            num_sequences: 0,
            num_tails: 0,
        })
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    pub fn provider(&self) -> &Arc<Grammar> {
        &self.provider
    }

    pub fn depth(&self) -> usize {
        self.config.depth
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn num_sequences(&self) -> usize {
        self.num_sequences
    }

    pub fn num_tails(&self) -> usize {
        self.num_tails
    }

    /// Recognize every declared sequence once and store the result.
    ///
    /// Returns the number of sequences stored; sequences the provider does
    /// not fully recognize are skipped.
    #[instrument(skip_all, fields(grammar = self.grammar.name()))]
    pub fn populate_matrix(&mut self, recognizer: &dyn Recognizer) -> usize {
        let grammar = Arc::clone(&self.grammar);
        let mut stored = 0;
        for (code, seq, context) in grammar.sequences() {
            let terminals = recognizer.recognize(seq);
            if terminals.is_empty() || terminals.iter().any(|t| t.concept == UNRECOGNIZED) {
                warn!(sequence = seq, code = grammar.code_name(code), "sequence not recognized, skipped");
                continue;
            }
            let ids: Vec<CodeId> = terminals.iter().map(|t| t.concept).collect();
            if self.insert(&ids, CodeMatch { code, context }) {
                stored += 1;
            }
        }
        info!(stored, tails = self.num_tails, "linear cache populated");
        stored
    }

    /// Record that the id sequence stands for `code_match`.
    pub fn insert(&mut self, ids: &[CodeId], code_match: CodeMatch) -> bool {
        if ids.is_empty() || ids.iter().any(|&id| id == UNRECOGNIZED || id as usize >= self.radix) {
            return false;
        }
        let depth = self.config.depth.min(ids.len());
        let address = self.address(&ids[..depth]);
        let rest = &ids[depth..];

        let cell = self.cells[address].get_or_insert_with(Box::default);
        let tail = match cell.tails.iter().position(|t| t.ids == rest) {
            Some(i) => &mut cell.tails[i],
            None => {
                cell.tails.push(Tail {
                    ids: rest.to_vec(),
                    matches: Vec::new(),
                });
                cell.max_tail_len = cell.max_tail_len.max(rest.len());
                self.num_tails += 1;
                let last = cell.tails.len() - 1;
                &mut cell.tails[last]
            }
        };
        if tail.matches.contains(&code_match) {
            return false;
        }
        tail.matches.push(code_match);
        self.num_sequences += 1;
        true
    }

    fn address(&self, ids: &[CodeId]) -> usize {
        ids.iter()
            .zip(&self.row_sizes)
            .map(|(&id, &row)| id as usize * row)
            .sum()
    }

    /// Matches recorded for exactly this id sequence.
    pub fn get(&self, ids: &[CodeId]) -> &[CodeMatch] {
        if ids.is_empty() || ids.iter().any(|&id| id as usize >= self.radix) {
            return &[];
        }
        let depth = self.config.depth.min(ids.len());
        self.cells[self.address(&ids[..depth])]
            .as_ref()
            .and_then(|cell| cell.find(&ids[depth..]))
            .map_or(&[], |t| t.matches.as_slice())
    }

    /// Materialize every cached sequence found in `atoms` into `agenda`.
    ///
    /// For each start position the atoms are extended one by one; every
    /// prefix with recorded matches becomes present units at that start,
    /// registered but not linked. Starts with no match get an unrecognized
    /// unit. Running out of units or complexes ends the lookup early with
    /// what was materialized so far.
    pub fn lookup(&self, atoms: &[Terminal], agenda: &mut Agenda) -> CacheResult<LookupStats> {
        if !Arc::ptr_eq(&self.grammar, agenda.grammar()) {
            return Err(CacheError::GrammarMismatch {
                agenda: agenda.grammar().name().to_string(),
                cache: self.grammar.name().to_string(),
            });
        }
        let mut stats = LookupStats::default();
        let mut tail: Vec<CodeId> = Vec::new();

        for start in 0..atoms.len() {
            let scanned = self.materialize_from(atoms, start, &mut tail, agenda, &mut stats);
            let outcome = match scanned {
                Ok(true) => Ok(()),
                Ok(false) => {
                    let first = &atoms[start];
                    stats.misses += 1;
                    agenda.stats.cache_misses += 1;
                    let gap = Terminal::new(UNRECOGNIZED, first.position, first.coverage);
                    materialize(agenda, None, &gap).map(|()| stats.units += 1)
                }
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => {}
                Err(AgendaError::PoolExhausted { pool }) => {
                    debug!(%pool, start, units = stats.units, "cache lookup stopped");
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(stats)
    }

    /// Materialize every cached prefix of `atoms[start..]`; returns whether
    /// any matched.
    fn materialize_from(
        &self,
        atoms: &[Terminal],
        start: usize,
        tail: &mut Vec<CodeId>,
        agenda: &mut Agenda,
        stats: &mut LookupStats,
    ) -> Result<bool, AgendaError> {
        let depth = self.config.depth;
        let first = &atoms[start];
        let mut address = 0;
        let mut hit = false;
        tail.clear();

        for (offset, atom) in atoms[start..].iter().enumerate() {
            let id = atom.concept;
            if id == UNRECOGNIZED || id as usize >= self.radix {
                break;
            }
            if offset < depth {
                address += id as usize * self.row_sizes[offset];
            } else {
                tail.push(id);
            }
            let Some(cell) = &self.cells[address] else {
                if offset + 1 >= depth {
                    break;
                }
                continue;
            };
            if tail.len() > cell.max_tail_len {
                break;
            }
            let Some(found) = cell.find(tail) else {
                continue;
            };

            let coverage = atom.end() - first.position;
            for m in &found.matches {
                let terminal = Terminal {
                    concept: m.code,
                    position: first.position,
                    coverage,
                    sparse: false,
                    context: m.context,
                };
                materialize(agenda, Some(m.code), &terminal)?;
                stats.units += 1;
                if !hit {
                    hit = true;
                    stats.hits += 1;
                    agenda.stats.cache_hits += 1;
                }
            }
            debug!(start = first.position, coverage, matches = found.matches.len(), "cache hit");
        }
        Ok(hit)
    }
}

/// A present, registered, unlinked unit for `terminal`.
fn materialize(agenda: &mut Agenda, code: Option<CodeId>, terminal: &Terminal) -> Result<(), AgendaError> {
    let unit = agenda.allocate_unit()?;
    agenda.make_instance(unit, code, terminal)?;
    agenda.units[unit.index()].is_present = true;
    agenda.register(unit);
    Ok(())
}
