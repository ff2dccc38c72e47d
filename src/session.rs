//! Decode sessions over a shared grammar.
//!
//! A [`Decoder`] holds only shared, read-only state (the grammar and an
//! optional [`LinearCache`]), so one decoder serves any number of threads.
//! Each session owns its own [`Agenda`].

use crate::agenda::{Agenda, AgendaConfig, AgendaError, AgendaStats, Solution};
use crate::cache::{CacheError, CacheResult, LinearCache};
use crate::grammar::Grammar;
use crate::scoring::Scoring;
use crate::unit::Terminal;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Result of one decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub solution: Option<Solution>,
    pub stats: AgendaStats,
    /// True when the answer came straight from the linear cache.
    pub cached: bool,
}

#[derive(Debug, Clone)]
pub struct Decoder {
    grammar: Arc<Grammar>,
    cache: Option<Arc<LinearCache>>,
    config: AgendaConfig,
}

impl Decoder {
    pub fn new(grammar: Arc<Grammar>) -> Self {
        Self::with_config(grammar, AgendaConfig::default())
    }

    pub fn with_config(grammar: Arc<Grammar>, config: AgendaConfig) -> Self {
        Decoder {
            grammar,
            cache: None,
            config,
        }
    }

    pub fn builder(grammar: Arc<Grammar>) -> DecoderBuilder {
        DecoderBuilder::new(grammar)
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    pub fn config(&self) -> &AgendaConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<LinearCache>> {
        self.cache.as_ref()
    }

    /// A fresh agenda for this decoder's grammar.
    pub fn session(&self) -> Agenda {
        Agenda::with_config(Arc::clone(&self.grammar), self.config.clone())
    }

    /// Decode one input of terminals in position order.
    #[instrument(skip_all, fields(grammar = self.grammar.name(), terminals = terminals.len()))]
    pub fn decode(&self, terminals: &[Terminal]) -> Decoded {
        let mut agenda = self.session();
        self.decode_into(&mut agenda, terminals)
    }

    /// Decode reusing an existing agenda's allocations.
    pub fn decode_into(&self, agenda: &mut Agenda, terminals: &[Terminal]) -> Decoded {
        agenda.reset();
        for terminal in terminals {
            match agenda.feed(terminal) {
                Ok(_) => {}
                Err(AgendaError::PoolExhausted { pool }) => {
                    debug!(%pool, position = terminal.position, "stopped feeding");
                    break;
                }
                Err(err) => warn!(%err, "terminal skipped"),
            }
        }
        agenda.finish();
        Decoded {
            solution: agenda.solution(),
            stats: agenda.stats().clone(),
            cached: false,
        }
    }

    /// Decode a sequence of provider atoms through the linear cache.
    ///
    /// A cached sequence covering every atom is returned as is, the heaviest
    /// one and then the lowest code id winning. Otherwise the recognized hits
    /// are fed to the join engine as terminals.
    pub fn decode_cached(&self, atoms: &[Terminal]) -> CacheResult<Decoded> {
        let cache = self.cache.as_ref().ok_or(CacheError::Unavailable)?;
        let mut staging = self.session();
        cache.lookup(atoms, &mut staging)?;

        let (Some(first), Some(last)) = (atoms.first(), atoms.last()) else {
            return Ok(self.decode(&[]));
        };
        let full = staging
            .units_at(first.position)
            .iter()
            .map(|&u| staging.unit(u))
            .filter(|u| u.is_recognized() && u.end() == last.end())
            .filter_map(|u| Some((u.code()?, *u.complexes().first()?)))
            .max_by(|(ca, a), (cb, b)| {
                let (wa, wb) = (staging.complex(*a).weight(), staging.complex(*b).weight());
                wa.cmp(&wb).then(cb.cmp(ca))
            });
        if let Some((_, best)) = full {
            debug!(span = ?(first.position, last.end()), "answered from cache");
            return Ok(Decoded {
                solution: Some(staging.snapshot(best)),
                stats: staging.stats().clone(),
                cached: true,
            });
        }

        let hits: Vec<Terminal> = staging
            .units()
            .filter(|(_, u)| u.is_present() && u.is_recognized())
            .map(|(_, u)| u.as_terminal())
            .collect();
        let mut decoded = self.decode(&hits);
        decoded.stats.cache_hits = staging.stats().cache_hits;
        decoded.stats.cache_misses = staging.stats().cache_misses;
        decoded.stats.pool_exhausted += staging.stats().pool_exhausted;
        Ok(decoded)
    }

    /// Decode independent inputs in parallel, one agenda per worker.
    pub fn decode_batch(&self, inputs: &[Vec<Terminal>]) -> Vec<Decoded> {
        inputs
            .par_iter()
            .map_init(|| self.session(), |agenda, input| self.decode_into(agenda, input))
            .collect()
    }
}

pub struct DecoderBuilder {
    grammar: Arc<Grammar>,
    config: AgendaConfig,
    cache: Option<Arc<LinearCache>>,
}

impl DecoderBuilder {
    pub fn new(grammar: Arc<Grammar>) -> Self {
        DecoderBuilder {
            grammar,
            config: AgendaConfig::default(),
            cache: None,
        }
    }

    pub fn config(mut self, config: AgendaConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pool_width(mut self, width: usize) -> Self {
        self.config.pool_width = width;
        self
    }

    pub fn max_joins(mut self, n: usize) -> Self {
        self.config.max_joins = n;
        self
    }

    pub fn scoring(mut self, scoring: Scoring) -> Self {
        self.config.scoring = scoring;
        self
    }

    pub fn cache(mut self, cache: Arc<LinearCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Decoder {
        Decoder {
            grammar: self.grammar,
            cache: self.cache,
            config: self.config,
        }
    }
}
