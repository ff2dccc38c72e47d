//! Concept-Chart: weighted incremental concept parsing.
//!
//! This crate provides:
//! - An immutable grammar model of typed codes related by operators
//! - Complexes: immutable weighted candidate structures with linear ownership
//! - The agenda: arenas and indices for one decode session
//! - Join, forget and logical-group rules over complexes
//! - The ConcUnit linking engine (children, parents, placeholders, aggregates)
//! - A precomputed linear cache for solved atomic sequences
//! - Shareable decoders with parallel batch decoding

pub mod agenda;
pub mod cache;
pub mod complex;
pub mod grammar;
pub mod join;
pub mod linear;
pub mod link;
pub mod scoring;
pub mod session;
pub mod unit;

#[cfg(test)]
mod engine_test;

// Re-exports for convenience
pub use agenda::{Agenda, AgendaConfig, AgendaError, AgendaResult, AgendaStats, Pool, Solution};
pub use cache::{CacheConfig, CacheError, CodeMatch, LinearCache, LookupStats, Recognizer};
pub use complex::{Complex, ComplexId, Interp, JoinOutcome, Slot};
pub use grammar::{
    Code, CodeDef, CodeId, CodeKind, CodeSpec, Composite, CompositeDef, ContextId, Derivation,
    DerivationDef, Grammar, GrammarBuilder, GrammarError, GrammarKind, LinearOrder, Operator,
    SpecDef, UNRECOGNIZED,
};
pub use linear::{Coverage, LinearIndex, Span};
pub use scoring::Scoring;
pub use session::{Decoded, Decoder, DecoderBuilder};
pub use unit::{ConcUnit, Terminal, UnitId};
