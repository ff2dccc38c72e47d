//! End-to-end decoding tests
//!
//! Drives whole inputs through [`Decoder`] and checks the best solution,
//! the statistics and the behavior under exhausted pools.

use crate::agenda::{Agenda, AgendaConfig};
use crate::cache::{CacheConfig, LinearCache};
use crate::grammar::{
    CodeDef, CodeKind, Grammar, GrammarBuilder, GrammarKind, Operator, SpecDef, UNRECOGNIZED,
};
use crate::session::Decoder;
use crate::unit::Terminal;
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// DIGIT followed by DIGIT, with an optional group marker in between.
fn digits(kind: GrammarKind) -> Arc<Grammar> {
    Arc::new(
        GrammarBuilder::new("digits", kind)
            .code(CodeDef::new("DIGIT").child(SpecDef::new(Operator::Next, "DIGIT").pre()))
            .code(CodeDef::new("AND").kind(CodeKind::GroupMarker))
            .denote(1, "DIGIT")
            .denote(2, "DIGIT")
            .denote(3, "AND")
            .build()
            .unwrap(),
    )
}

fn run(n: usize) -> Vec<Terminal> {
    (0..n).map(|pos| Terminal::new(1, pos, 1)).collect()
}

#[test]
fn test_digit_run_operational() {
    init_tracing();
    let decoder = Decoder::new(digits(GrammarKind::Operational));
    let decoded = decoder.decode(&run(3));
    let solution = decoded.solution.unwrap();
    assert_eq!(&*solution.name, "DIGIT");
    assert_eq!(solution.span, (0, 3));
    assert_eq!(solution.weight, 3);
    assert_eq!(solution.size(), 3);
}

#[test]
fn test_digit_run_positional() {
    let decoder = Decoder::new(digits(GrammarKind::Positional));
    let decoded = decoder.decode(&run(3));
    let solution = decoded.solution.unwrap();
    assert_eq!(solution.span, (0, 3));
    assert_eq!(solution.weight, 3);
    assert_eq!(decoded.stats.placeholders, 0);
}

#[test]
fn test_group_marker_between_digits() {
    let decoder = Decoder::new(digits(GrammarKind::Operational));
    let decoded = decoder.decode(&[
        Terminal::new(1, 0, 1),
        Terminal::new(2, 1, 1),
        Terminal::new(1, 2, 1),
    ]);
    let solution = decoded.solution.unwrap();
    assert_eq!(solution.span, (0, 3));
    assert_eq!(solution.weight, 1 + 1 + 1 + 5);
    assert_eq!(solution.logic_marker.as_deref(), Some("AND"));
    let left = solution.child(Operator::Next).unwrap();
    assert_eq!(left.span, (0, 1));
}

#[test]
fn test_implied_parent_scores_success_bonus() {
    let grammar = Arc::new(
        GrammarBuilder::new("phrases", GrammarKind::Operational)
            .code(CodeDef::new("MARK"))
            .code(CodeDef::new("PHRASE").child(SpecDef::new(Operator::HasAttr, "MARK").pre().implied()))
            .build()
            .unwrap(),
    );
    let decoded = Decoder::new(grammar).decode(&[Terminal::new(1, 5, 1)]);
    let solution = decoded.solution.unwrap();
    assert_eq!(&*solution.name, "PHRASE");
    assert_eq!(solution.weight, 1 + 5);
    assert_eq!(solution.span, (5, 6));
    assert_eq!(&*solution.child(Operator::HasAttr).unwrap().name, "MARK");
}

fn letters() -> Arc<Grammar> {
    let mut builder = GrammarBuilder::new("letters", GrammarKind::Operational);
    for c in 'a'..='c' {
        builder.add_code(CodeDef::new(c.to_string()));
    }
    Arc::new(builder.build().unwrap())
}

fn spell(letters: &Grammar, text: &str) -> Vec<Terminal> {
    text.chars()
        .enumerate()
        .map(|(i, ch)| Terminal::new(letters.lookup(&ch.to_string()).unwrap_or(UNRECOGNIZED), i, 1))
        .collect()
}

fn cached_decoder(config: AgendaConfig) -> (Arc<Grammar>, Decoder) {
    let letters = letters();
    let words = Arc::new(
        GrammarBuilder::new("words", GrammarKind::Operational)
            .code(CodeDef::new("X").sequence("abc", None))
            .code(CodeDef::new("Y").sequence("ab", None))
            .build()
            .unwrap(),
    );
    let mut cache =
        LinearCache::build_matrix(Arc::clone(&words), Arc::clone(&letters), CacheConfig::default()).unwrap();
    let l = Arc::clone(&letters);
    cache.populate_matrix(&move |s: &str| spell(&l, s));
    let decoder = Decoder::builder(words).config(config).cache(Arc::new(cache)).build();
    (letters, decoder)
}

#[test]
fn test_cached_sequence_skips_join_engine() {
    let (letters, decoder) = cached_decoder(AgendaConfig::default());
    let decoded = decoder.decode_cached(&spell(&letters, "abc")).unwrap();
    assert!(decoded.cached);
    let solution = decoded.solution.unwrap();
    assert_eq!(&*solution.name, "X");
    assert_eq!(solution.span, (0, 3));
    assert_eq!(solution.weight, 27);
    assert_eq!(decoded.stats.links, 0);
    assert_eq!(decoded.stats.join_attempts, 0);
    assert_eq!(decoded.stats.cache_hits, 1);
}

#[test]
fn test_partial_cache_hits_feed_the_engine() {
    let (letters, decoder) = cached_decoder(AgendaConfig::default());
    let decoded = decoder.decode_cached(&spell(&letters, "abcb")).unwrap();
    assert!(!decoded.cached);
    let solution = decoded.solution.unwrap();
    assert_eq!(&*solution.name, "X");
    assert_eq!(solution.span, (0, 3));
    assert_eq!(decoded.stats.cache_hits, 1);
    assert_eq!(decoded.stats.cache_misses, 3);
}

#[test]
fn test_cache_lookup_survives_unit_exhaustion() {
    let config = AgendaConfig {
        unit_capacity: 2,
        ..AgendaConfig::default()
    };
    let (letters, decoder) = cached_decoder(config);
    let decoded = decoder.decode_cached(&spell(&letters, "cababc")).unwrap();
    assert!(!decoded.cached);
    assert!(decoded.stats.pool_exhausted > 0);
    let solution = decoded.solution.unwrap();
    assert_eq!(&*solution.name, "Y");
    assert_eq!(solution.span, (1, 3));
}

#[test]
fn test_large_coverage_weights_saturate() {
    let config = AgendaConfig {
        input_window: 4000,
        ..AgendaConfig::default()
    };
    let decoder = Decoder::with_config(digits(GrammarKind::Operational), config);
    let decoded = decoder.decode(&[
        Terminal::new(1, 0, 1000),
        Terminal::new(1, 1000, 1000),
        Terminal::new(1, 2000, 1000),
    ]);
    let solution = decoded.solution.unwrap();
    assert_eq!(solution.span, (0, 3000));
    assert_eq!(solution.weight, i32::MAX);
}

#[test]
fn test_unit_pool_exhaustion_still_answers() {
    let config = AgendaConfig {
        unit_capacity: 2,
        ..AgendaConfig::default()
    };
    let decoder = Decoder::with_config(digits(GrammarKind::Operational), config);
    let decoded = decoder.decode(&run(5));
    assert!(decoded.stats.pool_exhausted > 0);
    let solution = decoded.solution.unwrap();
    assert_eq!(solution.span, (0, 1));
}

#[test]
fn test_complex_pool_exhaustion_still_answers() {
    let config = AgendaConfig {
        complex_capacity: 12,
        ..AgendaConfig::default()
    };
    let decoder = Decoder::with_config(digits(GrammarKind::Operational), config);
    let decoded = decoder.decode(&run(8));
    assert!(decoded.stats.complexes <= 12);
    assert!(decoded.stats.pool_exhausted > 0);
    assert!(decoded.solution.is_some());
}

#[test]
fn test_join_budget_stops_linking() {
    let decoder = Decoder::builder(digits(GrammarKind::Operational)).max_joins(1).build();
    let decoded = decoder.decode(&run(6));
    assert!(decoded.stats.budget_exhausted);
    assert!(decoded.solution.is_some());
}

#[test]
fn test_batch_matches_sequential() {
    let decoder = Decoder::new(digits(GrammarKind::Operational));
    let inputs: Vec<Vec<Terminal>> = (1..8).map(run).collect();
    let batch = decoder.decode_batch(&inputs);
    assert_eq!(batch.len(), inputs.len());
    for (input, decoded) in inputs.iter().zip(&batch) {
        assert_eq!(decoded, &decoder.decode(input));
    }
}

#[test]
fn test_update_from_subordinate_agenda() {
    let lower = letters();
    let mut sub = Agenda::new(Arc::clone(&lower));
    for (pos, concept) in [1, 2, 1].into_iter().enumerate() {
        sub.feed(&Terminal::new(concept, pos, 1)).unwrap();
    }

    let mut upper = Agenda::new(digits(GrammarKind::Operational));
    upper.update(&sub).unwrap();
    let solution = upper.solution().unwrap();
    assert_eq!(solution.span, (0, 3));
    assert_eq!(solution.weight, 3);
}

#[test]
fn test_denotational_update_only_translates() {
    let lower = letters();
    let mut sub = Agenda::new(Arc::clone(&lower));
    sub.feed(&Terminal::new(1, 0, 1)).unwrap();
    sub.feed(&Terminal::new(3, 1, 1)).unwrap();

    let upper_grammar = Arc::new(
        GrammarBuilder::new("translated", GrammarKind::Denotational)
            .code(CodeDef::new("NUM"))
            .denote(1, "NUM")
            .build()
            .unwrap(),
    );
    let mut upper = Agenda::new(upper_grammar);
    upper.update(&sub).unwrap();
    assert_eq!(upper.stats().links, 0);
    assert_eq!(upper.unit(upper.units_at(0)[0]).code(), Some(1));
    assert!(!upper.unit(upper.units_at(1)[0]).is_recognized());
}
