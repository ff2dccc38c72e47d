//! Immutable grammar model: codes, operator specs and their inverses.
//!
//! A grammar is assembled once through [`GrammarBuilder`], which interns code
//! names to dense ids, resolves every by-name reference and precomputes the
//! parent lists (the inverse of each code's child specs) so that the join
//! engine can go from a child code to all of its possible parents in O(1).
//! After [`GrammarBuilder::build`] the grammar is never mutated and is shared
//! between sessions behind an `Arc`.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Dense code identifier. Id 0 is reserved for "unrecognized".
pub type CodeId = u32;

/// The id carried by terminals nothing in the grammar recognized.
pub const UNRECOGNIZED: CodeId = 0;

/// Upper bound on the number of codes in one grammar.
pub const MAX_CODES: usize = 1 << 24;

/// Adaptation context attached to a cached sequence match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

/// Relation kinds a code can hold one child complex for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    IsSubclass,
    Aggregates,
    HasAttr,
    TakesArg,
    Denotes,
    Runs,
    /// Plain sequencing between peers.
    Next,
}

impl Operator {
    pub const COUNT: usize = 7;

    pub const ALL: [Operator; Operator::COUNT] = [
        Operator::IsSubclass,
        Operator::Aggregates,
        Operator::HasAttr,
        Operator::TakesArg,
        Operator::Denotes,
        Operator::Runs,
        Operator::Next,
    ];

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn is_sequencing(self) -> bool {
        self == Operator::Next
    }

    pub fn name(self) -> &'static str {
        match self {
            Operator::IsSubclass => "is_subclass",
            Operator::Aggregates => "aggregates",
            Operator::HasAttr => "has_attr",
            Operator::TakesArg => "takes_arg",
            Operator::Denotes => "denotes",
            Operator::Runs => "runs",
            Operator::Next => "next",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a child must sit relative to its parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LinearOrder {
    #[default]
    Any,
    /// The child strictly precedes the parent.
    Pre,
    /// The child follows the parent.
    Post,
}

impl LinearOrder {
    /// The same constraint seen from the other end of the relation.
    pub fn reversed(self) -> Self {
        match self {
            LinearOrder::Any => LinearOrder::Any,
            LinearOrder::Pre => LinearOrder::Post,
            LinearOrder::Post => LinearOrder::Pre,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CodeKind {
    #[default]
    Ordinary,
    Separator,
    GroupMarker,
    AlternationMarker,
}

impl CodeKind {
    pub fn is_marker(self) -> bool {
        matches!(self, CodeKind::GroupMarker | CodeKind::AlternationMarker)
    }
}

/// How a grammar consumes the units of a subordinate producer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GrammarKind {
    /// Translates concept ids through the denotation table.
    Denotational,
    /// General join engine over operator slots.
    #[default]
    Operational,
    /// Pure left-to-right chaining.
    Positional,
}

/// One resolved relation between two codes.
///
/// In a code's child list `target` is the child code; in its parent list it
/// is the parent code and `linear_order` is seen from the child's side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeSpec {
    pub operator: Operator,
    pub target: CodeId,
    pub linear_order: LinearOrder,
    pub linear_contact: bool,
    pub stackable: bool,
    pub implied_parent: bool,
}

/// A semantic reading bound when the owning code fills `operator` of a
/// parent whose code is named `arg_code`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Derivation {
    pub arg_code: Arc<str>,
    pub concept: Arc<str>,
    pub code: Option<CodeId>,
}

/// A rigid multi-level composition: `code` binds `child` under an operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Composite {
    pub code: CodeId,
    pub child: Option<(Operator, Box<Composite>)>,
}

impl Composite {
    /// Number of levels in the chain.
    pub fn depth(&self) -> usize {
        1 + self.child.as_ref().map_or(0, |(_, c)| c.depth())
    }
}

/// A typed grammar symbol.
#[derive(Clone, Debug)]
pub struct Code {
    pub id: CodeId,
    pub name: Arc<str>,
    pub kind: CodeKind,
    pub baseclass: Option<CodeId>,
    pub verification_level: u32,
    pub usages: Vec<Arc<str>>,
    pub composite: Option<Composite>,
    pub sequences: Vec<(Arc<str>, Option<ContextId>)>,
    children: [Vec<CodeSpec>; Operator::COUNT],
    parents: [Vec<CodeSpec>; Operator::COUNT],
    derivations: [Vec<Derivation>; Operator::COUNT],
}

impl Code {
    fn new(id: CodeId, name: Arc<str>) -> Self {
        Code {
            id,
            name,
            kind: CodeKind::Ordinary,
            baseclass: None,
            verification_level: 0,
            usages: Vec::new(),
            composite: None,
            sequences: Vec::new(),
            children: Default::default(),
            parents: Default::default(),
            derivations: Default::default(),
        }
    }

    #[inline]
    pub fn children(&self, op: Operator) -> &[CodeSpec] {
        &self.children[op.index()]
    }

    #[inline]
    pub fn parents(&self, op: Operator) -> &[CodeSpec] {
        &self.parents[op.index()]
    }

    #[inline]
    pub fn derivations(&self, op: Operator) -> &[Derivation] {
        &self.derivations[op.index()]
    }

    pub fn has_children(&self) -> bool {
        self.children.iter().any(|specs| !specs.is_empty())
    }

    /// The first `IsSubclass` child names the superclass.
    pub fn superclass(&self) -> Option<CodeId> {
        self.children(Operator::IsSubclass).first().map(|s| s.target)
    }

    /// Concept-index bucket: the baseclass id if present.
    #[inline]
    pub fn bucket(&self) -> CodeId {
        self.baseclass.unwrap_or(self.id)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("code '{name}' is defined more than once")]
    DuplicateCode { name: String },

    #[error("grammar exceeds {limit} codes")]
    TooManyCodes { limit: usize },

    #[error("unknown code '{name}'")]
    UnknownCode { name: String },
}

pub type GrammarResult<T> = Result<T, GrammarError>;

/// Resolved, immutable grammar.
#[derive(Debug)]
pub struct Grammar {
    name: Arc<str>,
    kind: GrammarKind,
    codes: Vec<Code>,
    by_name: FxHashMap<Arc<str>, CodeId>,
    denotations: FxHashMap<CodeId, Vec<CodeId>>,
    unresolved: Vec<String>,
}

impl Grammar {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> GrammarKind {
        self.kind
    }

    /// Number of code ids, including the reserved id 0.
    pub fn num_codes(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn code(&self, id: CodeId) -> Option<&Code> {
        self.codes.get(id as usize)
    }

    /// All real codes, in id order.
    pub fn codes(&self) -> impl Iterator<Item = &Code> {
        self.codes.iter().skip(1)
    }

    pub fn lookup(&self, name: &str) -> Option<CodeId> {
        self.by_name.get(name).copied()
    }

    pub fn resolve(&self, name: &str) -> GrammarResult<CodeId> {
        self.lookup(name).ok_or_else(|| GrammarError::UnknownCode {
            name: name.to_string(),
        })
    }

    pub fn code_name(&self, id: CodeId) -> &str {
        self.code(id).map_or("<unknown>", |c| &c.name)
    }

    /// Codes of this grammar that a subordinate concept id denotes.
    pub fn denotations(&self, concept: CodeId) -> &[CodeId] {
        self.denotations
            .get(&concept)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// References dropped during resolution, one line each.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    /// Concept-index bucket of a code.
    pub fn bucket_of(&self, id: CodeId) -> CodeId {
        self.code(id).map_or(id, Code::bucket)
    }

    /// The code followed by its superclass chain.
    pub fn lineage(&self, id: CodeId) -> Vec<CodeId> {
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            if chain.contains(&c) || chain.len() >= self.codes.len() {
                break;
            }
            chain.push(c);
            cur = self.code(c).and_then(Code::superclass);
        }
        chain
    }

    /// Whether `id` is `ancestor` or inherits from it.
    pub fn is_a(&self, id: CodeId, ancestor: CodeId) -> bool {
        if id == ancestor {
            return true;
        }
        if self.code(id).and_then(|c| c.baseclass) == Some(ancestor) {
            return true;
        }
        self.lineage(id).contains(&ancestor)
    }

    /// The spec under which `parent` accepts `child` at `op`.
    pub fn child_spec(&self, parent: CodeId, op: Operator, child: CodeId) -> Option<&CodeSpec> {
        let code = self.code(parent)?;
        let specs = code.children(op);
        specs
            .iter()
            .find(|s| s.target == child)
            .or_else(|| specs.iter().find(|s| self.is_a(child, s.target)))
    }

    /// Declared atomic sequences with the code they stand for.
    pub fn sequences(&self) -> impl Iterator<Item = (CodeId, &str, Option<ContextId>)> {
        self.codes().flat_map(|code| {
            code.sequences
                .iter()
                .map(move |(seq, ctx)| (code.id, seq.as_ref(), *ctx))
        })
    }
}

/// Unresolved child relation of a [`CodeDef`].
#[derive(Clone, Debug)]
pub struct SpecDef {
    pub operator: Operator,
    pub target: String,
    pub linear_order: LinearOrder,
    pub linear_contact: bool,
    pub stackable: bool,
    pub implied_parent: bool,
}

impl SpecDef {
    pub fn new(operator: Operator, target: impl Into<String>) -> Self {
        SpecDef {
            operator,
            target: target.into(),
            linear_order: LinearOrder::Any,
            linear_contact: false,
            stackable: false,
            implied_parent: false,
        }
    }

    pub fn pre(mut self) -> Self {
        self.linear_order = LinearOrder::Pre;
        self
    }

    pub fn post(mut self) -> Self {
        self.linear_order = LinearOrder::Post;
        self
    }

    pub fn contact(mut self) -> Self {
        self.linear_contact = true;
        self
    }

    pub fn stackable(mut self) -> Self {
        self.stackable = true;
        self
    }

    pub fn implied(mut self) -> Self {
        self.implied_parent = true;
        self
    }
}

#[derive(Clone, Debug)]
pub struct DerivationDef {
    pub operator: Operator,
    pub arg_code: String,
    pub concept: String,
    pub code: Option<String>,
}

impl DerivationDef {
    pub fn new(operator: Operator, arg_code: impl Into<String>, concept: impl Into<String>) -> Self {
        DerivationDef {
            operator,
            arg_code: arg_code.into(),
            concept: concept.into(),
            code: None,
        }
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct CompositeDef {
    pub code: String,
    pub child: Option<(Operator, Box<CompositeDef>)>,
}

impl CompositeDef {
    pub fn new(code: impl Into<String>) -> Self {
        CompositeDef {
            code: code.into(),
            child: None,
        }
    }

    pub fn with_child(mut self, op: Operator, child: CompositeDef) -> Self {
        self.child = Some((op, Box::new(child)));
        self
    }
}

/// A code as declared, with references by name.
#[derive(Clone, Debug)]
pub struct CodeDef {
    pub name: String,
    pub kind: CodeKind,
    pub baseclass: Option<String>,
    pub verification_level: u32,
    pub usages: Vec<String>,
    pub children: Vec<SpecDef>,
    pub derivations: Vec<DerivationDef>,
    pub composite: Option<CompositeDef>,
    pub sequences: Vec<(String, Option<ContextId>)>,
}

impl CodeDef {
    pub fn new(name: impl Into<String>) -> Self {
        CodeDef {
            name: name.into(),
            kind: CodeKind::Ordinary,
            baseclass: None,
            verification_level: 0,
            usages: Vec::new(),
            children: Vec::new(),
            derivations: Vec::new(),
            composite: None,
            sequences: Vec::new(),
        }
    }

    pub fn kind(mut self, kind: CodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn baseclass(mut self, name: impl Into<String>) -> Self {
        self.baseclass = Some(name.into());
        self
    }

    pub fn verified(mut self, level: u32) -> Self {
        self.verification_level = level;
        self
    }

    pub fn usage(mut self, concept: impl Into<String>) -> Self {
        self.usages.push(concept.into());
        self
    }

    pub fn child(mut self, spec: SpecDef) -> Self {
        self.children.push(spec);
        self
    }

    pub fn derivation(mut self, deriv: DerivationDef) -> Self {
        self.derivations.push(deriv);
        self
    }

    pub fn composite(mut self, composite: CompositeDef) -> Self {
        self.composite = Some(composite);
        self
    }

    pub fn sequence(mut self, seq: impl Into<String>, context: Option<ContextId>) -> Self {
        self.sequences.push((seq.into(), context));
        self
    }
}

/// Collects code definitions and resolves them into a [`Grammar`].
#[derive(Clone, Debug)]
pub struct GrammarBuilder {
    name: String,
    kind: GrammarKind,
    defs: Vec<CodeDef>,
    denotations: Vec<(CodeId, String)>,
}

impl GrammarBuilder {
    pub fn new(name: impl Into<String>, kind: GrammarKind) -> Self {
        GrammarBuilder {
            name: name.into(),
            kind,
            defs: Vec::new(),
            denotations: Vec::new(),
        }
    }

    pub fn code(mut self, def: CodeDef) -> Self {
        self.defs.push(def);
        self
    }

    pub fn add_code(&mut self, def: CodeDef) -> &mut Self {
        self.defs.push(def);
        self
    }

    /// Map a subordinate grammar's concept id to one of our codes.
    pub fn denote(mut self, concept: CodeId, code: impl Into<String>) -> Self {
        self.denotations.push((concept, code.into()));
        self
    }

    /// Intern names, resolve references and derive parent lists.
    ///
    /// References to absent codes are dropped and listed in
    /// [`Grammar::unresolved`]; only structural problems fail the build.
    pub fn build(self) -> GrammarResult<Grammar> {
        if self.defs.len() + 1 > MAX_CODES {
            return Err(GrammarError::TooManyCodes { limit: MAX_CODES });
        }

        let mut by_name: FxHashMap<Arc<str>, CodeId> = FxHashMap::default();
        let mut codes = Vec::with_capacity(self.defs.len() + 1);
        codes.push(Code::new(UNRECOGNIZED, Arc::from("<unrecognized>")));

        for def in &self.defs {
            let name: Arc<str> = Arc::from(def.name.as_str());
            if by_name.contains_key(&name) {
                return Err(GrammarError::DuplicateCode {
                    name: def.name.clone(),
                });
            }
            let id = codes.len() as CodeId;
            by_name.insert(Arc::clone(&name), id);
            codes.push(Code::new(id, name));
        }

        let mut unresolved = Vec::new();
        let mut resolve = |owner: &str, what: &str, name: &str| -> Option<CodeId> {
            let found = by_name.get(name).copied();
            if found.is_none() {
                warn!(code = owner, reference = name, what, "unresolved grammar reference");
                unresolved.push(format!("{owner}: {what} '{name}'"));
            }
            found
        };

        for (i, def) in self.defs.iter().enumerate() {
            let id = i + 1;
            let baseclass = def
                .baseclass
                .as_deref()
                .and_then(|b| resolve(&def.name, "baseclass", b));

            let mut children: [Vec<CodeSpec>; Operator::COUNT] = Default::default();
            for spec in &def.children {
                if let Some(target) = resolve(&def.name, "child", &spec.target) {
                    children[spec.operator.index()].push(CodeSpec {
                        operator: spec.operator,
                        target,
                        linear_order: spec.linear_order,
                        linear_contact: spec.linear_contact,
                        stackable: spec.stackable,
                        implied_parent: spec.implied_parent,
                    });
                }
            }

            let mut derivations: [Vec<Derivation>; Operator::COUNT] = Default::default();
            for d in &def.derivations {
                let code = match &d.code {
                    Some(name) => match resolve(&def.name, "derivation", name) {
                        Some(c) => Some(c),
                        None => continue,
                    },
                    None => None,
                };
                derivations[d.operator.index()].push(Derivation {
                    arg_code: Arc::from(d.arg_code.as_str()),
                    concept: Arc::from(d.concept.as_str()),
                    code,
                });
            }

            let composite = def
                .composite
                .as_ref()
                .and_then(|c| resolve_composite(c, &def.name, &mut resolve));

            let code = &mut codes[id];
            code.kind = def.kind;
            code.baseclass = baseclass;
            code.verification_level = def.verification_level;
            code.usages = def.usages.iter().map(|u| Arc::from(u.as_str())).collect();
            code.children = children;
            code.derivations = derivations;
            code.composite = composite;
            code.sequences = def
                .sequences
                .iter()
                .map(|(s, ctx)| (Arc::from(s.as_str()), *ctx))
                .collect();
        }

        let mut denotations: FxHashMap<CodeId, Vec<CodeId>> = FxHashMap::default();
        for (concept, name) in &self.denotations {
            if let Some(code) = resolve(&self.name, "denotation", name) {
                denotations.entry(*concept).or_default().push(code);
            }
        }

        // Inverse relations, seen from the child.
        for parent in 0..codes.len() {
            for op in Operator::ALL {
                for i in 0..codes[parent].children[op.index()].len() {
                    let spec = codes[parent].children[op.index()][i].clone();
                    codes[spec.target as usize].parents[op.index()].push(CodeSpec {
                        target: parent as CodeId,
                        linear_order: spec.linear_order.reversed(),
                        ..spec
                    });
                }
            }
        }

        Ok(Grammar {
            name: Arc::from(self.name.as_str()),
            kind: self.kind,
            codes,
            by_name,
            denotations,
            unresolved,
        })
    }
}

fn resolve_composite(
    def: &CompositeDef,
    owner: &str,
    resolve: &mut impl FnMut(&str, &str, &str) -> Option<CodeId>,
) -> Option<Composite> {
    let code = resolve(owner, "composite", &def.code)?;
    let child = match &def.child {
        Some((op, child)) => Some((*op, Box::new(resolve_composite(child, owner, resolve)?))),
        None => None,
    };
    Some(Composite { code, child })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrase_grammar() -> Grammar {
        GrammarBuilder::new("test", GrammarKind::Operational)
            .code(CodeDef::new("MARK"))
            .code(CodeDef::new("PHRASE").child(SpecDef::new(Operator::HasAttr, "MARK").pre()))
            .code(
                CodeDef::new("NOUN")
                    .child(SpecDef::new(Operator::IsSubclass, "WORD"))
                    .child(SpecDef::new(Operator::Next, "NOUN").post().stackable()),
            )
            .code(CodeDef::new("WORD"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_ids_are_dense() {
        let g = phrase_grammar();
        assert_eq!(g.num_codes(), 5);
        assert_eq!(g.lookup("MARK"), Some(1));
        assert_eq!(g.lookup("WORD"), Some(4));
        assert_eq!(g.code(UNRECOGNIZED).unwrap().name.as_ref(), "<unrecognized>");
        assert_eq!(g.codes().count(), 4);
    }

    #[test]
    fn test_parents_are_derived_reversed() {
        let g = phrase_grammar();
        let mark = g.code(1).unwrap();
        let parents = mark.parents(Operator::HasAttr);
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].target, g.lookup("PHRASE").unwrap());
        assert_eq!(parents[0].linear_order, LinearOrder::Post);

        let noun = g.code(g.lookup("NOUN").unwrap()).unwrap();
        let seq = noun.parents(Operator::Next);
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].linear_order, LinearOrder::Pre);
        assert!(seq[0].stackable);
    }

    #[test]
    fn test_superclass_and_lineage() {
        let g = phrase_grammar();
        let noun = g.lookup("NOUN").unwrap();
        let word = g.lookup("WORD").unwrap();
        assert_eq!(g.code(noun).unwrap().superclass(), Some(word));
        assert_eq!(g.lineage(noun), vec![noun, word]);
        assert!(g.is_a(noun, word));
        assert!(!g.is_a(word, noun));
    }

    #[test]
    fn test_child_spec_through_superclass() {
        let g = GrammarBuilder::new("t", GrammarKind::Operational)
            .code(CodeDef::new("ANIMAL"))
            .code(CodeDef::new("DOG").child(SpecDef::new(Operator::IsSubclass, "ANIMAL")))
            .code(CodeDef::new("FEED").child(SpecDef::new(Operator::TakesArg, "ANIMAL").post()))
            .build()
            .unwrap();
        let feed = g.lookup("FEED").unwrap();
        let dog = g.lookup("DOG").unwrap();
        let spec = g.child_spec(feed, Operator::TakesArg, dog).unwrap();
        assert_eq!(spec.target, g.lookup("ANIMAL").unwrap());
        assert!(g.child_spec(feed, Operator::HasAttr, dog).is_none());
    }

    #[test]
    fn test_unresolved_references_are_dropped() {
        let g = GrammarBuilder::new("t", GrammarKind::Operational)
            .code(
                CodeDef::new("A")
                    .baseclass("MISSING")
                    .child(SpecDef::new(Operator::HasAttr, "GHOST"))
                    .derivation(DerivationDef::new(Operator::HasAttr, "B", "x").code("NOPE")),
            )
            .denote(7, "ALSO_MISSING")
            .build()
            .unwrap();
        let a = g.code(1).unwrap();
        assert!(a.baseclass.is_none());
        assert!(!a.has_children());
        assert!(a.derivations(Operator::HasAttr).is_empty());
        assert_eq!(g.unresolved().len(), 4);
        assert!(g.denotations(7).is_empty());
    }

    #[test]
    fn test_duplicate_code_fails() {
        let err = GrammarBuilder::new("t", GrammarKind::Operational)
            .code(CodeDef::new("A"))
            .code(CodeDef::new("A"))
            .build()
            .unwrap_err();
        assert_eq!(err, GrammarError::DuplicateCode { name: "A".into() });
    }

    #[test]
    fn test_bucket_uses_baseclass() {
        let g = GrammarBuilder::new("t", GrammarKind::Operational)
            .code(CodeDef::new("BASE"))
            .code(CodeDef::new("LEAF").baseclass("BASE"))
            .build()
            .unwrap();
        assert_eq!(g.bucket_of(2), 1);
        assert_eq!(g.bucket_of(1), 1);
        assert!(g.is_a(2, 1));
    }

    #[test]
    fn test_composite_and_sequences() {
        let g = GrammarBuilder::new("t", GrammarKind::Operational)
            .code(CodeDef::new("INNER"))
            .code(
                CodeDef::new("OUTER")
                    .composite(
                        CompositeDef::new("OUTER")
                            .with_child(Operator::HasAttr, CompositeDef::new("INNER")),
                    )
                    .sequence("abc", Some(ContextId(3))),
            )
            .denote(11, "OUTER")
            .build()
            .unwrap();
        let outer = g.code(2).unwrap();
        assert_eq!(outer.composite.as_ref().map(Composite::depth), Some(2));
        let seqs: Vec<_> = g.sequences().collect();
        assert_eq!(seqs, vec![(2, "abc", Some(ContextId(3)))]);
        assert_eq!(g.denotations(11), &[2]);
        assert_eq!(g.resolve("nope").unwrap_err(), GrammarError::UnknownCode { name: "nope".into() });
    }
}
