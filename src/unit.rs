//! Concept units: instances of a code at a linear span.

use crate::agenda::{Agenda, AgendaResult};
use crate::complex::{Complex, ComplexId, Interp};
use crate::grammar::{CodeId, ContextId, Operator, UNRECOGNIZED};
use crate::linear::Span;

/// Index of a unit in the agenda's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u32);

impl UnitId {
    #[inline(always)]
    pub fn new(index: u32) -> Self {
        UnitId(index)
    }

    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A terminal record from the producer feeding an agenda.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Terminal {
    /// Concept id in the producer's grammar; 0 means unrecognized.
    pub concept: CodeId,
    pub position: usize,
    pub coverage: usize,
    /// Sparse terminals are weighted linearly in their coverage.
    pub sparse: bool,
    pub context: Option<ContextId>,
}

impl Terminal {
    pub fn new(concept: CodeId, position: usize, coverage: usize) -> Self {
        Terminal {
            concept,
            position,
            coverage,
            sparse: false,
            context: None,
        }
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    pub fn with_context(mut self, context: ContextId) -> Self {
        self.context = Some(context);
        self
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.position + self.coverage
    }
}

#[derive(Clone, Debug)]
pub struct ConcUnit {
    pub(crate) concept: CodeId,
    pub(crate) code: Option<CodeId>,
    pub(crate) position: usize,
    pub(crate) coverage: usize,
    pub(crate) is_present: bool,
    pub(crate) is_aggregate: bool,
    pub(crate) registered: bool,
    pub(crate) terminal: Option<Terminal>,
    pub(crate) fixed_parent: Option<(UnitId, Operator)>,
    pub(crate) complexes: Vec<ComplexId>,
    pub(crate) top_complexes: Vec<ComplexId>,
}

impl ConcUnit {
    pub(crate) fn blank() -> Self {
        ConcUnit {
            concept: UNRECOGNIZED,
            code: None,
            position: 0,
            coverage: 0,
            is_present: false,
            is_aggregate: false,
            registered: false,
            terminal: None,
            fixed_parent: None,
            complexes: Vec::new(),
            top_complexes: Vec::new(),
        }
    }

    pub fn concept(&self) -> CodeId {
        self.concept
    }

    /// The code, or `None` for unrecognized units.
    pub fn code(&self) -> Option<CodeId> {
        self.code
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn coverage(&self) -> usize {
        self.coverage
    }

    pub fn end(&self) -> usize {
        self.position + self.coverage
    }

    pub fn span(&self) -> Span {
        (self.position, self.end())
    }

    /// False for placeholders predicted while searching for a child.
    pub fn is_present(&self) -> bool {
        self.is_present
    }

    pub fn is_aggregate(&self) -> bool {
        self.is_aggregate
    }

    pub fn is_recognized(&self) -> bool {
        self.code.is_some_and(|c| c != UNRECOGNIZED)
    }

    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    pub fn fixed_parent(&self) -> Option<(UnitId, Operator)> {
        self.fixed_parent
    }

    /// Candidate pool, best first.
    pub fn complexes(&self) -> &[ComplexId] {
        &self.complexes
    }

    /// The unit seen as a terminal of the next grammar up.
    pub fn as_terminal(&self) -> Terminal {
        Terminal {
            concept: self.concept,
            position: self.position,
            coverage: self.coverage,
            sparse: self.terminal.is_some_and(|t| t.sparse),
            context: self.terminal.and_then(|t| t.context),
        }
    }
}

impl Agenda {
    /// Populate a freshly allocated unit from a terminal record.
    ///
    /// Recognized units receive one terminal complex owning exactly the
    /// terminal span, weighted by coverage and verification level, carrying
    /// the code's declared usages as interpretations.
    pub fn make_instance(
        &mut self,
        unit: UnitId,
        code: Option<CodeId>,
        terminal: &Terminal,
    ) -> AgendaResult<()> {
        let code = code.filter(|&c| c != UNRECOGNIZED);
        {
            let u = &mut self.units[unit.index()];
            u.concept = code.unwrap_or(UNRECOGNIZED);
            u.code = code;
            u.position = terminal.position;
            u.coverage = terminal.coverage;
            u.terminal = Some(*terminal);
            u.complexes.clear();
        }
        let Some(code) = code else {
            return Ok(());
        };
        let Some(def) = self.grammar.code(code) else {
            return Ok(());
        };

        let weight = self.config.scoring.terminal_weight(
            terminal.coverage,
            terminal.sparse,
            def.verification_level,
        );
        let id = self.next_complex_id();
        let mut complex = Complex::terminal(unit, id, weight, (terminal.position, terminal.end()));
        complex.interps = def
            .usages
            .iter()
            .take(self.config.interp_capacity)
            .map(|concept| Interp {
                concept: concept.clone(),
                code: Some(code),
                operator: None,
            })
            .collect();
        let id = self.alloc_complex(complex)?;
        self.units[unit.index()].complexes.push(id);
        Ok(())
    }
}
