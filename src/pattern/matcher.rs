//! Bounded-error backtracking matcher.
//!
//! The search is leftmost: candidate start positions are tried in order and
//! the first one at which the whole pattern succeeds wins. At each start the
//! exact reading of every item is tried before any error is spent, so an
//! exact match always beats a fuzzy one at the same start.
//!
//! Inside a fuzzy region each single-byte item may additionally be matched
//! with a substitution (consume a mismatching byte), an insertion (skip an
//! extra sequence byte before the item) or a deletion (skip the item without
//! consuming). Every error is charged against all enclosing budgets.
//!
//! A pattern is compiled to a small instruction program. The search runs it
//! with an explicit stack of pending alternatives and records every
//! `(instruction, position, budgets)` state it has entered. A state that is
//! reached again has already failed, so each one is explored at most once
//! across all start positions and the stack depth never depends on the
//! length of the read.

use std::collections::HashMap;
use std::ops::Range;

use serde::Serialize;

use super::parser::{parse, ByteSet, FuzzyLimits, Node};
use super::{expand_iupac, PatternError};

/// A named capture group and the error budget that governs it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub name: String,
    /// Position among the named groups, left to right
    pub index: usize,
    /// Budget declared on the group or within it, if any
    pub error_budget: Option<FuzzyLimits>,
}

/// A compiled read-layout pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    program: Vec<Inst>,
    segments: Vec<Segment>,
}

/// Spans of one successful search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Span of the whole match
    pub span: Range<usize>,
    /// Span of each named group in segment order; `None` if the group did
    /// not take part in the match
    pub groups: Vec<Option<Range<usize>>>,
}

impl PatternMatch {
    /// Span of the named group at `index`
    #[must_use]
    pub fn group(&self, index: usize) -> Option<Range<usize>> {
        self.groups.get(index).cloned().flatten()
    }
}

impl Pattern {
    /// Compile a pattern as written.
    ///
    /// # Errors
    ///
    /// Returns a `PatternError` if the pattern is malformed or a group name
    /// is repeated.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let parsed = parse(pattern)?;

        let mut budgets = vec![None; parsed.capture_names.len()];
        collect_budgets(&parsed.root, None, &mut budgets);

        let mut compiler = Compiler::default();
        compiler.compile(&parsed.root);
        compiler.emit(Inst::Match);

        let segments = parsed
            .capture_names
            .into_iter()
            .zip(budgets)
            .enumerate()
            .map(|(index, (name, error_budget))| Segment {
                name,
                index,
                error_budget,
            })
            .collect();

        Ok(Self {
            source: pattern.to_string(),
            program: compiler.program,
            segments,
        })
    }

    /// Expand ambiguous nucleotide codes, then compile.
    ///
    /// # Errors
    ///
    /// Same as [`Pattern::compile`].
    pub fn compile_iupac(pattern: &str) -> Result<Self, PatternError> {
        Self::compile(&expand_iupac(pattern))
    }

    /// Pattern text this was compiled from
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Named groups in order of appearance
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Leftmost match of the pattern anywhere in `text`
    #[must_use]
    pub fn search(&self, text: &[u8]) -> Option<PatternMatch> {
        let mut matcher = Matcher::new(&self.program, text, self.segments.len());

        (0..=text.len()).find_map(|start| {
            let end = matcher.run(start)?;
            Some(PatternMatch {
                span: start..end,
                groups: matcher
                    .slots
                    .chunks(2)
                    .map(|pair| match pair {
                        [Some(s), Some(e)] => Some(*s..*e),
                        _ => None,
                    })
                    .collect(),
            })
        })
    }

    #[must_use]
    pub fn is_match(&self, text: &[u8]) -> bool {
        self.search(text).is_some()
    }
}

/// Record for every named group the nearest budget that wraps it, or failing
/// that the first budget nested inside it.
fn collect_budgets(
    node: &Node,
    enclosing: Option<FuzzyLimits>,
    budgets: &mut [Option<FuzzyLimits>],
) {
    match node {
        Node::Group { capture, node } => {
            if let Some(i) = capture {
                budgets[*i] = enclosing.or_else(|| first_budget(node));
            }
            collect_budgets(node, enclosing, budgets);
        }
        Node::Fuzzy { node, limits } => collect_budgets(node, Some(*limits), budgets),
        Node::Repeat { node, .. } => collect_budgets(node, enclosing, budgets),
        Node::Concat(nodes) | Node::Alternate(nodes) => {
            for n in nodes {
                collect_budgets(n, enclosing, budgets);
            }
        }
        _ => {}
    }
}

fn first_budget(node: &Node) -> Option<FuzzyLimits> {
    match node {
        Node::Fuzzy { limits, .. } => Some(*limits),
        Node::Group { node, .. } | Node::Repeat { node, .. } => first_budget(node),
        Node::Concat(nodes) | Node::Alternate(nodes) => nodes.iter().find_map(first_budget),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
enum Inst {
    /// Consume one byte of the set
    Byte(ByteSet),
    /// Head of a greedy repetition of a single-byte item. The item itself
    /// follows as a `Byte`, then a jump back here; those two are entered only
    /// when the repetition spends errors.
    Loop { set: ByteSet, exit: usize },
    Start,
    End,
    /// Try the first target, then the second
    Split(usize, usize),
    Jump(usize),
    /// Record the current position in a capture slot
    Save(usize),
    PushBudget(FuzzyLimits),
    PopBudget,
    Match,
}

#[derive(Default)]
struct Compiler {
    program: Vec<Inst>,
}

impl Compiler {
    fn emit(&mut self, inst: Inst) -> usize {
        self.program.push(inst);
        self.program.len() - 1
    }

    fn compile(&mut self, node: &Node) {
        match node {
            Node::Empty => {}
            Node::Literal(_) | Node::Class(_) | Node::Any => {
                if let Some(set) = node.single_byte() {
                    self.emit(Inst::Byte(set));
                }
            }
            Node::Start => {
                self.emit(Inst::Start);
            }
            Node::End => {
                self.emit(Inst::End);
            }
            Node::Concat(nodes) => nodes.iter().for_each(|n| self.compile(n)),
            Node::Alternate(branches) => self.alternate(branches),
            Node::Group { capture, node } => match capture {
                Some(i) => {
                    self.emit(Inst::Save(2 * i));
                    self.compile(node);
                    self.emit(Inst::Save(2 * i + 1));
                }
                None => self.compile(node),
            },
            Node::Repeat {
                node,
                min,
                max,
                greedy,
            } => self.repeat(node, *min, *max, *greedy),
            Node::Fuzzy { node, limits } => {
                self.emit(Inst::PushBudget(*limits));
                self.compile(node);
                self.emit(Inst::PopBudget);
            }
        }
    }

    fn alternate(&mut self, branches: &[Node]) {
        let mut jumps = Vec::new();
        if let Some((last, rest)) = branches.split_last() {
            for branch in rest {
                let split = self.emit(Inst::Split(0, 0));
                self.compile(branch);
                jumps.push(self.emit(Inst::Jump(0)));
                self.program[split] = Inst::Split(split + 1, self.program.len());
            }
            self.compile(last);
        }

        let end = self.program.len();
        for jump in jumps {
            self.program[jump] = Inst::Jump(end);
        }
    }

    fn repeat(&mut self, node: &Node, min: usize, max: Option<usize>, greedy: bool) {
        for _ in 0..min {
            self.compile(node);
        }

        let Some(max) = max else {
            self.star(node, greedy);
            return;
        };

        let mut splits = Vec::new();
        for _ in min..max {
            splits.push(self.emit(Inst::Split(0, 0)));
            self.compile(node);
        }
        let end = self.program.len();
        for split in splits {
            self.program[split] = choice(split + 1, end, greedy);
        }
    }

    fn star(&mut self, node: &Node, greedy: bool) {
        let head = self.program.len();
        match node.single_byte() {
            Some(set) if greedy => {
                self.emit(Inst::Loop { set, exit: 0 });
                self.emit(Inst::Byte(set));
                self.emit(Inst::Jump(head));
                self.program[head] = Inst::Loop {
                    set,
                    exit: self.program.len(),
                };
            }
            _ => {
                self.emit(Inst::Split(0, 0));
                self.compile(node);
                self.emit(Inst::Jump(head));
                self.program[head] = choice(head + 1, self.program.len(), greedy);
            }
        }
    }
}

fn choice(body: usize, skip: usize, greedy: bool) -> Inst {
    if greedy {
        Inst::Split(body, skip)
    } else {
        Inst::Split(skip, body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ErrorKind {
    Substitution,
    Insertion,
    Deletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Budget {
    limits: FuzzyLimits,
    substitutions: usize,
    insertions: usize,
    deletions: usize,
}

impl Budget {
    fn new(limits: FuzzyLimits) -> Self {
        Self {
            limits,
            substitutions: 0,
            insertions: 0,
            deletions: 0,
        }
    }

    fn allows(&self, kind: ErrorKind) -> bool {
        let total = self.substitutions + self.insertions + self.deletions;
        if total >= self.limits.max_total() {
            return false;
        }
        match kind {
            ErrorKind::Substitution => self.substitutions < self.limits.max_substitutions(),
            ErrorKind::Insertion => self.insertions < self.limits.max_insertions(),
            ErrorKind::Deletion => self.deletions < self.limits.max_deletions(),
        }
    }

    fn counter(&mut self, kind: ErrorKind) -> &mut usize {
        match kind {
            ErrorKind::Substitution => &mut self.substitutions,
            ErrorKind::Insertion => &mut self.insertions,
            ErrorKind::Deletion => &mut self.deletions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Transition {
    Charge(ErrorKind),
    Push(FuzzyLimits),
    Pop,
}

/// Interned stacks of active budgets. Matcher states carry an id, so
/// backtracking never has to refund a charge.
struct BudgetStacks {
    stacks: Vec<Vec<Budget>>,
    ids: HashMap<Vec<Budget>, usize>,
    transitions: HashMap<(usize, Transition), Option<usize>>,
}

impl BudgetStacks {
    const NONE: usize = 0;

    fn new() -> Self {
        Self {
            stacks: vec![Vec::new()],
            ids: HashMap::from([(Vec::new(), Self::NONE)]),
            transitions: HashMap::new(),
        }
    }

    fn is_fuzzy(&self, id: usize) -> bool {
        !self.stacks[id].is_empty()
    }

    /// Stack reached from `id` by `transition`, or `None` if an error is not
    /// allowed by every active budget
    fn apply(&mut self, id: usize, transition: Transition) -> Option<usize> {
        if let Some(&next) = self.transitions.get(&(id, transition)) {
            return next;
        }

        let mut stack = self.stacks[id].clone();
        let applied = match transition {
            Transition::Charge(kind) => {
                let allowed = !stack.is_empty() && stack.iter().all(|b| b.allows(kind));
                if allowed {
                    stack.iter_mut().for_each(|b| *b.counter(kind) += 1);
                }
                allowed
            }
            Transition::Push(limits) => {
                stack.push(Budget::new(limits));
                true
            }
            Transition::Pop => stack.pop().is_some(),
        };

        let next = applied.then(|| self.intern(stack));
        self.transitions.insert((id, transition), next);
        next
    }

    fn intern(&mut self, stack: Vec<Budget>) -> usize {
        if let Some(&id) = self.ids.get(&stack) {
            return id;
        }
        let id = self.stacks.len();
        self.stacks.push(stack.clone());
        self.ids.insert(stack, id);
        id
    }
}

/// States already entered, one bitmap per budget stack
struct Visited {
    width: usize,
    words: usize,
    maps: Vec<Vec<u64>>,
}

impl Visited {
    fn new(program_len: usize, text_len: usize) -> Self {
        let width = text_len + 1;
        Self {
            width,
            words: (program_len * width).div_ceil(64),
            maps: Vec::new(),
        }
    }

    /// Mark a state, returning `false` if it was already marked
    fn insert(&mut self, pc: usize, pos: usize, budget: usize) -> bool {
        if budget >= self.maps.len() {
            self.maps.resize_with(budget + 1, Vec::new);
        }
        let map = &mut self.maps[budget];
        if map.is_empty() {
            *map = vec![0; self.words];
        }

        let bit = pc * self.width + pos;
        let (word, mask) = (bit / 64, 1u64 << (bit % 64));
        let fresh = map[word] & mask == 0;
        map[word] |= mask;
        fresh
    }
}

#[derive(Debug, Clone, Copy)]
enum Frame {
    Step {
        pc: usize,
        pos: usize,
        budget: usize,
    },
    /// Positions `lo..=hi` where the `Loop` at `pc` still has alternatives,
    /// the longest run first
    Unwind {
        pc: usize,
        lo: usize,
        hi: usize,
        budget: usize,
    },
    Restore {
        slot: usize,
        value: Option<usize>,
    },
}

/// Search state shared by every start position of one text
struct Matcher<'p, 't> {
    program: &'p [Inst],
    text: &'t [u8],
    slots: Vec<Option<usize>>,
    stack: Vec<Frame>,
    visited: Visited,
    budgets: BudgetStacks,
}

impl<'p, 't> Matcher<'p, 't> {
    fn new(program: &'p [Inst], text: &'t [u8], n_groups: usize) -> Self {
        Self {
            program,
            text,
            slots: vec![None; 2 * n_groups],
            stack: Vec::new(),
            visited: Visited::new(program.len(), text.len()),
            budgets: BudgetStacks::new(),
        }
    }

    /// End of the highest-priority match starting at `start`
    fn run(&mut self, start: usize) -> Option<usize> {
        self.stack.push(Frame::Step {
            pc: 0,
            pos: start,
            budget: BudgetStacks::NONE,
        });

        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Step { pc, pos, budget } => {
                    if let Some(end) = self.step(pc, pos, budget) {
                        self.stack.clear();
                        return Some(end);
                    }
                }
                Frame::Unwind { pc, lo, hi, budget } => self.unwind(pc, lo, hi, budget),
                Frame::Restore { slot, value } => self.slots[slot] = value,
            }
        }

        None
    }

    /// Follow one thread until it matches or dies, queueing alternatives
    fn step(&mut self, mut pc: usize, mut pos: usize, mut budget: usize) -> Option<usize> {
        loop {
            if !self.visited.insert(pc, pos, budget) {
                return None;
            }

            let inst = self.program[pc];
            match inst {
                Inst::Match => return Some(pos),
                Inst::Byte(set) => {
                    if self.budgets.is_fuzzy(budget) {
                        self.push_errors(pc, pos, budget, &set);
                    }
                    match self.text.get(pos) {
                        Some(&b) if set.contains(b) => {
                            pc += 1;
                            pos += 1;
                        }
                        _ => return None,
                    }
                }
                Inst::Loop { set, .. } => {
                    let mut end = pos;
                    while self.text.get(end).is_some_and(|&b| set.contains(b))
                        && self.visited.insert(pc, end + 1, budget)
                    {
                        end += 1;
                    }
                    self.stack.push(Frame::Unwind {
                        pc,
                        lo: pos,
                        hi: end,
                        budget,
                    });
                    return None;
                }
                Inst::Start if pos == 0 => pc += 1,
                Inst::End if pos == self.text.len() => pc += 1,
                Inst::Start | Inst::End => return None,
                Inst::Split(first, second) => {
                    self.stack.push(Frame::Step {
                        pc: second,
                        pos,
                        budget,
                    });
                    pc = first;
                }
                Inst::Jump(target) => pc = target,
                Inst::Save(slot) => {
                    self.stack.push(Frame::Restore {
                        slot,
                        value: self.slots[slot],
                    });
                    self.slots[slot] = Some(pos);
                    pc += 1;
                }
                Inst::PushBudget(limits) => {
                    budget = self.budgets.apply(budget, Transition::Push(limits))?;
                    pc += 1;
                }
                Inst::PopBudget => {
                    budget = self.budgets.apply(budget, Transition::Pop)?;
                    pc += 1;
                }
            }
        }
    }

    /// Give back one iteration of a greedy loop: at `hi`, try the errors
    /// the item allows, then leaving the loop
    fn unwind(&mut self, pc: usize, lo: usize, hi: usize, budget: usize) {
        let Inst::Loop { set, exit } = self.program[pc] else {
            return;
        };

        if hi > lo {
            self.stack.push(Frame::Unwind {
                pc,
                lo,
                hi: hi - 1,
                budget,
            });
        }
        self.stack.push(Frame::Step {
            pc: exit,
            pos: hi,
            budget,
        });
        if self.budgets.is_fuzzy(budget) {
            self.push_errors(pc + 1, hi, budget, &set);
        }
    }

    /// Queue the error readings of the `Byte` at `pc`, lowest priority first
    /// so that substitution is tried before insertion before deletion
    fn push_errors(&mut self, pc: usize, pos: usize, budget: usize, set: &ByteSet) {
        let current = self.text.get(pos).copied();

        if let Some(next) = self
            .budgets
            .apply(budget, Transition::Charge(ErrorKind::Deletion))
        {
            self.stack.push(Frame::Step {
                pc: pc + 1,
                pos,
                budget: next,
            });
        }

        if current.is_none() {
            return;
        }

        if let Some(next) = self
            .budgets
            .apply(budget, Transition::Charge(ErrorKind::Insertion))
        {
            self.stack.push(Frame::Step {
                pc,
                pos: pos + 1,
                budget: next,
            });
        }

        if current.is_some_and(|b| !set.contains(b)) {
            if let Some(next) = self
                .budgets
                .apply(budget, Transition::Charge(ErrorKind::Substitution))
            {
                self.stack.push(Frame::Step {
                    pc: pc + 1,
                    pos: pos + 1,
                    budget: next,
                });
            }
        }
    }
}
