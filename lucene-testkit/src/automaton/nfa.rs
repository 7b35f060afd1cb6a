//! Byte-range NFA with epsilon moves, and random pattern generation

use rand::Rng;
use rand::seq::IndexedRandom;

/// Transition on any byte in `lo..=hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub lo: u8,
    pub hi: u8,
    pub to: usize,
}

/// Nondeterministic automaton over bytes. State 0 is the start state.
#[derive(Debug, Clone)]
pub struct Nfa {
    transitions: Vec<Vec<Transition>>,
    epsilons: Vec<Vec<usize>>,
    accept: Vec<bool>,
}

impl Default for Nfa {
    fn default() -> Self {
        Self::new()
    }
}

impl Nfa {
    pub fn new() -> Self {
        Self {
            transitions: vec![Vec::new()],
            epsilons: vec![Vec::new()],
            accept: vec![false],
        }
    }

    pub const START: usize = 0;

    pub fn num_states(&self) -> usize {
        self.accept.len()
    }

    pub fn add_state(&mut self) -> usize {
        self.transitions.push(Vec::new());
        self.epsilons.push(Vec::new());
        self.accept.push(false);
        self.accept.len() - 1
    }

    pub fn add_transition(&mut self, from: usize, lo: u8, hi: u8, to: usize) {
        debug_assert!(lo <= hi);
        self.transitions[from].push(Transition { lo, hi, to });
    }

    pub fn add_epsilon(&mut self, from: usize, to: usize) {
        self.epsilons[from].push(to);
    }

    pub fn set_accept(&mut self, state: usize, accept: bool) {
        self.accept[state] = accept;
    }

    pub fn is_accept(&self, state: usize) -> bool {
        self.accept[state]
    }

    pub fn transitions(&self, state: usize) -> &[Transition] {
        &self.transitions[state]
    }

    /// Sorted, deduplicated epsilon closure of `states`.
    pub fn closure(&self, states: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let mut stack: Vec<usize> = states.into_iter().collect();
        let mut seen = vec![false; self.num_states()];
        let mut out = Vec::new();
        while let Some(state) = stack.pop() {
            if std::mem::replace(&mut seen[state], true) {
                continue;
            }
            out.push(state);
            stack.extend(self.epsilons[state].iter().copied());
        }
        out.sort_unstable();
        out
    }

    /// Automaton accepting exactly `term`.
    pub fn literal(term: &[u8]) -> Self {
        let pattern = Pattern {
            steps: term.iter().map(|&b| Step::single(b)).collect(),
        };
        Self::union(&[pattern])
    }

    /// Automaton accepting the union of `patterns`.
    pub fn union(patterns: &[Pattern]) -> Self {
        let mut nfa = Nfa::new();
        for pattern in patterns {
            let first = nfa.add_state();
            nfa.add_epsilon(Self::START, first);
            let mut current = first;
            for step in &pattern.steps {
                current = step.append(&mut nfa, current);
            }
            nfa.set_accept(current, true);
        }
        nfa
    }
}

/// One position of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub lo: u8,
    pub hi: u8,
    pub repeat: Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Exactly one byte
    One,
    /// Zero or one byte
    Optional,
    /// Zero or more bytes
    Star,
}

impl Step {
    pub fn single(byte: u8) -> Self {
        Self::range(byte, byte)
    }

    pub fn range(lo: u8, hi: u8) -> Self {
        Self {
            lo,
            hi,
            repeat: Repeat::One,
        }
    }

    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    fn append(&self, nfa: &mut Nfa, from: usize) -> usize {
        match self.repeat {
            Repeat::One => {
                let to = nfa.add_state();
                nfa.add_transition(from, self.lo, self.hi, to);
                to
            }
            Repeat::Optional => {
                let to = nfa.add_state();
                nfa.add_transition(from, self.lo, self.hi, to);
                nfa.add_epsilon(from, to);
                to
            }
            Repeat::Star => {
                let to = nfa.add_state();
                nfa.add_epsilon(from, to);
                nfa.add_transition(to, self.lo, self.hi, to);
                to
            }
        }
    }
}

/// Sequence of steps; see `Nfa::union`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub steps: Vec<Step>,
}

/// Random pattern union, mostly derived from `samples` so that it tends to
/// match some of them and their neighbours.
pub fn random_automaton<R: Rng + ?Sized>(rng: &mut R, samples: &[Vec<u8>]) -> Nfa {
    let num_patterns = rng.random_range(1..=4);
    let patterns: Vec<Pattern> = (0..num_patterns)
        .map(|_| {
            let seed_term = match samples.choose(rng) {
                Some(term) if rng.random_bool(0.8) => term.clone(),
                _ => random_letters(rng, 0, 6),
            };
            random_pattern(rng, &seed_term)
        })
        .collect();
    Nfa::union(&patterns)
}

fn random_letters<R: Rng + ?Sized>(rng: &mut R, min: usize, max: usize) -> Vec<u8> {
    let len = rng.random_range(min..=max);
    (0..len).map(|_| rng.random_range(b'a'..=b'z')).collect()
}

fn random_pattern<R: Rng + ?Sized>(rng: &mut R, term: &[u8]) -> Pattern {
    let mut steps: Vec<Step> = term
        .iter()
        .map(|&b| {
            let step = match rng.random_range(0..100) {
                0..70 => Step::single(b),
                70..85 => {
                    let radius = rng.random_range(1..8u8);
                    Step::range(b.saturating_sub(radius), b.saturating_add(radius))
                }
                85..95 => Step::range(b.min(b'a'), b.max(b'z')),
                _ => Step::single(b ^ (1u8 << rng.random_range(0..5u32))),
            };
            if rng.random_range(0..10) == 0 {
                step.with_repeat(Repeat::Optional)
            } else {
                step
            }
        })
        .collect();

    if !steps.is_empty() && rng.random_range(0..5) == 0 {
        let keep = rng.random_range(0..=steps.len());
        steps.truncate(keep);
        steps.push(Step::range(0, u8::MAX).with_repeat(Repeat::Star));
    }
    for _ in 0..rng.random_range(0..=3) {
        if rng.random_bool(0.3) {
            steps.push(Step::range(b'a', b'z').with_repeat(Repeat::Optional));
        }
    }
    Pattern { steps }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_follows_epsilon_chains() {
        let mut nfa = Nfa::new();
        let a = nfa.add_state();
        let b = nfa.add_state();
        let c = nfa.add_state();
        nfa.add_epsilon(Nfa::START, a);
        nfa.add_epsilon(a, b);
        nfa.add_transition(b, b'x', b'x', c);
        assert_eq!(nfa.closure([Nfa::START]), vec![0, a, b]);
        assert_eq!(nfa.closure([c]), vec![c]);
    }

    #[test]
    fn test_union_builds_one_branch_per_pattern() {
        let patterns = vec![
            Pattern {
                steps: vec![Step::single(b'a')],
            },
            Pattern {
                steps: vec![Step::single(b'b'), Step::single(b'c')],
            },
        ];
        let nfa = Nfa::union(&patterns);
        // start + (1 + 1) + (1 + 2)
        assert_eq!(nfa.num_states(), 6);
        assert_eq!(nfa.closure([Nfa::START]).len(), 3);
    }
}
