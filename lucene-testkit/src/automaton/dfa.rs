//! Deterministic run automaton built by subset construction
//!
//! ```text
//! table[state * 256 + byte] = next state, or DEAD
//! accept[state]             = state accepts
//! live[state]               = some accepting state is reachable
//! ```

use std::collections::VecDeque;

use rand::Rng;
use rustc_hash::FxHashMap;

use super::nfa::Nfa;
use crate::error::{Error, Result};

/// Dead state marker
pub const DEAD: u32 = u32::MAX;

/// Upper bound on determinized states before giving up
pub const MAX_DETERMINIZED_STATES: usize = 10_000;

const ALPHABET: usize = 256;

#[derive(Debug, Clone)]
pub struct RunAutomaton {
    table: Vec<u32>,
    accept: Vec<bool>,
    live: Vec<bool>,
}

impl RunAutomaton {
    pub const START: u32 = 0;

    /// Determinize `nfa`. Fails when more than `MAX_DETERMINIZED_STATES`
    /// states would be needed.
    pub fn determinize(nfa: &Nfa) -> Result<Self> {
        let mut state_map: FxHashMap<Vec<usize>, u32> = FxHashMap::default();
        let mut sets: Vec<Vec<usize>> = Vec::new();
        let mut table: Vec<u32> = Vec::new();
        let mut accept: Vec<bool> = Vec::new();
        let mut queue: VecDeque<u32> = VecDeque::new();

        let start = nfa.closure([Nfa::START]);
        state_map.insert(start.clone(), 0);
        accept.push(start.iter().any(|&s| nfa.is_accept(s)));
        sets.push(start);
        table.resize(ALPHABET, DEAD);
        queue.push_back(0);

        while let Some(id) = queue.pop_front() {
            // Targets per byte, deduplicated through the closure
            let mut targets: Vec<Vec<usize>> = vec![Vec::new(); ALPHABET];
            for &state in &sets[id as usize] {
                for t in nfa.transitions(state) {
                    for byte in t.lo..=t.hi {
                        targets[byte as usize].push(t.to);
                    }
                }
            }

            for (byte, raw) in targets.into_iter().enumerate() {
                if raw.is_empty() {
                    continue;
                }
                let next = nfa.closure(raw);
                let next_id = match state_map.get(&next) {
                    Some(&existing) => existing,
                    None => {
                        if sets.len() >= MAX_DETERMINIZED_STATES {
                            return Err(Error::Unsupported(format!(
                                "automaton needs more than {} determinized states",
                                MAX_DETERMINIZED_STATES
                            )));
                        }
                        let new_id = sets.len() as u32;
                        accept.push(next.iter().any(|&s| nfa.is_accept(s)));
                        state_map.insert(next.clone(), new_id);
                        sets.push(next);
                        table.resize(table.len() + ALPHABET, DEAD);
                        queue.push_back(new_id);
                        new_id
                    }
                };
                table[id as usize * ALPHABET + byte] = next_id;
            }
        }

        let live = compute_live(&table, &accept);
        Ok(Self {
            table,
            accept,
            live,
        })
    }

    pub fn num_states(&self) -> usize {
        self.accept.len()
    }

    #[inline]
    pub fn step(&self, state: u32, byte: u8) -> u32 {
        self.table[state as usize * ALPHABET + byte as usize]
    }

    pub fn is_accept(&self, state: u32) -> bool {
        self.accept[state as usize]
    }

    pub fn is_live(&self, state: u32) -> bool {
        state != DEAD && self.live[state as usize]
    }

    /// True when the whole input is accepted.
    pub fn run(&self, input: &[u8]) -> bool {
        let mut state = Self::START;
        for &byte in input {
            state = self.step(state, byte);
            if state == DEAD {
                return false;
            }
        }
        self.is_accept(state)
    }

    /// Bytes leading from `state` to a live state.
    pub fn live_bytes(&self, state: u32) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(move |&b| self.is_live(self.step(state, b)))
    }

    /// Random accepted string of at most `max_len` bytes, by a random walk
    /// over live states.
    pub fn random_accepted<R: Rng + ?Sized>(&self, rng: &mut R, max_len: usize) -> Option<Vec<u8>> {
        if !self.is_live(Self::START) {
            return None;
        }
        let mut state = Self::START;
        let mut out = Vec::new();
        loop {
            let choices: Vec<u8> = self.live_bytes(state).collect();
            if self.is_accept(state) && (choices.is_empty() || rng.random_bool(0.3)) {
                return Some(out);
            }
            if choices.is_empty() || out.len() >= max_len {
                return None;
            }
            let byte = choices[rng.random_range(0..choices.len())];
            out.push(byte);
            state = self.step(state, byte);
        }
    }
}

/// Reverse reachability from accepting states.
fn compute_live(table: &[u32], accept: &[bool]) -> Vec<bool> {
    let num_states = accept.len();
    let mut reverse: Vec<Vec<u32>> = vec![Vec::new(); num_states];
    for from in 0..num_states {
        for byte in 0..ALPHABET {
            let to = table[from * ALPHABET + byte];
            if to != DEAD {
                reverse[to as usize].push(from as u32);
            }
        }
    }
    let mut live = accept.to_vec();
    let mut stack: Vec<u32> = (0..num_states as u32).filter(|&s| accept[s as usize]).collect();
    while let Some(state) = stack.pop() {
        for &from in &reverse[state as usize] {
            if !live[from as usize] {
                live[from as usize] = true;
                stack.push(from);
            }
        }
    }
    live
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::automaton::nfa::{Pattern, Repeat, Step};

    #[test]
    fn test_literal_runs() {
        let dfa = RunAutomaton::determinize(&Nfa::literal(b"abc")).unwrap();
        assert!(dfa.run(b"abc"));
        assert!(!dfa.run(b"ab"));
        assert!(!dfa.run(b"abcd"));
        assert!(!dfa.run(b""));
    }

    #[test]
    fn test_star_and_optional() {
        let nfa = Nfa::union(&[Pattern {
            steps: vec![
                Step::single(b'a'),
                Step::range(b'0', b'9').with_repeat(Repeat::Star),
                Step::single(b'z').with_repeat(Repeat::Optional),
            ],
        }]);
        let dfa = RunAutomaton::determinize(&nfa).unwrap();
        for accepted in [&b"a"[..], b"a0", b"a0123z", b"az"] {
            assert!(dfa.run(accepted), "{:?}", accepted);
        }
        for rejected in [&b""[..], b"z", b"a0zz", b"ab"] {
            assert!(!dfa.run(rejected), "{:?}", rejected);
        }
    }

    #[test]
    fn test_random_accepted_is_accepted() {
        let nfa = Nfa::union(&[
            Pattern {
                steps: vec![Step::range(b'a', b'c'), Step::range(b'x', b'z')],
            },
            Pattern {
                steps: vec![Step::range(b'm', b'n').with_repeat(Repeat::Star)],
            },
        ]);
        let dfa = RunAutomaton::determinize(&nfa).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            if let Some(s) = dfa.random_accepted(&mut rng, 32) {
                assert!(dfa.run(&s));
            }
        }
    }

    #[test]
    fn test_dead_branches_are_not_live() {
        // "ab" or "a" followed by a byte leading nowhere accepting
        let mut nfa = Nfa::literal(b"ab");
        let trap = nfa.add_state();
        nfa.add_transition(Nfa::START, b'q', b'q', trap);
        let dfa = RunAutomaton::determinize(&nfa).unwrap();
        let after_q = dfa.step(RunAutomaton::START, b'q');
        assert_ne!(after_q, DEAD);
        assert!(!dfa.is_live(after_q));
        assert!(dfa.is_live(RunAutomaton::START));
    }
}
