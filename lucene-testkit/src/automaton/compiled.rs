//! Classified automaton handed to `Terms::intersect`

use std::sync::Arc;

use super::dfa::{DEAD, RunAutomaton};
use super::nfa::Nfa;
use crate::error::Result;

#[derive(Debug, Clone)]
pub enum CompiledAutomaton {
    /// Accepts nothing
    None,
    /// Accepts every byte string
    All,
    /// Accepts exactly one term
    Single(Vec<u8>),
    /// Anything else
    Normal(Arc<RunAutomaton>),
}

impl CompiledAutomaton {
    pub fn compile(nfa: &Nfa) -> Result<Self> {
        let dfa = RunAutomaton::determinize(nfa)?;
        if !dfa.is_live(RunAutomaton::START) {
            return Ok(CompiledAutomaton::None);
        }
        if accepts_all(&dfa) {
            return Ok(CompiledAutomaton::All);
        }
        if let Some(term) = single_term(&dfa) {
            return Ok(CompiledAutomaton::Single(term));
        }
        Ok(CompiledAutomaton::Normal(Arc::new(dfa)))
    }

    pub fn run_automaton(&self) -> Option<&Arc<RunAutomaton>> {
        match self {
            CompiledAutomaton::Normal(dfa) => Some(dfa),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            CompiledAutomaton::None => "NONE",
            CompiledAutomaton::All => "ALL",
            CompiledAutomaton::Single(_) => "SINGLE",
            CompiledAutomaton::Normal(_) => "NORMAL",
        }
    }
}

/// Every reachable state accepts and no byte leads to the dead state.
fn accepts_all(dfa: &RunAutomaton) -> bool {
    (0..dfa.num_states() as u32).all(|state| {
        dfa.is_accept(state) && (0..=u8::MAX).all(|b| dfa.step(state, b) != DEAD)
    })
}

/// The only accepted string, when the language is a single term.
fn single_term(dfa: &RunAutomaton) -> Option<Vec<u8>> {
    let mut state = RunAutomaton::START;
    let mut term = Vec::new();
    for _ in 0..=dfa.num_states() {
        let mut live = dfa.live_bytes(state);
        let first = live.next();
        let more = live.next().is_some();
        match (dfa.is_accept(state), first) {
            (true, None) => return Some(term),
            (true, Some(_)) => return None,
            (false, Some(byte)) if !more => {
                term.push(byte);
                state = dfa.step(state, byte);
            }
            _ => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::nfa::{Pattern, Repeat, Step};

    #[test]
    fn test_classification() {
        let empty_union = Nfa::union(&[]);
        assert!(matches!(
            CompiledAutomaton::compile(&empty_union).unwrap(),
            CompiledAutomaton::None
        ));

        let all = Nfa::union(&[Pattern {
            steps: vec![Step::range(0, u8::MAX).with_repeat(Repeat::Star)],
        }]);
        assert!(matches!(
            CompiledAutomaton::compile(&all).unwrap(),
            CompiledAutomaton::All
        ));

        match CompiledAutomaton::compile(&Nfa::literal(b"foo")).unwrap() {
            CompiledAutomaton::Single(term) => assert_eq!(term, b"foo"),
            other => panic!("expected SINGLE, got {}", other.kind_name()),
        }

        let normal = Nfa::union(&[Pattern {
            steps: vec![Step::range(b'a', b'b')],
        }]);
        let compiled = CompiledAutomaton::compile(&normal).unwrap();
        assert_eq!(compiled.kind_name(), "NORMAL");
        assert!(compiled.run_automaton().is_some());
    }
}
