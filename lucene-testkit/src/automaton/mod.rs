//! Byte automata for `Terms::intersect`
//!
//! Random patterns are built as an NFA, determinized into a `RunAutomaton`
//! and classified by `CompiledAutomaton`. `AutomatonTermsEnum` is the
//! generic intersection any `Terms` can fall back to.

mod compiled;
mod dfa;
mod nfa;
mod terms_enum;

pub use compiled::CompiledAutomaton;
pub use dfa::{DEAD, MAX_DETERMINIZED_STATES, RunAutomaton};
pub use nfa::{Nfa, Pattern, Repeat, Step, Transition, random_automaton};
pub use terms_enum::AutomatonTermsEnum;
