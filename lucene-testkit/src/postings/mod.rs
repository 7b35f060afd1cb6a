//! Randomized postings conformance testing
//!
//! - `SeedPostings`: oracle stream regenerated from a per-term seed
//! - `Corpus`: synthetic field/term/seed map
//! - `SeedFields`: the corpus as a `Fields` view, fed to a codec's writer
//! - `Verifier`: lockstep comparison of codec enumerators and the oracle
//! - `RandomPostingsTester`: index building and (threaded) verification rounds

mod corpus;
mod driver;
mod features;
mod seed;
mod seed_fields;
mod verify;

pub use corpus::{Corpus, FieldAndTerm, FieldTerms, SeedAndOrd, TermClass};
pub use driver::{BuiltIndex, RandomPostingsTester};
pub use features::{FeatureSet, TestFeature};
pub use seed::SeedPostings;
pub use seed_fields::{FakeNorms, SeedFields, SeedTerms, SeedTermsEnum, doc_to_norm, fake_norm};
pub use verify::{TermUnderTest, Verifier, VerifyScope};

#[cfg(test)]
mod tests;
