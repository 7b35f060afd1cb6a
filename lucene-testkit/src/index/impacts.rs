//! Score-bounding impacts exposed by impacts-aware postings
//!
//! An impact `(freq, norm)` says "some document in this window has a term
//! frequency of at most `freq` with a norm of at least `norm`". Higher freq
//! and lower norm mean a higher score, so a list of impacts is a pareto
//! frontier sorted by increasing freq and increasing norm.

use crate::DocId;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Impact {
    pub freq: i32,
    pub norm: i64,
}

impl Impact {
    pub fn new(freq: i32, norm: i64) -> Self {
        Self { freq, norm }
    }
}

/// One skip level: impacts valid for all docs up to `doc_id_up_to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactLevel {
    pub doc_id_up_to: DocId,
    pub impacts: Vec<Impact>,
}

/// Snapshot of the impacts of an `ImpactsEnum` after `advance_shallow`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Impacts {
    levels: Vec<ImpactLevel>,
}

impl Impacts {
    pub fn new(levels: Vec<ImpactLevel>) -> Self {
        Self { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn doc_id_up_to(&self, level: usize) -> DocId {
        self.levels[level].doc_id_up_to
    }

    pub fn impacts(&self, level: usize) -> &[Impact] {
        &self.levels[level].impacts
    }
}

/// Compare norms as unsigned values, the way norms are encoded on disk.
fn norm_cmp(a: i64, b: i64) -> std::cmp::Ordering {
    (a as u64).cmp(&(b as u64))
}

/// Validate the structure of `impacts` after a shallow advance to `last_target`.
pub fn check_impacts(impacts: &Impacts, last_target: DocId) -> Result<()> {
    let num_levels = impacts.num_levels();
    if num_levels < 1 {
        return Err(Error::InvalidImpacts(format!(
            "the number of levels must be >= 1, got {}",
            num_levels
        )));
    }

    let up_to0 = impacts.doc_id_up_to(0);
    if up_to0 < last_target {
        return Err(Error::InvalidImpacts(format!(
            "docIdUpTo for level 0 must be >= lastTarget ({}), got {}",
            last_target, up_to0
        )));
    }

    for level in 1..num_levels {
        let up_to = impacts.doc_id_up_to(level);
        let previous = impacts.doc_id_up_to(level - 1);
        if up_to < previous {
            return Err(Error::InvalidImpacts(format!(
                "decreasing docIdUpTo: level {} is {} but level {} is {}",
                level - 1,
                previous,
                level,
                up_to
            )));
        }
    }

    for level in 0..num_levels {
        let per_level = impacts.impacts(level);
        let Some(first) = per_level.first() else {
            return Err(Error::InvalidImpacts(format!(
                "got empty list of impacts on level {}",
                level
            )));
        };
        if first.freq < 1 {
            return Err(Error::InvalidImpacts(format!(
                "first impact had a freq <= 0: {:?}",
                first
            )));
        }
        if first.norm == 0 {
            return Err(Error::InvalidImpacts(format!(
                "first impact had a norm == 0: {:?}",
                first
            )));
        }
        for pair in per_level.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            if cur.freq <= prev.freq || norm_cmp(cur.norm, prev.norm).is_le() {
                return Err(Error::InvalidImpacts(format!(
                    "impacts are not ordered or contain dups, got {:?} then {:?}",
                    prev, cur
                )));
            }
        }

        if level > 0 {
            // Every impact of the level below must be dominated by some impact here
            let mut upper = per_level.iter();
            let mut current = upper.next().copied().unwrap_or(*first);
            for lower in impacts.impacts(level - 1) {
                loop {
                    if lower.freq <= current.freq && norm_cmp(lower.norm, current.norm).is_ge() {
                        break;
                    }
                    match upper.next() {
                        Some(next) => current = *next,
                        None => {
                            return Err(Error::InvalidImpacts(format!(
                                "found impact {:?} on level {} but no impact on level {} \
                                 triggers a better score: {:?}",
                                lower,
                                level - 1,
                                level,
                                per_level
                            )));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Index of the first impact with `freq >= freq` (standard lower bound).
pub fn lower_bound_by_freq(impacts: &[Impact], freq: i32) -> usize {
    impacts.partition_point(|impact| impact.freq < freq)
}

/// Fold `(freq, norm)` pairs into a pareto frontier sorted by increasing freq
/// and increasing norm.
pub fn pareto_frontier(pairs: impl IntoIterator<Item = (i32, i64)>) -> Vec<Impact> {
    let mut all: Vec<Impact> = pairs
        .into_iter()
        .map(|(freq, norm)| Impact::new(freq, norm))
        .collect();
    // Highest freq first, then lowest norm
    all.sort_by(|a, b| b.freq.cmp(&a.freq).then(norm_cmp(a.norm, b.norm)));

    let mut frontier: Vec<Impact> = Vec::new();
    for impact in all {
        match frontier.last() {
            Some(last) if norm_cmp(impact.norm, last.norm).is_ge() => {}
            _ => frontier.push(impact),
        }
    }
    frontier.reverse();
    frontier
}
