//! Flush/merge simulation driving a policy through segment metadata only

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;

use super::{
    MergePolicy, MergeSpecification, MergeTrigger, MockMergeContext, SegmentCommitInfo,
    SegmentInfos, SegmentSource,
};
use crate::config::TestConfig;
use crate::error::{Error, Result};

/// Average document size for the append-only and update simulations.
const AVG_DOC_BYTES: f64 = 5.0 * 1024.0;
/// Tiny documents and flushes are what used to trigger quadratic merging.
const PATHOLOGICAL_DOC_BYTES: f64 = 10.0;
const PATHOLOGICAL_MAX_DOCS_PER_FLUSH: usize = 3;
/// Share of each flush that replaces existing documents once the index is full.
const UPDATE_RATIO: f64 = 0.9;
/// Upper bound on merge rounds triggered by a single flush.
const MAX_SETTLE_ROUNDS: usize = 10_000;

/// Bytes written by flushes and by merges.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IoStats {
    pub flush_bytes: u64,
    pub merge_bytes: u64,
    pub flushes: usize,
    pub merges: usize,
}

impl IoStats {
    /// Total bytes written per byte flushed.
    pub fn write_amplification(&self) -> f64 {
        if self.flush_bytes == 0 {
            return 1.0;
        }
        (self.flush_bytes + self.merge_bytes) as f64 / self.flush_bytes as f64
    }
}

impl fmt::Display for IoStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} flushes ({} bytes), {} merges ({} bytes), write amplification {:.2}",
            self.flushes,
            self.flush_bytes,
            self.merges,
            self.merge_bytes,
            self.write_amplification()
        )
    }
}

/// Sequential flush/merge state machine.
struct Simulation {
    infos: SegmentInfos,
    stats: IoStats,
    ctx: MockMergeContext,
    next_segment: u64,
}

impl Simulation {
    fn new() -> Self {
        Self {
            infos: SegmentInfos::new(),
            stats: IoStats::default(),
            ctx: MockMergeContext::new(),
            next_segment: 0,
        }
    }

    fn next_name(&mut self) -> String {
        let name = format!("_{}", self.next_segment);
        self.next_segment += 1;
        name
    }

    fn flush(&mut self, docs: usize, doc_bytes: f64) -> Result<()> {
        let max_doc = u32::try_from(docs)
            .map_err(|_| Error::Config(format!("{} docs do not fit in one segment", docs)))?;
        let size = (docs as f64 * doc_bytes).round() as u64;
        let name = self.next_name();
        self.infos = self.infos.with_segment(SegmentCommitInfo::new(
            name,
            max_doc,
            0,
            size,
            SegmentSource::Flush,
        ));
        self.stats.flush_bytes += size;
        self.stats.flushes += 1;
        Ok(())
    }

    /// Apply every merge of `spec` at once, as if they ran concurrently.
    fn apply(&mut self, spec: &MergeSpecification) -> Result<()> {
        let mut guards = Vec::with_capacity(spec.len());
        for merge in &spec.merges {
            match self.ctx.register(merge.names()) {
                Some(guard) => guards.push(guard),
                None => {
                    return Err(Error::MergePolicy(format!(
                        "{} overlaps another merge of the same specification",
                        merge
                    )));
                }
            }
        }
        for merge in &spec.merges {
            let name = self.next_name();
            self.infos = self.infos.apply_merge(merge, &name, &mut self.stats)?;
        }
        drop(guards);
        Ok(())
    }
}

fn proposes_nothing(spec: Option<MergeSpecification>) -> bool {
    spec.is_none_or(|spec| spec.is_empty())
}

/// Apply `first` and keep asking for `MergeFinished` merges until the
/// policy has nothing left to do.
fn settle<T>(
    case: &T,
    policy: &T::Policy,
    sim: &mut Simulation,
    first: Option<MergeSpecification>,
) -> Result<()>
where
    T: MergePolicyTestCase + ?Sized,
{
    let mut next = first;
    let mut rounds = 0;
    while let Some(spec) = next {
        if spec.is_empty() {
            return Err(Error::MergePolicy(
                "empty merge specification instead of none".into(),
            ));
        }
        case.assert_merge(policy, &spec)?;
        sim.apply(&spec)?;
        rounds += 1;
        if rounds > MAX_SETTLE_ROUNDS {
            return Err(Error::MergePolicy(format!(
                "still merging after {} rounds with {} segments",
                rounds,
                sim.infos.len()
            )));
        }
        next = policy.find_merges(MergeTrigger::MergeFinished, &sim.infos, &sim.ctx);
    }
    Ok(())
}

/// Flush `docs` documents, ask for full-flush merges (falling back to
/// segment-flush merges), settle, then validate the result.
fn flush_step<T>(
    case: &T,
    policy: &T::Policy,
    sim: &mut Simulation,
    docs: usize,
    doc_bytes: f64,
) -> Result<()>
where
    T: MergePolicyTestCase + ?Sized,
{
    sim.flush(docs, doc_bytes)?;
    let merges = policy
        .find_full_flush_merges(MergeTrigger::FullFlush, &sim.infos, &sim.ctx)
        .or_else(|| policy.find_merges(MergeTrigger::SegmentFlush, &sim.infos, &sim.ctx));
    settle(case, policy, sim, merges)?;
    case.assert_segment_infos(policy, &sim.infos)
}

/// Simulation scenarios every merge policy is expected to pass.
///
/// Implementors supply the policy and its structural checks; the provided
/// methods flush and merge purely through `SegmentInfos` snapshots, so even
/// millions of simulated documents run in milliseconds.
pub trait MergePolicyTestCase {
    type Policy: MergePolicy;

    /// Policy under test, possibly randomized.
    fn merge_policy(&self, rng: &mut StdRng) -> Self::Policy;

    /// Validate the segment list after a flush has settled.
    fn assert_segment_infos(&self, policy: &Self::Policy, infos: &SegmentInfos) -> Result<()>;

    /// Validate a merge specification before it is applied.
    fn assert_merge(&self, _policy: &Self::Policy, spec: &MergeSpecification) -> Result<()> {
        let mut seen = FxHashSet::default();
        for merge in &spec.merges {
            if merge.segments.is_empty() {
                return Err(Error::MergePolicy("merge without segments".into()));
            }
            for info in &merge.segments {
                if !seen.insert(info.name.as_str()) {
                    return Err(Error::MergePolicy(format!(
                        "{} is part of more than one merge",
                        info.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Flush segments of random size without deletes and let the policy
    /// merge after every flush.
    fn simulate_append_only(
        &self,
        rng: &mut StdRng,
        total_docs: usize,
        max_docs_per_flush: usize,
    ) -> Result<IoStats> {
        if max_docs_per_flush == 0 {
            return Err(Error::Config("max_docs_per_flush must be positive".into()));
        }
        let policy = self.merge_policy(rng);
        let mut sim = Simulation::new();
        let mut num_docs = 0;
        while num_docs < total_docs {
            let flush_docs = rng.random_range(1..=max_docs_per_flush);
            num_docs += flush_docs;
            flush_step(self, &policy, &mut sim, flush_docs, AVG_DOC_BYTES)?;
        }
        log::info!(
            "[merge_sim] append-only {:?}: {} docs, {} segments, {}",
            policy,
            num_docs,
            sim.infos.len(),
            sim.stats
        );
        Ok(sim.stats)
    }

    /// Like `simulate_append_only`, but each flush also replaces existing
    /// documents, proportionally to how full the index already is.
    fn simulate_updates(
        &self,
        rng: &mut StdRng,
        total_docs: usize,
        max_docs_per_flush: usize,
    ) -> Result<IoStats> {
        if max_docs_per_flush == 0 || total_docs == 0 {
            return Err(Error::Config("update simulation needs documents".into()));
        }
        let policy = self.merge_policy(rng);
        let mut sim = Simulation::new();
        let mut num_docs = 0;
        while num_docs < total_docs {
            let flush_docs = if rng.random_bool(0.9) {
                rng.random_range((max_docs_per_flush / 2).max(1)..=max_docs_per_flush)
            } else {
                rng.random_range(1..=max_docs_per_flush)
            };
            // A flush larger than the whole index cannot replace more than it holds
            let del_count = ((flush_docs as f64 * UPDATE_RATIO * num_docs as f64
                / total_docs as f64) as u64)
                .min(sim.infos.total_live_docs());
            num_docs += flush_docs - del_count as usize;

            sim.infos = sim.infos.apply_deletes(del_count)?;
            flush_step(self, &policy, &mut sim, flush_docs, AVG_DOC_BYTES)?;
        }
        log::info!(
            "[merge_sim] updates {:?}: {} live docs, {} segments, {}",
            policy,
            sim.infos.total_live_docs(),
            sim.infos.len(),
            sim.stats
        );
        Ok(sim.stats)
    }

    /// The append-only loop with tiny flushes of tiny documents must not
    /// cause quadratic merging: write amplification has to stay below
    /// `ln(flushes) / ln(1.5)`.
    fn check_no_pathological_merges(&self, rng: &mut StdRng, total_docs: usize) -> Result<IoStats> {
        let policy = self.merge_policy(rng);
        let mut sim = Simulation::new();
        let mut num_docs = 0;
        while num_docs < total_docs {
            let flush_docs = rng.random_range(1..=PATHOLOGICAL_MAX_DOCS_PER_FLUSH);
            num_docs += flush_docs;
            flush_step(self, &policy, &mut sim, flush_docs, PATHOLOGICAL_DOC_BYTES)?;
        }

        let stats = sim.stats;
        let limit = (stats.flushes as f64).ln() / 1.5f64.ln();
        let write_amplification = stats.write_amplification();
        log::info!(
            "[merge_sim] pathological check {:?}: {} (limit {:.2})",
            policy,
            stats,
            limit
        );
        if write_amplification >= limit {
            return Err(Error::MergePolicy(format!(
                "write amplification is {:.2} on {} flushes, limit {:.2}",
                write_amplification, stats.flushes, limit
            )));
        }
        Ok(stats)
    }

    /// An empty index never needs merging.
    fn check_find_merges_on_empty(&self, rng: &mut StdRng) -> Result<()> {
        let policy = self.merge_policy(rng);
        let ctx = MockMergeContext::new();
        let empty = SegmentInfos::new();
        for trigger in MergeTrigger::ALL {
            if !proposes_nothing(policy.find_merges(trigger, &empty, &ctx)) {
                return Err(Error::MergePolicy(format!(
                    "merges proposed for an empty index on {:?}",
                    trigger
                )));
            }
            if !proposes_nothing(policy.find_full_flush_merges(trigger, &empty, &ctx)) {
                return Err(Error::MergePolicy(format!(
                    "full flush merges proposed for an empty index on {:?}",
                    trigger
                )));
            }
        }
        if !proposes_nothing(policy.find_forced_merges(&empty, 1, &FxHashSet::default(), &ctx)) {
            return Err(Error::MergePolicy(
                "forced merges proposed for an empty index".into(),
            ));
        }
        Ok(())
    }

    /// Forced merges must do nothing when the index already has few enough
    /// segments. A policy that does merge must reach the requested count.
    fn check_forced_merge_not_needed(&self, rng: &mut StdRng) -> Result<()> {
        let policy = self.merge_policy(rng);
        let mut sim = Simulation::new();
        for _ in 0..rng.random_range(2..=20) {
            let docs = rng.random_range(1..=5);
            sim.flush(docs, AVG_DOC_BYTES)?;
        }

        for round in (0..=5).rev() {
            let max_segment_count = if round == 0 {
                1
            } else {
                rng.random_range(1..=10)
            };
            let count = sim.infos.len();
            let spec = policy.find_forced_merges(
                &sim.infos,
                max_segment_count,
                &sim.infos.names(),
                &sim.ctx,
            );
            if count <= max_segment_count {
                if !proposes_nothing(spec) {
                    return Err(Error::MergePolicy(format!(
                        "forced merge to {} segments proposed merges for {} segments",
                        max_segment_count, count
                    )));
                }
                continue;
            }

            let mut next = spec;
            let mut rounds = 0;
            while let Some(spec) = next.take().filter(|spec| !spec.is_empty()) {
                self.assert_merge(&policy, &spec)?;
                sim.apply(&spec)?;
                rounds += 1;
                if rounds > MAX_SETTLE_ROUNDS {
                    return Err(Error::MergePolicy(format!(
                        "forced merge to {} segments does not converge",
                        max_segment_count
                    )));
                }
                next = policy.find_forced_merges(
                    &sim.infos,
                    max_segment_count,
                    &sim.infos.names(),
                    &sim.ctx,
                );
            }
            if rounds > 0 && sim.infos.len() > max_segment_count {
                return Err(Error::MergePolicy(format!(
                    "forced merge to {} segments left {}",
                    max_segment_count,
                    sim.infos.len()
                )));
            }
        }
        Ok(())
    }

    /// Forced-deletes merges have nothing to reclaim without deletes.
    fn check_forced_deletes_without_deletes(&self, rng: &mut StdRng) -> Result<()> {
        let policy = self.merge_policy(rng);
        let mut sim = Simulation::new();
        if !proposes_nothing(policy.find_forced_deletes_merges(&sim.infos, &sim.ctx)) {
            return Err(Error::MergePolicy(
                "forced deletes merges proposed for an empty index".into(),
            ));
        }
        for _ in 0..rng.random_range(1..=20) {
            let docs = rng.random_range(1..=1000);
            sim.flush(docs, AVG_DOC_BYTES)?;
        }
        if !proposes_nothing(policy.find_forced_deletes_merges(&sim.infos, &sim.ctx)) {
            return Err(Error::MergePolicy(format!(
                "forced deletes merges proposed for {} segments without deletes",
                sim.infos.len()
            )));
        }
        Ok(())
    }

    /// Run every scenario with the document totals from `config`.
    fn check_all(&self, config: &TestConfig, seed: u64) -> Result<()> {
        log::info!("[merge_sim] seed=0x{:016x}", seed);
        let mut rng = StdRng::seed_from_u64(seed);
        self.check_find_merges_on_empty(&mut rng)?;
        self.check_forced_merge_not_needed(&mut rng)?;
        self.check_forced_deletes_without_deletes(&mut rng)?;
        self.simulate_append_only(
            &mut rng,
            config.append_only_total_docs * config.multiplier,
            config.append_only_max_docs_per_flush,
        )?;
        self.simulate_updates(
            &mut rng,
            config.updates_total_docs * config.multiplier,
            config.updates_max_docs_per_flush,
        )?;
        self.check_no_pathological_merges(&mut rng, config.pathological_total_docs)?;
        Ok(())
    }
}
