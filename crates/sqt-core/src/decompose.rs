use std::ops::Range;

use crate::error::{ScatterError, ScatterResult};

/// Contiguous block decomposition: every index covered exactly once,
/// bin sizes differ by at most one, ascending within each bin. The first
/// `n_items % n_bins` bins take the extra element.
#[derive(Clone, Copy, Debug)]
pub struct EvenDecomposition {
    n_items: usize,
    n_bins: usize,
}

impl EvenDecomposition {
    pub fn new(n_items: usize, n_bins: usize) -> Self {
        assert!(n_bins > 0, "decomposition needs at least one bin");
        Self { n_items, n_bins }
    }

    pub fn indices_for(&self, bin: usize) -> Range<usize> {
        let base = self.n_items / self.n_bins;
        let extra = self.n_items % self.n_bins;
        let start = bin * base + bin.min(extra);
        let len = base + usize::from(bin < extra);
        start..(start + len).min(self.n_items)
    }

    pub fn size_of(&self, bin: usize) -> usize {
        self.indices_for(bin).len()
    }

    /// Largest bin size; the padding width for gather collectives.
    pub fn max_size(&self) -> usize {
        self.n_items.div_ceil(self.n_bins)
    }
}

/// Sparse round-robin decomposition: bin `r` owns `{i : i % n_bins == r}`.
/// Used to spread correlation lags, where work per lag falls off with tau.
#[derive(Clone, Copy, Debug)]
pub struct ModuloDecomposition {
    n_items: usize,
    n_bins: usize,
}

impl ModuloDecomposition {
    pub fn new(n_items: usize, n_bins: usize) -> Self {
        assert!(n_bins > 0, "decomposition needs at least one bin");
        Self { n_items, n_bins }
    }

    pub fn indices_for(&self, bin: usize) -> impl Iterator<Item = usize> {
        let n_items = self.n_items;
        (bin..n_items).step_by(self.n_bins.max(1))
    }
}

/// Split of the world communicator into independent q-vector pipelines.
///
/// Every partition has the same rank count; the q-set is distributed over
/// partitions evenly, the frame set over the ranks inside one partition.
#[derive(Clone, Copy, Debug)]
pub struct PartitionPlan {
    pub world_size: usize,
    pub partitions: usize,
    pub partition_size: usize,
    pub n_qvectors: usize,
    pub n_frames: usize,
}

impl PartitionPlan {
    /// Pick the largest partition count P with P | world, P within the user
    /// cap, and enough frames that every rank of a partition can own at
    /// least one (soft: falls back to P = 1 when nothing qualifies).
    pub fn plan(
        world_size: usize,
        n_qvectors: usize,
        n_frames: usize,
        cap: Option<usize>,
    ) -> ScatterResult<Self> {
        if world_size == 0 {
            return Err(ScatterError::Config("world size must be positive".into()));
        }
        if n_qvectors == 0 {
            return Err(ScatterError::Config("empty q-vector set".into()));
        }
        let cap = cap.unwrap_or(n_qvectors).max(1);
        let mut best = 1;
        for p in 1..=world_size {
            if world_size % p != 0 || p > cap {
                continue;
            }
            if world_size / p <= n_frames.max(1) {
                best = best.max(p);
            }
        }
        Ok(Self {
            world_size,
            partitions: best,
            partition_size: world_size / best,
            n_qvectors,
            n_frames,
        })
    }

    pub fn partition_of(&self, world_rank: usize) -> usize {
        world_rank / self.partition_size
    }

    pub fn rank_in_partition(&self, world_rank: usize) -> usize {
        world_rank % self.partition_size
    }

    /// q-vector indices a partition is responsible for.
    pub fn qvectors_for(&self, partition: usize) -> Range<usize> {
        EvenDecomposition::new(self.n_qvectors, self.partitions).indices_for(partition)
    }

    /// Frame indices a rank inside a partition is responsible for.
    pub fn frames_for(&self, rank_in_partition: usize) -> Range<usize> {
        EvenDecomposition::new(self.n_frames, self.partition_size).indices_for(rank_in_partition)
    }
}
