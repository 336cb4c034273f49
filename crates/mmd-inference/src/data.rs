//! In-memory block stream over two sample matrices.

use mmd_core::{Burst, DataSource, DenseFeatures, Error, Result};
use rand::SeedableRng;
use rand::seq::SliceRandom;

/// `DataSource` that serves paired blocks from two in-memory sample sets.
///
/// With a train/test ratio `r > 0` each sample set is split into
/// `round(n * r / (1 + r))` training samples and the rest for testing; the
/// active portion is chosen with [`DataSource::set_train_mode`]. In
/// non-blockwise mode the whole active portion is served as one block.
#[derive(Debug, Clone)]
pub struct BlockStream {
    samples: [DenseFeatures; 2],
    blocksizes: [usize; 2],
    order: [Vec<usize>; 2],
    blocks_per_burst: usize,
    train_test_ratio: f64,
    train_mode: bool,
    blockwise: bool,
    started: bool,
    cursor: usize,
}

impl BlockStream {
    /// Stream `p` and `q` in blocks of `blocksize_p` / `blocksize_q` samples,
    /// `blocks_per_burst` block pairs at a time.
    pub fn new(
        p: DenseFeatures,
        q: DenseFeatures,
        blocksize_p: usize,
        blocksize_q: usize,
        blocks_per_burst: usize,
    ) -> Result<Self> {
        if blocksize_p == 0 || blocksize_q == 0 {
            return Err(Error::Config("block sizes must be positive".to_string()));
        }
        if blocks_per_burst == 0 {
            return Err(Error::Config("blocks_per_burst must be positive".to_string()));
        }
        if p.dim() != q.dim() {
            return Err(Error::Config(format!(
                "P and Q have different dimensions ({} vs {})",
                p.dim(),
                q.dim()
            )));
        }
        let order = [(0..p.num_vectors()).collect(), (0..q.num_vectors()).collect()];
        Ok(Self {
            samples: [p, q],
            blocksizes: [blocksize_p, blocksize_q],
            order,
            blocks_per_burst,
            train_test_ratio: 0.0,
            train_mode: false,
            blockwise: true,
            started: false,
            cursor: 0,
        })
    }

    /// Block pairs per burst.
    pub fn blocks_per_burst(&self) -> usize {
        self.blocks_per_burst
    }

    /// Number of block pairs in the current mode.
    pub fn num_blocks(&self) -> usize {
        (0..2)
            .map(|i| self.active(i).len() / self.blocksize(i).max(1))
            .min()
            .unwrap_or(0)
    }

    fn num_train(&self, index: usize) -> usize {
        let n = self.order[index].len();
        let r = self.train_test_ratio;
        ((n as f64) * r / (1.0 + r)).round() as usize
    }

    /// Sample indices of source `index` in the current mode.
    fn active(&self, index: usize) -> &[usize] {
        let all = &self.order[index];
        if self.train_test_ratio <= 0.0 {
            return all;
        }
        let n_train = self.num_train(index).min(all.len());
        if self.train_mode { &all[..n_train] } else { &all[n_train..] }
    }

    fn block(&self, index: usize, block: usize) -> DenseFeatures {
        let bs = self.blocksize(index);
        let rows = &self.active(index)[block * bs..(block + 1) * bs];
        self.samples[index].select_rows(rows)
    }
}

impl DataSource for BlockStream {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        self.cursor = 0;
        Ok(())
    }

    fn next_burst(&mut self) -> Result<Option<Burst>> {
        if !self.started {
            return Err(Error::Stream("next_burst called before start".to_string()));
        }
        let total = self.num_blocks();
        if self.cursor >= total {
            return Ok(None);
        }
        let last = (self.cursor + self.blocks_per_burst).min(total);
        let p = (self.cursor..last).map(|b| self.block(0, b)).collect();
        let q = (self.cursor..last).map(|b| self.block(1, b)).collect();
        self.cursor = last;
        Burst::new(p, q).map(Some)
    }

    fn end(&mut self) {
        self.started = false;
    }

    fn reset(&mut self) {
        self.started = false;
        self.cursor = 0;
        self.unshuffle();
    }

    fn blocksize(&self, index: usize) -> usize {
        if self.blockwise { self.blocksizes[index] } else { self.active(index).len() }
    }

    fn num_samples(&self, index: usize) -> usize {
        self.active(index).len()
    }

    fn set_train_test_ratio(&mut self, ratio: f64) {
        self.train_test_ratio = ratio.max(0.0);
    }

    fn train_test_ratio(&self) -> f64 {
        self.train_test_ratio
    }

    fn set_train_mode(&mut self, train: bool) {
        self.train_mode = train;
    }

    fn is_train_mode(&self) -> bool {
        self.train_mode
    }

    fn is_blockwise(&self) -> bool {
        self.blockwise
    }

    fn set_blockwise(&mut self, blockwise: bool) {
        self.blockwise = blockwise;
    }

    fn shuffle(&mut self, seed: u64) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        for order in &mut self.order {
            order.shuffle(&mut rng);
        }
    }

    fn unshuffle(&mut self) {
        for (order, samples) in self.order.iter_mut().zip(&self.samples) {
            *order = (0..samples.num_vectors()).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn column(values: impl Iterator<Item = f64>) -> DenseFeatures {
        let v: Vec<f64> = values.collect();
        DenseFeatures::new(DMatrix::from_column_slice(v.len(), 1, &v))
    }

    fn stream(n: usize, bs: usize, bpb: usize) -> BlockStream {
        let p = column((0..n).map(|i| i as f64));
        let q = column((0..n).map(|i| 100.0 + i as f64));
        BlockStream::new(p, q, bs, bs, bpb).unwrap()
    }

    fn drain(s: &mut BlockStream) -> Vec<Burst> {
        s.start().unwrap();
        let mut out = Vec::new();
        while let Some(b) = s.next_burst().unwrap() {
            out.push(b);
        }
        s.end();
        out
    }

    #[test]
    fn test_bursts_cover_whole_blocks() {
        let mut s = stream(23, 5, 3);
        assert_eq!(s.num_blocks(), 4);
        let bursts = drain(&mut s);
        let sizes: Vec<usize> = bursts.iter().map(|b| b.num_blocks()).collect();
        assert_eq!(sizes, vec![3, 1]);
        assert_eq!(bursts[1].p[0].matrix()[(0, 0)], 15.0);
        assert_eq!(bursts[1].q[0].matrix()[(4, 0)], 119.0);
    }

    #[test]
    fn test_next_burst_requires_start() {
        let mut s = stream(10, 5, 1);
        assert!(matches!(s.next_burst(), Err(Error::Stream(_))));
    }

    #[test]
    fn test_train_test_split() {
        let mut s = stream(40, 5, 8);
        s.set_train_test_ratio(3.0);
        s.set_train_mode(true);
        assert_eq!(s.num_samples(0), 30);
        assert_eq!(s.num_blocks(), 6);
        s.set_train_mode(false);
        assert_eq!(s.num_samples(1), 10);
        let bursts = drain(&mut s);
        assert_eq!(bursts[0].p[0].matrix()[(0, 0)], 30.0);

        s.set_train_test_ratio(0.0);
        assert_eq!(s.num_samples(0), 40);
    }

    #[test]
    fn test_non_blockwise_serves_single_block() {
        let mut s = stream(12, 5, 1);
        s.set_blockwise(false);
        assert_eq!(s.blocksize(0), 12);
        let bursts = drain(&mut s);
        assert_eq!(bursts.len(), 1);
        assert_eq!(bursts[0].p[0].num_vectors(), 12);
    }

    #[test]
    fn test_shuffle_and_reset() {
        let mut s = stream(30, 30, 1);
        s.shuffle(4);
        let shuffled = drain(&mut s)[0].p[0].matrix().clone();
        let mut again = stream(30, 30, 1);
        again.shuffle(4);
        assert_eq!(drain(&mut again)[0].p[0].matrix(), &shuffled);

        let mut sorted: Vec<f64> = shuffled.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(sorted, (0..30).map(|i| i as f64).collect::<Vec<_>>());

        s.reset();
        assert_eq!(drain(&mut s)[0].p[0].matrix()[(0, 0)], 0.0);
    }

    #[test]
    fn test_unshuffle_keeps_split() {
        let mut s = stream(40, 5, 8);
        s.set_train_test_ratio(1.0);
        s.set_train_mode(false);
        let before = drain(&mut s);
        s.shuffle(9);
        assert_ne!(drain(&mut s)[0].p[0].matrix(), before[0].p[0].matrix());
        s.unshuffle();
        assert_eq!(s.train_test_ratio(), 1.0);
        assert!(!s.is_train_mode());
        assert_eq!(drain(&mut s)[0].p[0].matrix(), before[0].p[0].matrix());
    }

    #[test]
    fn test_rejects_bad_layout() {
        let p = column((0..4).map(|i| i as f64));
        let q = DenseFeatures::new(DMatrix::zeros(4, 2));
        assert!(BlockStream::new(p.clone(), q, 2, 2, 1).is_err());
        assert!(BlockStream::new(p.clone(), p.clone(), 0, 2, 1).is_err());
        assert!(BlockStream::new(p.clone(), p, 2, 2, 0).is_err());
    }
}
