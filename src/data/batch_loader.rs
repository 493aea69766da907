// ============================================================
// Layer 4 — Prefetching Batch Loader
// ============================================================
// Feeds the training loop with batches from any Burn Dataset.
//
// Each epoch gets a deterministic plan: a list of index groups
// that is a pure function of (len, batch_size, seed, epoch,
// drop_last). A producer thread walks the plan, decodes each
// batch's samples in parallel on a rayon pool and pushes the
// decoded samples into a bounded crossbeam channel. The
// consumer turns them into tensors with the Batcher on the
// calling thread, so tensors never cross threads.
//
//   producer:  plan → [rayon: get(i) …] → bounded queue
//   consumer:  queue → Batcher::batch → training step
//
// Order is the plan order regardless of decode speed. Dropping
// the iterator disconnects the channel and the producer stops
// at its next send.

use burn::data::{dataloader::batcher::Batcher, dataset::Dataset};
use crossbeam_channel::{bounded, Receiver};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use std::{marker::PhantomData, sync::Arc, thread::JoinHandle};

use crate::data::error::{DatasetError, DatasetResult};

#[derive(Debug, Clone)]
pub struct BatchLoaderConfig {
    pub batch_size:  usize,
    /// Base seed for per-epoch shuffling; `None` keeps dataset order.
    pub shuffle:     Option<u64>,
    /// Drop the final partial batch.
    pub drop_last:   bool,
    pub num_workers: usize,
    /// Decoded batches allowed to wait in the queue.
    pub prefetch:    usize,
}

impl BatchLoaderConfig {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            shuffle: None,
            drop_last: false,
            num_workers: default_workers(),
            prefetch: 2,
        }
    }

    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = Some(seed);
        self
    }

    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch;
        self
    }
}

/// Available CPU parallelism, at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Partition `0..len` into batches for one epoch.
///
/// With a seed the order is shuffled with `seed + epoch`, so every
/// epoch differs yet reruns repeat. Without `drop_last` the last
/// batch holds the `len % batch_size` leftovers.
pub fn plan_batches(
    len:        usize,
    batch_size: usize,
    seed:       Option<u64>,
    epoch:      u64,
    drop_last:  bool,
) -> Vec<Vec<usize>> {
    let batch_size = batch_size.max(1);
    let mut order: Vec<usize> = (0..len).collect();
    if let Some(seed) = seed {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch));
        order.shuffle(&mut rng);
    }

    order
        .chunks(batch_size)
        .filter(|chunk| !drop_last || chunk.len() == batch_size)
        .map(<[usize]>::to_vec)
        .collect()
}

// ─── BatchLoader ──────────────────────────────────────────────────────────────
pub struct BatchLoader<I, O, T> {
    dataset: Arc<dyn Dataset<I>>,
    batcher: T,
    config:  BatchLoaderConfig,
    pool:    Arc<rayon::ThreadPool>,
    _output: PhantomData<fn() -> O>,
}

impl<I, O, T> BatchLoader<I, O, T>
where
    I: Send + 'static,
    T: Batcher<I, DatasetResult<O>>,
{
    pub fn new(dataset: Arc<dyn Dataset<I>>, batcher: T, config: BatchLoaderConfig) -> DatasetResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_workers.max(1))
            .thread_name(|i| format!("loader-worker-{i}"))
            .build()
            .map_err(|e| DatasetError::Worker(e.to_string()))?;

        Ok(Self {
            dataset,
            batcher,
            config,
            pool: Arc::new(pool),
            _output: PhantomData,
        })
    }

    /// Number of batches per epoch.
    pub fn len(&self) -> usize {
        let (len, bs) = (self.dataset.len(), self.config.batch_size.max(1));
        if self.config.drop_last { len / bs } else { len.div_ceil(bs) }
    }

    pub fn plan(&self, epoch: u64) -> Vec<Vec<usize>> {
        plan_batches(
            self.dataset.len(),
            self.config.batch_size,
            self.config.shuffle,
            epoch,
            self.config.drop_last,
        )
    }

    /// Start prefetching the batches of `epoch`.
    pub fn iter(&self, epoch: u64) -> BatchIter<'_, I, O, T> {
        let plan      = self.plan(epoch);
        let remaining = plan.len();
        let (tx, rx)  = bounded(self.config.prefetch.max(1));
        let dataset   = Arc::clone(&self.dataset);
        let pool      = Arc::clone(&self.pool);

        let producer = std::thread::Builder::new()
            .name(format!("loader-epoch-{epoch}"))
            .spawn(move || {
                for indices in plan {
                    let samples = pool.install(|| {
                        indices
                            .par_iter()
                            .map(|&i| dataset.get(i).ok_or(DatasetError::SampleUnavailable(i)))
                            .collect::<DatasetResult<Vec<I>>>()
                    });
                    if tx.send(samples).is_err() {
                        break;
                    }
                }
            });

        match producer {
            Ok(handle) => BatchIter {
                loader:    self,
                receiver:  Some(rx),
                producer:  Some(handle),
                remaining,
                failed:    None,
            },
            Err(e) => BatchIter {
                loader:    self,
                receiver:  None,
                producer:  None,
                remaining,
                failed:    Some(DatasetError::Worker(e.to_string())),
            },
        }
    }
}

// ─── BatchIter ────────────────────────────────────────────────────────────────
pub struct BatchIter<'a, I, O, T> {
    loader:    &'a BatchLoader<I, O, T>,
    receiver:  Option<Receiver<DatasetResult<Vec<I>>>>,
    producer:  Option<JoinHandle<()>>,
    remaining: usize,
    failed:    Option<DatasetError>,
}

impl<I, O, T> Iterator for BatchIter<'_, I, O, T>
where
    T: Batcher<I, DatasetResult<O>>,
{
    type Item = DatasetResult<O>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.failed.take() {
            self.remaining = 0;
            return Some(Err(err));
        }
        if self.remaining == 0 {
            return None;
        }

        let received = self.receiver.as_ref()?.recv();
        self.remaining -= 1;
        match received {
            Ok(Ok(samples)) => Some(self.loader.batcher.batch(samples)),
            Ok(Err(e)) => Some(Err(e)),
            Err(_) => {
                self.remaining = 0;
                Some(Err(DatasetError::Worker("prefetch thread stopped early".into())))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<I, O, T> Drop for BatchIter<'_, I, O, T> {
    fn drop(&mut self) {
        // Disconnect first so a producer blocked on a full queue wakes up.
        drop(self.receiver.take());
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
    }
}
