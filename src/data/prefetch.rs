// ============================================================
// Layer 4 — Ordered Prefetching Loader
// ============================================================
// Batch preparation (padding, tensor creation) runs on background
// worker threads so the next batches are ready while the model is
// busy with the current one.
//
//   worker 0 ─┐ batches 0, n, 2n, ...
//   worker 1 ─┼─► bounded channel ─► reorder buffer ─► training loop
//   worker k ─┘
//
// Workers share nothing mutable: each owns a list of index chunks
// and reads the dataset through an Arc. The consumer side holds a
// small reorder buffer, so batches always come out in stream order
// no matter which worker finishes first. Shuffling (train only) is
// seeded from `seed + epoch`, so a run is reproducible.
//
// A pass either yields every batch or ends with an Err item: a
// missing dataset item or a worker that died (its panic message is
// recovered from the join handle) stops the stream instead of
// silently shortening the epoch.

use std::collections::BTreeMap;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use burn::data::{dataloader::batcher::Batcher, dataset::Dataset};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::error::{ErcError, ErcResult};

/// How a loader walks its dataset
#[derive(Debug, Clone, Copy)]
pub struct LoaderOptions {
    pub batch_size: usize,
    /// `Some(seed)` reshuffles every epoch; `None` keeps file order
    pub shuffle:    Option<u64>,
    pub workers:    usize,
}

pub struct PrefetchLoader<I, O> {
    dataset: Arc<dyn Dataset<I> + Send + Sync>,
    batcher: Arc<dyn Batcher<I, O> + Send + Sync>,
    options: LoaderOptions,
}

impl<I, O> PrefetchLoader<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new(
        dataset: Arc<dyn Dataset<I> + Send + Sync>,
        batcher: Arc<dyn Batcher<I, O> + Send + Sync>,
        options: LoaderOptions,
    ) -> Self {
        let options = LoaderOptions {
            batch_size: options.batch_size.max(1),
            workers:    options.workers.max(1),
            ..options
        };
        Self { dataset, batcher, options }
    }

    pub fn num_items(&self) -> usize {
        self.dataset.len()
    }

    pub fn num_batches(&self) -> usize {
        self.num_items().div_ceil(self.options.batch_size)
    }

    /// Start one pass over the dataset.
    pub fn iter(&self, epoch: usize) -> BatchStream<O> {
        let mut order: Vec<usize> = (0..self.num_items()).collect();
        if let Some(seed) = self.options.shuffle {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        let chunks: Arc<Vec<Vec<usize>>> = Arc::new(
            order.chunks(self.options.batch_size).map(<[usize]>::to_vec).collect(),
        );

        let total   = chunks.len();
        let workers = self.options.workers.min(total.max(1));
        let (tx, rx) = mpsc::sync_channel::<(usize, ErcResult<O>)>(workers * 2);

        let handles = (0..workers)
            .map(|w| {
                let tx      = tx.clone();
                let chunks  = Arc::clone(&chunks);
                let dataset = Arc::clone(&self.dataset);
                let batcher = Arc::clone(&self.batcher);
                thread::spawn(move || {
                    for k in (w..chunks.len()).step_by(workers) {
                        let items: Option<Vec<I>> =
                            chunks[k].iter().map(|&i| dataset.get(i)).collect();
                        let batch = items.map(|items| batcher.batch(items)).ok_or_else(|| {
                            ErcError::Dataset(format!(
                                "batch {k} refers to an item the dataset does not have"
                            ))
                        });
                        if tx.send((k, batch)).is_err() {
                            // consumer went away
                            break;
                        }
                    }
                })
            })
            .collect();

        BatchStream {
            rx:      Some(rx),
            pending: BTreeMap::new(),
            next:    0,
            total,
            handles,
        }
    }
}

/// One in-order pass; blocks on `next()` until the batch is ready.
pub struct BatchStream<O> {
    rx:      Option<mpsc::Receiver<(usize, ErcResult<O>)>>,
    pending: BTreeMap<usize, ErcResult<O>>,
    next:    usize,
    total:   usize,
    handles: Vec<JoinHandle<()>>,
}

impl<O> BatchStream<O> {
    /// Join every worker, returning the first panic message if any died.
    fn join_workers(&mut self) -> Option<String> {
        let mut failure = None;
        for handle in self.handles.drain(..) {
            if let Err(payload) = handle.join() {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                failure.get_or_insert(message);
            }
        }
        failure
    }

    fn emit(&mut self, item: ErcResult<O>) -> Option<ErcResult<O>> {
        // An error ends the pass.
        self.next = if item.is_ok() { self.next + 1 } else { self.total };
        Some(item)
    }
}

impl<O> Iterator for BatchStream<O> {
    type Item = ErcResult<O>;

    fn next(&mut self) -> Option<ErcResult<O>> {
        if self.next >= self.total {
            return None;
        }
        let want = self.next;

        if let Some(item) = self.pending.remove(&want) {
            return self.emit(item);
        }

        loop {
            let received = self.rx.as_ref()?.recv();
            match received {
                Ok((k, item)) if k == want => return self.emit(item),
                Ok((k, item)) => {
                    self.pending.insert(k, item);
                }
                Err(_) => {
                    let reason = self
                        .join_workers()
                        .unwrap_or_else(|| "workers exited early".to_string());
                    tracing::error!(
                        "Batch workers stopped after {} of {} batches: {}",
                        want,
                        self.total,
                        reason
                    );
                    return self.emit(Err(ErcError::Dataset(format!(
                        "batch {want} of {} was never produced: {reason}",
                        self.total
                    ))));
                }
            }
        }
    }
}

impl<O> Drop for BatchStream<O> {
    fn drop(&mut self) {
        // Unblock workers stuck on a full channel before joining them.
        self.rx.take();
        if let Some(reason) = self.join_workers() {
            tracing::warn!("Batch worker panicked after the stream was dropped: {}", reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::InMemDataset;

    /// Sums a batch of numbers, slowly for even batches so workers
    /// finish out of order.
    struct SlowSum;

    impl Batcher<usize, Vec<usize>> for SlowSum {
        fn batch(&self, items: Vec<usize>) -> Vec<usize> {
            if items.first().map_or(false, |x| x % 4 == 0) {
                thread::sleep(std::time::Duration::from_millis(5));
            }
            items
        }
    }

    fn loader(n: usize, options: LoaderOptions) -> PrefetchLoader<usize, Vec<usize>> {
        let dataset: Arc<dyn Dataset<usize> + Send + Sync> = Arc::new(InMemDataset::new((0..n).collect()));
        PrefetchLoader::new(dataset, Arc::new(SlowSum), options)
    }

    #[test]
    fn test_batches_arrive_in_stream_order_with_many_workers() {
        let l = loader(10, LoaderOptions { batch_size: 2, shuffle: None, workers: 4 });
        let batches: Vec<Vec<usize>> = l.iter(0).collect::<ErcResult<_>>().unwrap();
        assert_eq!(batches, vec![vec![0, 1], vec![2, 3], vec![4, 5], vec![6, 7], vec![8, 9]]);
    }

    #[test]
    fn test_last_batch_may_be_short() {
        let l = loader(5, LoaderOptions { batch_size: 2, shuffle: None, workers: 2 });
        assert_eq!(l.num_batches(), 3);
        let batches: Vec<Vec<usize>> = l.iter(0).collect::<ErcResult<_>>().unwrap();
        assert_eq!(batches.last().unwrap(), &vec![4]);
    }

    #[test]
    fn test_shuffle_is_seeded_per_epoch() {
        let opts = LoaderOptions { batch_size: 1, shuffle: Some(7), workers: 3 };
        let l    = loader(32, opts);

        let first: Vec<Vec<usize>> = l.iter(0).collect::<ErcResult<_>>().unwrap();
        let again: Vec<Vec<usize>> = l.iter(0).collect::<ErcResult<_>>().unwrap();
        let next:  Vec<Vec<usize>> = l.iter(1).collect::<ErcResult<_>>().unwrap();
        assert_eq!(first, again);
        assert_ne!(first, next);

        let mut seen: Vec<usize> = first.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_dataset_yields_nothing() {
        let l = loader(0, LoaderOptions { batch_size: 4, shuffle: None, workers: 2 });
        assert_eq!(l.num_batches(), 0);
        assert_eq!(l.iter(0).count(), 0);
    }

    /// Panics on the batch starting at item 2.
    struct FailsOnSecondBatch;

    impl Batcher<usize, Vec<usize>> for FailsOnSecondBatch {
        fn batch(&self, items: Vec<usize>) -> Vec<usize> {
            if items.first() == Some(&2) {
                panic!("cannot collate batch at item 2");
            }
            items
        }
    }

    #[test]
    fn test_worker_panic_ends_pass_with_error() {
        let dataset: Arc<dyn Dataset<usize> + Send + Sync> =
            Arc::new(InMemDataset::new((0..6).collect()));
        let l = PrefetchLoader::new(
            dataset,
            Arc::new(FailsOnSecondBatch),
            LoaderOptions { batch_size: 2, shuffle: None, workers: 2 },
        );
        assert_eq!(l.num_batches(), 3);

        let items: Vec<ErcResult<Vec<usize>>> = l.iter(0).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &vec![0, 1]);
        match &items[1] {
            Err(ErcError::Dataset(msg)) => assert!(msg.contains("cannot collate batch at item 2"), "{msg}"),
            other => panic!("expected a dataset error, got {other:?}"),
        }
    }

    /// Claims more items than it can return.
    struct Truncated;

    impl Dataset<usize> for Truncated {
        fn get(&self, index: usize) -> Option<usize> {
            (index < 3).then_some(index)
        }

        fn len(&self) -> usize {
            4
        }
    }

    #[test]
    fn test_missing_item_is_an_error_not_a_short_batch() {
        let l = PrefetchLoader::new(
            Arc::new(Truncated),
            Arc::new(SlowSum),
            LoaderOptions { batch_size: 2, shuffle: None, workers: 1 },
        );
        let result: ErcResult<Vec<Vec<usize>>> = l.iter(0).collect();
        assert!(matches!(result, Err(ErcError::Dataset(_))));
    }

    #[test]
    fn test_dropping_stream_early_does_not_hang() {
        let l      = loader(100, LoaderOptions { batch_size: 1, shuffle: None, workers: 2 });
        let mut it = l.iter(0);
        assert_eq!(it.next().unwrap().unwrap(), vec![0]);
        drop(it);
    }
}
