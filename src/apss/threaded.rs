use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};

use serde::Serialize;

use crate::{
    apss::{sink::ReorderingSink, Algorithm, Prepared, Scorer, Strategy, VectorOpener},
    codec::Tell,
    error::{Error, Result},
    record::{Sink, TokenPair, Weighted},
    utils::progress::{Progress, ProgressListener},
};

/// Entries of source A per chunk unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Scored chunks each worker may run ahead of the oldest unwritten one.
const REORDER_WINDOW_PER_THREAD: usize = 2;

/// Counters from one APSS run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ApssStats {
    pub chunks: usize,
    pub entries: u64,
    pub pairs: u64,
}

/// Chunk-parallel driver around one [`Algorithm`].
///
/// Source A is skimmed once to record the [`Tell`] of every chunk start.
/// Each chunk is then a self-contained task that opens its own cursors over
/// A and B, so workers never share a reader.
pub struct AllPairs {
    scorer: Scorer,
    strategy: Strategy,
    chunk_size: usize,
    threads: usize,
    listeners: Vec<Arc<dyn ProgressListener>>,
}

impl AllPairs {
    pub fn new(scorer: Scorer, strategy: Strategy) -> Self {
        AllPairs { scorer, strategy, chunk_size: DEFAULT_CHUNK_SIZE, threads: 1, listeners: Vec::new() }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Worker count. One runs every chunk on the calling thread.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Compare every vector of A with every vector of B, writing kept pairs
    /// to `sink` in `(a, b)` order. Returns the finished sink.
    pub fn run<A, B, K>(&self, a: &A, b: &B, sink: K) -> Result<(K, ApssStats)>
    where
        A: VectorOpener + ?Sized,
        B: VectorOpener + ?Sized,
        K: Sink<Weighted<TokenPair>> + Send,
    {
        if self.chunk_size < 1 || self.threads < 1 {
            return Err(Error::config("chunk size and thread count must be at least 1"));
        }
        let mut progress = Progress::new("allpairs");
        for listener in &self.listeners {
            progress.add_listener(Arc::clone(listener));
        }
        progress.start()?;
        match self.execute(a, b, sink, &mut progress) {
            Ok(done) => {
                progress.complete()?;
                Ok(done)
            }
            Err(e) => {
                progress.fail(e.to_string())?;
                Err(e)
            }
        }
    }

    fn execute<A, B, K>(&self, a: &A, b: &B, sink: K, progress: &mut Progress) -> Result<(K, ApssStats)>
    where
        A: VectorOpener + ?Sized,
        B: VectorOpener + ?Sized,
        K: Sink<Weighted<TokenPair>> + Send,
    {
        let mut algorithm = self.strategy.build();
        algorithm.index(&mut b.open()?, &self.scorer)?;
        progress.update(5.0, format!("{} index ready", algorithm.name()));

        let (starts, entries) = self.chunk_starts(a)?;
        tracing::info!(
            measure = %self.scorer.measure.name(),
            algorithm = algorithm.name(),
            filter = %self.scorer.filter,
            entries,
            chunks = starts.len(),
            threads = self.threads,
            "starting all-pairs search"
        );

        let algorithm: &dyn Algorithm = algorithm.as_ref();
        let pairs = AtomicU64::new(0);
        let done = AtomicUsize::new(0);
        let count = starts.len();
        let total = count.max(1) as f64;
        let out = ReorderingSink::new(sink, self.threads * REORDER_WINDOW_PER_THREAD);

        if self.threads <= 1 {
            for (index, start) in starts.iter().enumerate() {
                let batch = self.score(algorithm, a, b, start).map_err(|e| Error::task(format!("chunk {}", index), e))?;
                pairs.fetch_add(batch.len() as u64, Ordering::Relaxed);
                out.submit(index, batch)?;
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress.update(5.0 + 95.0 * finished as f64 / total, format!("chunk {} of {}", finished, count));
            }
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .thread_name(|i| format!("apss-{}", i))
                .build()
                .map_err(|e| Error::config(format!("cannot start worker pool: {}", e)))?;
            let failed = AtomicBool::new(false);
            let first_error: Mutex<Option<Error>> = Mutex::new(None);
            let progress = Mutex::new(progress);
            let claimed = AtomicUsize::new(0);

            // Workers claim chunks in increasing order, so the chunk the
            // output is waiting on is always held by a running worker.
            pool.scope(|scope| {
                for _ in 0..self.threads {
                    let (starts, out, claimed, pairs, done, failed, first_error, progress) =
                        (&starts, &out, &claimed, &pairs, &done, &failed, &first_error, &progress);
                    scope.spawn(move |_| loop {
                        if failed.load(Ordering::Acquire) {
                            return;
                        }
                        let index = claimed.fetch_add(1, Ordering::AcqRel);
                        let Some(start) = starts.get(index) else {
                            return;
                        };
                        let result = out
                            .wait_turn(index)
                            .and_then(|turn| {
                                if !turn {
                                    return Ok(false);
                                }
                                let batch = self.score(algorithm, a, b, start)?;
                                pairs.fetch_add(batch.len() as u64, Ordering::Relaxed);
                                out.submit(index, batch)?;
                                Ok(true)
                            })
                            .map_err(|e| Error::task(format!("chunk {}", index), e));
                        match result {
                            Ok(true) => {
                                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                                tracing::debug!(chunk = index, "chunk scored");
                                if let Ok(mut p) = progress.lock() {
                                    p.update(
                                        5.0 + 95.0 * finished as f64 / total,
                                        format!("chunk {} of {}", finished, count),
                                    );
                                }
                            }
                            Ok(false) => return,
                            Err(e) => {
                                if !failed.swap(true, Ordering::AcqRel) {
                                    if let Ok(mut slot) = first_error.lock() {
                                        *slot = Some(e);
                                    }
                                }
                                out.close();
                                return;
                            }
                        }
                    });
                }
            });

            let first = first_error.into_inner().map_err(|_| Error::config("worker error slot poisoned"))?;
            if let Some(e) = first {
                return Err(e);
            }
        }

        let sink = out.finish()?;
        let stats = ApssStats { chunks: count, entries, pairs: pairs.into_inner() };
        tracing::info!(pairs = stats.pairs, chunks = stats.chunks, "all-pairs search finished");
        Ok((sink, stats))
    }

    /// Positions of every chunk start in A, and the number of entries.
    fn chunk_starts<A: VectorOpener + ?Sized>(&self, a: &A) -> Result<(Vec<Tell>, u64)> {
        let mut cursor = a.open()?;
        let mut starts = Vec::new();
        let mut count = 0u64;
        while cursor.has_next()? {
            if count % self.chunk_size as u64 == 0 {
                starts.push(cursor.position()?);
            }
            if cursor.read()?.is_none() {
                break;
            }
            count += 1;
        }
        Ok((starts, count))
    }

    fn score<A, B>(&self, algorithm: &dyn Algorithm, a: &A, b: &B, start: &Tell) -> Result<Vec<Weighted<TokenPair>>>
    where
        A: VectorOpener + ?Sized,
        B: VectorOpener + ?Sized,
    {
        let mut cursor = a.open()?;
        cursor.seek(start.clone())?;
        let mut chunk: Vec<Prepared> = Vec::with_capacity(self.chunk_size);
        while chunk.len() < self.chunk_size {
            match cursor.read()? {
                Some(entry) => chunk.push(self.scorer.prepare(entry)),
                None => break,
            }
        }
        algorithm.score_chunk(&chunk, &mut b.open()?, &self.scorer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        apss::{testing, ProductionFilter, VectorCursor},
        measure::{build_measure, epsilon_equals, MeasureKind},
        weighting::WeightingKind,
    };

    fn events(n: u32) -> Vec<(u32, u32, f64)> {
        let mut rows = Vec::new();
        for e in 0..n {
            for f in 0..6u32 {
                if (e * 7 + f * 3) % 4 != 0 {
                    rows.push((e, f + e % 3, 1.0 + ((e + f) % 5) as f64));
                }
            }
        }
        rows.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        rows.dedup_by(|x, y| (x.0, x.1) == (y.0, y.1));
        rows
    }

    fn scorer(kind: MeasureKind, filter: ProductionFilter) -> Scorer {
        Scorer::new(build_measure(kind, false, WeightingKind::Null, None).unwrap(), filter)
    }

    #[test]
    fn recall_pairs_in_order_without_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events");
        testing::write_events(&path, &[(1, 1, 2.0), (1, 2, 1.0), (2, 2, 3.0)]);
        let open = testing::opener(&path);
        let job = AllPairs::new(scorer(MeasureKind::Recall, ProductionFilter::default()), Strategy::Inverted);
        let (out, stats) = job.run(&open, &open, Vec::new()).unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].record, TokenPair::new(1, 2));
        assert!(epsilon_equals(out[0].weight, 1.0 / 3.0));
        assert_eq!(out[1].record, TokenPair::new(2, 1));
        assert!(epsilon_equals(out[1].weight, 1.0));
    }

    #[test]
    fn threaded_output_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events");
        testing::write_events(&path, &events(40));
        let open = testing::opener(&path);
        let filter = ProductionFilter::new(0.05, f64::INFINITY, false);
        for strategy in [Strategy::Naive, Strategy::Inverted] {
            let sequential = AllPairs::new(scorer(MeasureKind::Lin, filter), strategy).chunk_size(40);
            let (expected, _) = sequential.run(&open, &open, Vec::new()).unwrap();
            let threaded = AllPairs::new(scorer(MeasureKind::Lin, filter), strategy).chunk_size(3).threads(4);
            let (actual, stats) = threaded.run(&open, &open, Vec::new()).unwrap();
            assert_eq!(stats.chunks, 14);
            assert!(actual.windows(2).all(|w| w[0].record < w[1].record));
            assert_eq!(expected.len(), actual.len());
            for (x, y) in expected.iter().zip(&actual) {
                assert_eq!(x.record, y.record);
                assert!(epsilon_equals(x.weight, y.weight));
            }
        }
    }

    #[test]
    fn chunks_far_outnumbering_the_reorder_window_all_arrive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events");
        testing::write_events(&path, &events(40));
        let open = testing::opener(&path);
        let filter = ProductionFilter::new(0.05, f64::INFINITY, false);
        let (expected, _) =
            AllPairs::new(scorer(MeasureKind::Jaccard, filter), Strategy::Inverted).run(&open, &open, Vec::new()).unwrap();
        let job = AllPairs::new(scorer(MeasureKind::Jaccard, filter), Strategy::Inverted).chunk_size(1).threads(2);
        let (actual, stats) = job.run(&open, &open, Vec::new()).unwrap();
        assert_eq!(stats.chunks, 40);
        assert_eq!(
            expected.iter().map(|w| w.record).collect::<Vec<_>>(),
            actual.iter().map(|w| w.record).collect::<Vec<_>>()
        );
    }

    #[test]
    fn worker_failures_surface_as_task_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events");
        testing::write_events(&path, &events(10));
        let good = testing::opener(&path);
        let missing = dir.path().join("missing");
        let bad = move || -> Result<VectorCursor> { testing::opener(&missing).open() };
        let calls = AtomicUsize::new(0);
        // First open succeeds for indexing; every chunk's open fails.
        let flaky = move || -> Result<VectorCursor> {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                good.open()
            } else {
                bad()
            }
        };
        let job = AllPairs::new(scorer(MeasureKind::Cosine, ProductionFilter::default()), Strategy::Naive)
            .chunk_size(2)
            .threads(3);
        let err = job.run(&testing::opener(&path), &flaky, Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Task { .. }));
    }
}
