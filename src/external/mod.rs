//! Out-of-core counting and sorting.
//!
//! An input is cut into chunk files by a [`Chunker`]; every chunk then flows
//! through independent worker tasks: count (raw instances only), sort, and a
//! pairwise merge tree per output [`Category`]. The driver waits on the
//! chunk channel and the task completion channel at once and never polls.
pub mod chunk;
pub mod count;
pub mod sort;

use std::{
    collections::VecDeque,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use crossbeam_channel::{bounded, never, select, Receiver, Sender};
use serde::Serialize;

use crate::{
    error::{Error, Result},
    record::{Layout, Token, TokenPair},
    utils::temp::TempFiles,
};

pub use chunk::{ChunkStats, Chunker};

/// Records per chunk unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 1_000_000;

/// One of the three sorted outputs of a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    Entries,
    Features,
    Events,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Entries, Category::Features, Category::Events];

    pub fn layout(self) -> Layout {
        match self {
            Category::Entries => Layout::Entries,
            Category::Features => Layout::Features,
            Category::Events => Layout::Events,
        }
    }

    /// The category sorted by a standalone sort of `layout`, if any.
    pub fn of(layout: Layout) -> Option<Category> {
        match layout {
            Layout::Entries => Some(Category::Entries),
            Layout::Features => Some(Category::Features),
            Layout::Events => Some(Category::Events),
            Layout::Instances | Layout::Similarities => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn prefix(self) -> &'static str {
        match self {
            Category::Entries => "ent.",
            Category::Features => "feat.",
            Category::Events => "evt.",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.layout(), f)
    }
}

/// What happens to each chunk file the chunker hands over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Raw instances: count into all three categories.
    Count,
    /// Already weighted records of one category: sort directly.
    Sort(Category),
}

/// Completion message of one worker task. Each task deletes its own
/// inputs, so only outputs travel back.
#[derive(Debug)]
enum Done {
    Counted([(Category, PathBuf); 3]),
    Sorted(Category, PathBuf),
    Merged(Category, PathBuf),
}

fn sort_category(category: Category, input: &Path, output: &Path) -> Result<u64> {
    match category {
        Category::Events => sort::sort_file::<TokenPair>(input, output),
        _ => sort::sort_file::<Token>(input, output),
    }
}

fn merge_category(category: Category, left: &Path, right: &Path, output: &Path) -> Result<u64> {
    match category {
        Category::Events => sort::merge_files::<TokenPair>(left, right, output),
        _ => sort::merge_files::<Token>(left, right, output),
    }
}

/// Worker pool plus the per-category merge queues.
pub struct Reducer {
    pool: rayon::ThreadPool,
    temp: Arc<TempFiles>,
    done_tx: Sender<Result<Done>>,
    done_rx: Receiver<Result<Done>>,
    queues: [VecDeque<PathBuf>; 3],
    pending: usize,
    failure: Option<Error>,
}

impl Reducer {
    pub fn new(threads: usize, temp: Arc<TempFiles>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("reduce-{}", i))
            .build()
            .map_err(|e| Error::config(format!("cannot start worker pool: {}", e)))?;
        let (done_tx, done_rx) = bounded(threads.max(1) * 4);
        Ok(Reducer {
            pool,
            temp,
            done_tx,
            done_rx,
            queues: Default::default(),
            pending: 0,
            failure: None,
        })
    }

    fn submit<F>(&mut self, name: String, task: F)
    where
        F: FnOnce(&TempFiles) -> Result<Done> + Send + 'static,
    {
        tracing::debug!(task = %name, pending = self.pending, "submitting task");
        self.pending += 1;
        let temp = Arc::clone(&self.temp);
        let tx = self.done_tx.clone();
        self.pool.spawn(move || {
            let result = task(&temp).map_err(|e| Error::task(name, e));
            // The driver owns the receiver until every pending task reports.
            let _ = tx.send(result);
        });
    }

    fn count(&mut self, chunk: PathBuf) {
        self.submit(format!("count {}", chunk.display()), move |temp| {
            let outputs = Category::ALL.map(|c| (c, temp.allocate(&format!("cnt.{}", c.prefix()))));
            count::count_chunk(&chunk, &outputs[0].1, &outputs[1].1, &outputs[2].1)?;
            temp.discard(&chunk)?;
            Ok(Done::Counted(outputs))
        });
    }

    fn sort(&mut self, category: Category, input: PathBuf) {
        self.submit(format!("sort {}", input.display()), move |temp| {
            let output = temp.allocate(&format!("srt.{}", category.prefix()));
            sort_category(category, &input, &output)?;
            temp.discard(&input)?;
            Ok(Done::Sorted(category, output))
        });
    }

    fn merge(&mut self, category: Category, left: PathBuf, right: PathBuf) {
        self.submit(format!("merge {} {}", left.display(), right.display()), move |temp| {
            let output = temp.allocate(&format!("mrg.{}", category.prefix()));
            merge_category(category, &left, &right, &output)?;
            temp.discard(&left)?;
            temp.discard(&right)?;
            Ok(Done::Merged(category, output))
        });
    }

    fn enqueue(&mut self, category: Category, path: PathBuf) {
        let queue = &mut self.queues[category.index()];
        queue.push_back(path);
        if queue.len() >= 2 {
            if let (Some(left), Some(right)) = (queue.pop_front(), queue.pop_front()) {
                self.merge(category, left, right);
            }
        }
    }

    fn handle(&mut self, done: Result<Done>) {
        self.pending -= 1;
        let done = match done {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(error = %e, "task failed");
                if self.failure.is_none() {
                    self.failure = Some(e);
                }
                return;
            }
        };
        if self.failure.is_some() {
            return;
        }
        match done {
            Done::Counted(outputs) => {
                for (category, path) in outputs {
                    self.sort(category, path);
                }
            }
            Done::Sorted(category, path) | Done::Merged(category, path) => self.enqueue(category, path),
        }
    }

    /// Consume chunk files from `chunks` until the chunker hangs up and
    /// every task has reported. Returns the single sorted file left in each
    /// category queue, or `None` for a category that saw no records.
    ///
    /// The first task failure stops chunk intake; outstanding tasks are
    /// still waited for before the failure is returned.
    pub fn drive(&mut self, chunks: Receiver<PathBuf>, route: Route) -> Result<[Option<PathBuf>; 3]> {
        let done_rx = self.done_rx.clone();
        let closed = never();
        let mut chunks = Some(chunks);
        loop {
            let mut hung_up = false;
            // Completed work goes first so the merge tree keeps up with intake.
            while let Ok(done) = done_rx.try_recv() {
                self.handle(done);
            }
            if self.failure.is_some() {
                chunks = None;
            }
            if chunks.is_none() && self.pending == 0 {
                break;
            }
            let intake = chunks.as_ref().unwrap_or(&closed);
            select! {
                recv(done_rx) -> msg => {
                    if let Ok(done) = msg {
                        self.handle(done);
                    }
                }
                recv(intake) -> msg => match msg {
                    Ok(path) => match route {
                        Route::Count => self.count(path),
                        Route::Sort(category) => self.sort(category, path),
                    },
                    Err(_) => hung_up = true,
                },
            }
            if hung_up {
                chunks = None;
            }
        }
        if let Some(e) = self.failure.take() {
            return Err(e);
        }
        let mut out: [Option<PathBuf>; 3] = Default::default();
        for category in Category::ALL {
            let queue = &mut self.queues[category.index()];
            if queue.len() > 1 {
                return Err(Error::config(format!("{} merge queue holds {} files after the last task", category, queue.len())));
            }
            out[category.index()] = queue.pop_front();
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn chunk_files(temp: &TempFiles, chunks: &[&str]) -> Vec<PathBuf> {
        chunks
            .iter()
            .map(|text| {
                let p = temp.allocate("chunk.");
                std::fs::write(&p, text).unwrap();
                p
            })
            .collect()
    }

    fn run(chunks: &[&str], route: Route, threads: usize) -> (tempfile::TempDir, Arc<TempFiles>, [Option<PathBuf>; 3]) {
        let dir = tempfile::tempdir().unwrap();
        let temp = Arc::new(TempFiles::new(dir.path(), false).unwrap());
        let files = chunk_files(&temp, chunks);
        let mut reducer = Reducer::new(threads, Arc::clone(&temp)).unwrap();
        let (tx, rx) = bounded(2);
        let feeder = thread::spawn(move || {
            for f in files {
                tx.send(f).unwrap();
            }
        });
        let out = reducer.drive(rx, route).unwrap();
        feeder.join().unwrap();
        (dir, temp, out)
    }

    fn read(path: &Option<PathBuf>) -> String {
        std::fs::read_to_string(path.as_ref().unwrap()).unwrap()
    }

    #[test]
    fn counts_and_merges_every_chunk() {
        let (_dir, temp, out) = run(&["0\t1\n1\t1\n", "0\t2\n", "0\t1\n2\t2\n", "1\t1\n"], Route::Count, 3);
        assert_eq!(read(&out[0]), "0\t3\n1\t2\n2\t1\n");
        assert_eq!(read(&out[1]), "1\t4\n2\t2\n");
        assert_eq!(read(&out[2]), "0\t1\t2\n0\t2\t1\n1\t1\t2\n2\t2\t1\n");
        // Only the three results are left behind.
        assert_eq!(std::fs::read_dir(temp.dir()).unwrap().count(), 3);
    }

    #[test]
    fn sort_route_fills_only_its_category() {
        let (_dir, _, out) = run(&["5\t1\n2\t1\n", "2\t0.5\n"], Route::Sort(Category::Features), 2);
        assert!(out[0].is_none() && out[2].is_none());
        assert_eq!(read(&out[1]), "2\t1.5\n5\t1\n");
    }

    #[test]
    fn no_chunks_means_no_outputs() {
        let (_dir, _, out) = run(&[], Route::Count, 1);
        assert!(out.iter().all(Option::is_none));
    }

    #[test]
    fn task_failures_are_reported_once_everything_settles() {
        let dir = tempfile::tempdir().unwrap();
        let temp = Arc::new(TempFiles::new(dir.path(), false).unwrap());
        let mut reducer = Reducer::new(2, temp).unwrap();
        let (tx, rx) = bounded(2);
        tx.send(dir.path().join("does-not-exist")).unwrap();
        drop(tx);
        assert!(matches!(reducer.drive(rx, Route::Count), Err(Error::Task { .. })));
    }
}
