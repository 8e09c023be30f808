use std::{fmt, path::PathBuf, sync::Arc};

use crossbeam_channel::bounded;
use serde::Serialize;

use crate::{
    error::{Error, Result},
    external::{sort::SortKey, Category, ChunkStats, Chunker, Reducer, Route, DEFAULT_CHUNK_SIZE},
    jobs,
    record::{Format, Layout, RecordSource, Token, TokenPair, Vocabulary, Weighted},
    utils::{progress::ProgressListener, temp::TempFiles},
};

/// Sorts one weighted file by key, summing the weights of repeated keys.
///
/// String columns are interned on the way in, so string files come out in
/// enumeration order: the order in which each string was first seen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// `Entries`, `Features` or `Events`.
    pub layout: Layout,
    pub entries_index: Option<PathBuf>,
    pub features_index: Option<PathBuf>,
    pub combined: bool,
    pub format: Format,
    pub chunk_size: usize,
    pub threads: usize,
    pub temp_dir: PathBuf,
    pub keep_temporary: bool,
    pub skip_malformed: bool,
    pub charset: String,
}

impl SortConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, layout: Layout) -> Self {
        SortConfig {
            input: input.into(),
            output: output.into(),
            layout,
            entries_index: None,
            features_index: None,
            combined: false,
            format: Format::strings(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            threads: jobs::default_threads(),
            temp_dir: jobs::default_temp_dir(),
            keep_temporary: false,
            skip_malformed: true,
            charset: jobs::CHARSET.to_owned(),
        }
    }

    fn category(&self) -> Result<Category> {
        Category::of(self.layout)
            .ok_or_else(|| Error::config(format!("cannot sort {} files; expected entries, features or events", self.layout)))
    }

    pub fn validate(&self) -> Result<()> {
        jobs::check_charset(&self.charset)?;
        jobs::check_input("input", &self.input)?;
        jobs::check_distinct(&[("input", &self.input), ("output", &self.output)])?;
        jobs::check_positive("chunk size", self.chunk_size)?;
        jobs::check_positive("threads", self.threads)?;
        self.category()?;
        self.format.validate(self.layout)
    }

    pub fn run(&self) -> Result<ChunkStats> {
        self.run_with(&[])
    }

    pub fn run_with(&self, listeners: &[Arc<dyn ProgressListener>]) -> Result<ChunkStats> {
        self.validate()?;
        tracing::info!(config = %self, "starting sort");
        let category = self.category()?;
        let mut progress = jobs::progress("sort", listeners);
        jobs::tracked(&mut progress, |progress| {
            let temp = Arc::new(TempFiles::new(&self.temp_dir, self.keep_temporary)?);
            let mut vocabulary =
                Vocabulary::open(self.entries_index.as_deref(), self.features_index.as_deref(), self.combined)?;
            let (sorted, stats) = match category {
                Category::Events => self.reduce::<TokenPair>(category, &temp, &mut vocabulary)?,
                _ => self.reduce::<Token>(category, &temp, &mut vocabulary)?,
            };
            progress.update(80.0, format!("{} chunks reduced", stats.chunks));
            if !self.format.is_enumerated() {
                vocabulary.save(self.entries_index.as_deref(), self.features_index.as_deref())?;
            }
            jobs::publish(sorted.as_deref(), &self.output, self.layout, &self.format, &vocabulary.freeze())?;
            if let Some(f) = &sorted {
                temp.discard(f)?;
            }
            Ok(stats)
        })
    }

    fn reduce<T: SortKey>(
        &self,
        category: Category,
        temp: &Arc<TempFiles>,
        vocabulary: &mut Vocabulary,
    ) -> Result<(Option<PathBuf>, ChunkStats)> {
        let mut reducer = Reducer::new(self.threads, Arc::clone(temp))?;
        let (chunk_tx, chunk_rx) = bounded(2);
        let (reduced, chunked) = std::thread::scope(|scope| {
            let temp: &TempFiles = temp;
            let chunker = scope.spawn(move || -> Result<ChunkStats> {
                let source = self.format.source(&self.input, self.layout, vocabulary.writers(), self.combined)?;
                let mut records: RecordSource<Weighted<T>, _> =
                    RecordSource::new(source).skip_malformed(self.skip_malformed);
                let chunker = Chunker { layout: self.layout, chunk_size: self.chunk_size, temp, prefix: "chunk." };
                chunker.run(&mut records, &chunk_tx)
            });
            let reduced = reducer.drive(chunk_rx, Route::Sort(category));
            let chunked = chunker.join().unwrap_or_else(|_| Err(Error::config("chunker thread panicked")));
            (reduced, chunked)
        });
        let mut finals = reduced?;
        Ok((finals[category as usize].take(), chunked?))
    }
}

impl fmt::Display for SortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} (chunk size {}, {} threads)",
            self.layout,
            self.input.display(),
            self.output.display(),
            self.chunk_size,
            self.threads
        )
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn config(dir: &std::path::Path, layout: Layout, input: &str) -> SortConfig {
        fs::write(dir.join("in"), input).unwrap();
        let mut c = SortConfig::new(dir.join("in"), dir.join("out"), layout);
        c.temp_dir = dir.join("tmp");
        c.threads = 2;
        c.chunk_size = 2;
        c.format = Format::ENUMERATED;
        c
    }

    #[test]
    fn sorts_and_sums_enumerated_events() {
        let dir = tempfile::tempdir().unwrap();
        let c = config(dir.path(), Layout::Events, "4\t1\t1\n0\t3\t2\n4\t1\t0.5\n0\t1\t1\n2\t2\t2\n");
        let stats = c.run().unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(fs::read_to_string(&c.output).unwrap(), "0\t1\t1\n0\t3\t2\n2\t2\t2\n4\t1\t1.5\n");
    }

    #[test]
    fn sorts_string_features_by_first_appearance() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = config(dir.path(), Layout::Features, "red\t1\nblue\t2\nred\t3\ngreen\t1\nblue\t1\n");
        c.format = Format::strings();
        c.run().unwrap();
        assert_eq!(fs::read_to_string(&c.output).unwrap(), "red\t4\nblue\t3\ngreen\t1\n");
    }

    #[test]
    fn similarity_files_cannot_be_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let c = config(dir.path(), Layout::Similarities, "0\t1\t0.5\n");
        assert!(matches!(c.validate(), Err(Error::Configuration(_))));
    }
}
