use std::{fmt, path::PathBuf, sync::Arc};

use crossbeam_channel::bounded;
use serde::Serialize;

use crate::{
    error::{Error, Result},
    external::{Category, ChunkStats, Chunker, Reducer, Route, DEFAULT_CHUNK_SIZE},
    jobs,
    record::{Format, Layout, RecordSource, TokenPair, Vocabulary},
    utils::{progress::ProgressListener, temp::TempFiles},
};

/// Turns a file of raw `entry feature` observations into the three sorted
/// frequency files: entries, features and events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountConfig {
    pub input: PathBuf,
    pub entries: PathBuf,
    pub features: PathBuf,
    pub events: PathBuf,
    /// Enumerator tables, loaded if present and saved after the run. Only
    /// used for string columns.
    pub entries_index: Option<PathBuf>,
    pub features_index: Option<PathBuf>,
    /// Entries and features share one id space.
    pub combined: bool,
    /// Encoding of the input and of the three outputs.
    pub format: Format,
    pub chunk_size: usize,
    pub threads: usize,
    pub temp_dir: PathBuf,
    pub keep_temporary: bool,
    pub skip_malformed: bool,
    pub charset: String,
}

/// Outcome of a count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CountStats {
    pub chunks: usize,
    pub instances: u64,
    pub skipped: u64,
    pub entries: u64,
    pub features: u64,
    pub events: u64,
}

impl CountConfig {
    pub fn new(input: impl Into<PathBuf>, entries: impl Into<PathBuf>, features: impl Into<PathBuf>, events: impl Into<PathBuf>) -> Self {
        CountConfig {
            input: input.into(),
            entries: entries.into(),
            features: features.into(),
            events: events.into(),
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

    pub fn validate(&self) -> Result<()> {
        jobs::check_charset(&self.charset)?;
        jobs::check_input("input", &self.input)?;
        jobs::check_distinct(&[
            ("input", &self.input),
            ("entries output", &self.entries),
            ("features output", &self.features),
            ("events output", &self.events),
        ])?;
        jobs::check_positive("chunk size", self.chunk_size)?;
        jobs::check_positive("threads", self.threads)?;
        for layout in [Layout::Instances, Layout::Events] {
            self.format.validate(layout)?;
        }
        Ok(())
    }

    pub fn run(&self) -> Result<CountStats> {
        self.run_with(&[])
    }

    pub fn run_with(&self, listeners: &[Arc<dyn ProgressListener>]) -> Result<CountStats> {
        self.validate()?;
        tracing::info!(config = %self, "starting count");
        let mut progress = jobs::progress("count", listeners);
        jobs::tracked(&mut progress, |progress| {
            let temp = Arc::new(TempFiles::new(&self.temp_dir, self.keep_temporary)?);
            let mut vocabulary =
                Vocabulary::open(self.entries_index.as_deref(), self.features_index.as_deref(), self.combined)?;

            let (finals, chunked) = self.reduce(&temp, &mut vocabulary)?;
            progress.update(80.0, format!("{} chunks reduced", chunked.chunks));

            if !self.format.is_enumerated() {
                vocabulary.save(self.entries_index.as_deref(), self.features_index.as_deref())?;
            }
            let vocabulary = vocabulary.freeze();
            let mut written = [0u64; 3];
            for category in Category::ALL {
                let i = category as usize;
                let out = match category {
                    Category::Entries => &self.entries,
                    Category::Features => &self.features,
                    Category::Events => &self.events,
                };
                written[i] = jobs::publish(finals[i].as_deref(), out, category.layout(), &self.format, &vocabulary)?;
                if let Some(f) = &finals[i] {
                    temp.discard(f)?;
                }
            }
            Ok(CountStats {
                chunks: chunked.chunks,
                instances: chunked.records,
                skipped: chunked.skipped,
                entries: written[0],
                features: written[1],
                events: written[2],
            })
        })
    }

    /// Chunk the input on a dedicated thread, which alone may grow the
    /// vocabulary, while the reducer counts, sorts and merges.
    fn reduce(&self, temp: &Arc<TempFiles>, vocabulary: &mut Vocabulary) -> Result<([Option<PathBuf>; 3], ChunkStats)> {
        let mut reducer = Reducer::new(self.threads, Arc::clone(temp))?;
        let (chunk_tx, chunk_rx) = bounded(2);
        let (reduced, chunked) = std::thread::scope(|scope| {
            let temp: &TempFiles = temp;
            let chunker = scope.spawn(move || -> Result<ChunkStats> {
                let source = self.format.source(&self.input, Layout::Instances, vocabulary.writers(), self.combined)?;
                let mut records: RecordSource<TokenPair, _> =
                    RecordSource::new(source).skip_malformed(self.skip_malformed);
                let chunker = Chunker { layout: Layout::Instances, chunk_size: self.chunk_size, temp, prefix: "chunk." };
                chunker.run(&mut records, &chunk_tx)
            });
            let reduced = reducer.drive(chunk_rx, Route::Count);
            let chunked = chunker.join().unwrap_or_else(|_| Err(Error::config("chunker thread panicked")));
            (reduced, chunked)
        });
        let finals = reduced?;
        Ok((finals, chunked?))
    }
}

impl fmt::Display for CountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}, {}, {} ({}, chunk size {}, {} threads)",
            self.input.display(),
            self.entries.display(),
            self.features.display(),
            self.events.display(),
            if self.format.is_enumerated() { "enumerated" } else { "strings" },
            self.chunk_size,
            self.threads
        )
    }
}
