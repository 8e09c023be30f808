//! Top-level jobs. Each job is a plain config struct that validates itself
//! eagerly and then runs the pipeline it describes.
pub mod allpairs;
pub mod convert;
pub mod count;
pub mod sort;

use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    codec::{
        builder::{BoxSink, BoxSource},
        DataSink,
    },
    error::{Error, Result},
    record::{Format, FrozenVocabulary, Layout, Record, RecordSink, RecordSource, Sink},
    utils::{
        enumerator::Enumerator,
        progress::{LoggingProgressListener, Progress, ProgressListener},
    },
};

pub use allpairs::AllPairsConfig;
pub use convert::ConvertConfig;
pub use count::{CountConfig, CountStats};
pub use sort::SortConfig;

/// The only character set the codec reads and writes.
pub const CHARSET: &str = "UTF-8";

pub(crate) fn check_charset(charset: &str) -> Result<()> {
    let normalized = charset.trim().to_ascii_lowercase().replace(['-', '_'], "");
    if normalized == "utf8" {
        Ok(())
    } else {
        Err(Error::config(format!("unsupported charset \"{}\"; only {} is supported", charset, CHARSET)))
    }
}

/// The file must exist and be readable.
pub(crate) fn check_input(what: &str, path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::config(format!("{} file {} does not exist", what, path.display())));
    }
    File::open(path)
        .map(drop)
        .map_err(|e| Error::config(format!("{} file {} is not readable: {}", what, path.display(), e)))
}

/// No two of `paths` may name the same file.
pub(crate) fn check_distinct(paths: &[(&str, &Path)]) -> Result<()> {
    for (i, (a, pa)) in paths.iter().enumerate() {
        for (b, pb) in &paths[i + 1..] {
            if pa == pb {
                return Err(Error::config(format!("{} and {} are both {}", a, b, pa.display())));
            }
        }
    }
    Ok(())
}

pub(crate) fn check_positive(what: &str, value: usize) -> Result<()> {
    if value < 1 {
        return Err(Error::config(format!("{} must be at least 1, got {}", what, value)));
    }
    Ok(())
}

pub(crate) fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("distsim")
}

pub(crate) fn default_threads() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// A no-dictionary list, for chains whose columns are all enumerated.
pub(crate) fn no_dictionaries() -> Vec<Arc<Enumerator>> {
    Vec::new()
}

/// Progress for `task`, reported through `tracing` and any extra listeners.
pub(crate) fn progress(task: &str, listeners: &[Arc<dyn ProgressListener>]) -> Progress {
    let mut p = Progress::new(task).with_listener(Arc::new(LoggingProgressListener));
    for l in listeners {
        p.add_listener(Arc::clone(l));
    }
    p
}

/// Run `job` under `progress`, marking it completed or failed.
pub(crate) fn tracked<T>(progress: &mut Progress, job: impl FnOnce(&mut Progress) -> Result<T>) -> Result<T> {
    progress.start()?;
    match job(progress) {
        Ok(v) => {
            progress.complete()?;
            Ok(v)
        }
        Err(e) => {
            progress.fail(e.to_string())?;
            Err(e)
        }
    }
}

/// Copy every record of type `R` from `source` to `sink`.
pub(crate) fn transcode<R: Record>(source: BoxSource<'_>, sink: BoxSink<'_>, skip_malformed: bool) -> Result<u64> {
    let mut from: RecordSource<R, BoxSource<'_>> = RecordSource::new(source).skip_malformed(skip_malformed);
    let mut to: RecordSink<R, BoxSink<'_>> = RecordSink::new(sink);
    let mut n = 0u64;
    while let Some(r) = from.read()? {
        to.write(&r)?;
        n += 1;
    }
    to.finish()?;
    if from.skipped() > 0 {
        tracing::warn!(skipped = from.skipped(), "malformed records dropped");
    }
    Ok(n)
}

/// Copy by layout, picking the record type that matches it.
pub(crate) fn transcode_layout(
    layout: Layout,
    source: BoxSource<'_>,
    sink: BoxSink<'_>,
    skip_malformed: bool,
) -> Result<u64> {
    use crate::record::{Token, TokenPair, Weighted};
    match layout {
        Layout::Instances => transcode::<TokenPair>(source, sink, skip_malformed),
        Layout::Entries | Layout::Features => transcode::<Weighted<Token>>(source, sink, skip_malformed),
        Layout::Events | Layout::Similarities => transcode::<Weighted<TokenPair>>(source, sink, skip_malformed),
    }
}

/// Write an enumerated intermediate file, or nothing, to its final
/// destination in `format`, decoding ids through `vocabulary`.
pub(crate) fn publish(
    from: Option<&Path>,
    to: &Path,
    layout: Layout,
    format: &Format,
    vocabulary: &FrozenVocabulary,
) -> Result<u64> {
    let sink = format.sink(to, layout, vocabulary.readers(), vocabulary.is_combined())?;
    let n = match from {
        Some(path) => {
            let source = Format::ENUMERATED.source(path, layout, no_dictionaries(), false)?;
            transcode_layout(layout, source, sink, false)?
        }
        None => {
            let mut sink = sink;
            sink.finish()?;
            0
        }
    };
    tracing::info!(output = %to.display(), records = n, "published {}", layout);
    Ok(n)
}
