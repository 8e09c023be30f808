use std::path::Path;

use rayon::prelude::*;

use crate::{
    codec::{SinkBuilder, SourceBuilder},
    error::Result,
    record::{Record, RecordSink, RecordSource, Sink, WeightSumReducerSink, Weighted},
};

/// Key types the pipeline sorts on.
pub trait SortKey: Record + Ord + Copy + Send + Sync + 'static {}

impl<T: Record + Ord + Copy + Send + Sync + 'static> SortKey for T {}

fn reader<T: SortKey>(path: &Path) -> Result<RecordSource<Weighted<T>>> {
    Ok(RecordSource::new(SourceBuilder::new(path).build()?))
}

type Writer<T> = WeightSumReducerSink<T, Counting<RecordSink<Weighted<T>>>>;

fn writer<T: SortKey>(path: &Path) -> Result<Writer<T>> {
    Ok(WeightSumReducerSink::new(Counting { inner: RecordSink::new(SinkBuilder::new(path).build()?), written: 0 }))
}

/// Finish `out` and return how many records reached the file.
fn close<T: SortKey>(mut out: Writer<T>) -> Result<u64> {
    out.finish()?;
    Ok(out.into_inner().written)
}

/// Load an intermediate file, sort it by key and write it back out with
/// equal keys merged. Returns the number of records written.
pub fn sort_file<T: SortKey>(input: &Path, output: &Path) -> Result<u64> {
    let mut records = reader::<T>(input)?.read_all()?;
    let read = records.len();
    records.par_sort_unstable_by(|a, b| a.record.cmp(&b.record));
    let mut out = writer::<T>(output)?;
    for r in &records {
        out.write(r)?;
    }
    let written = close(out)?;
    tracing::debug!(input = %input.display(), read, written, "sorted chunk");
    Ok(written)
}

/// Linear merge of two sorted intermediate files, summing the weights of
/// keys present in both. Returns the number of records written.
pub fn merge_files<T: SortKey>(left: &Path, right: &Path, output: &Path) -> Result<u64> {
    let mut a = reader::<T>(left)?;
    let mut b = reader::<T>(right)?;
    let mut out = writer::<T>(output)?;
    let (mut x, mut y) = (a.read()?, b.read()?);
    loop {
        match (x, y) {
            (Some(l), Some(r)) if l.record <= r.record => {
                out.write(&l)?;
                x = a.read()?;
            }
            (Some(_), Some(r)) => {
                out.write(&r)?;
                y = b.read()?;
            }
            (Some(l), None) => {
                out.write(&l)?;
                x = a.read()?;
            }
            (None, Some(r)) => {
                out.write(&r)?;
                y = b.read()?;
            }
            (None, None) => break,
        }
    }
    let written = close(out)?;
    tracing::debug!(left = %left.display(), right = %right.display(), written, "merged");
    Ok(written)
}

/// Counts records on their way to `inner`.
struct Counting<K> {
    inner: K,
    written: u64,
}

impl<R, K: Sink<R>> Sink<R> for Counting<K> {
    fn write(&mut self, record: &R) -> Result<()> {
        self.written += 1;
        self.inner.write(record)
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.finish()
    }
}
