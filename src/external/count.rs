use std::path::Path;

use ahash::AHashMap;

use crate::{
    codec::{SinkBuilder, SourceBuilder},
    error::Result,
    record::{Record, RecordSink, RecordSource, Sink, Token, TokenPair, Weighted},
};

/// Per-chunk frequency tables.
#[derive(Debug, Default)]
pub struct Tally {
    pub entries: AHashMap<u32, f64>,
    pub features: AHashMap<u32, f64>,
    pub events: AHashMap<TokenPair, f64>,
}

impl Tally {
    pub fn observe(&mut self, pair: TokenPair, weight: f64) {
        *self.entries.entry(pair.first).or_insert(0.0) += weight;
        *self.features.entry(pair.second).or_insert(0.0) += weight;
        *self.events.entry(pair).or_insert(0.0) += weight;
    }
}

fn dump<T, I>(path: &Path, records: I) -> Result<()>
where
    T: Record,
    I: IntoIterator<Item = (T, f64)>,
{
    let mut sink: RecordSink<Weighted<T>> = RecordSink::new(SinkBuilder::new(path).build()?);
    for (record, weight) in records {
        sink.write(&Weighted::new(record, weight))?;
    }
    sink.finish()
}

/// Count one enumerated instances chunk into three unsorted files.
pub fn count_chunk(chunk: &Path, entries: &Path, features: &Path, events: &Path) -> Result<u64> {
    let mut source: RecordSource<TokenPair> = RecordSource::new(SourceBuilder::new(chunk).build()?);
    let mut tally = Tally::default();
    let mut n = 0u64;
    while let Some(pair) = source.read()? {
        tally.observe(pair, 1.0);
        n += 1;
    }
    dump(entries, tally.entries.into_iter().map(|(k, w)| (Token(k), w)))?;
    dump(features, tally.features.into_iter().map(|(k, w)| (Token(k), w)))?;
    dump(events, tally.events)?;
    tracing::debug!(chunk = %chunk.display(), instances = n, "counted chunk");
    Ok(n)
}
