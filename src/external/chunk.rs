use std::{path::PathBuf, sync::Arc};

use crossbeam_channel::Sender;

use crate::{
    codec::DataSource,
    error::{Error, Result},
    record::{Format, Layout, Record, RecordSink, RecordSource, Sink},
    utils::{enumerator::Enumerator, temp::TempFiles},
};

/// What the chunker saw of its input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChunkStats {
    pub chunks: usize,
    pub records: u64,
    pub skipped: u64,
}

/// Splits one input into enumerated chunk files of at most `chunk_size`
/// records each. Every finished chunk is sent down `ready`; a closed
/// channel stops the chunker.
pub struct Chunker<'t> {
    pub layout: Layout,
    pub chunk_size: usize,
    pub temp: &'t TempFiles,
    pub prefix: &'static str,
}

impl<'t> Chunker<'t> {
    pub fn run<R, S>(&self, source: &mut RecordSource<R, S>, ready: &Sender<PathBuf>) -> Result<ChunkStats>
    where
        R: Record,
        S: DataSource,
    {
        let mut stats = ChunkStats::default();
        let mut current: Option<(PathBuf, RecordSink<R>, usize)> = None;
        while let Some(record) = source.read()? {
            if current.is_none() {
                let path = self.temp.allocate(self.prefix);
                let sink = Format::ENUMERATED.sink(&path, self.layout, Vec::<Arc<Enumerator>>::new(), false)?;
                current = Some((path, RecordSink::new(sink), 0));
            }
            if let Some((_, sink, len)) = current.as_mut() {
                sink.write(&record)?;
                *len += 1;
            }
            stats.records += 1;
            if matches!(&current, Some((_, _, len)) if *len >= self.chunk_size) {
                self.hand_over(current.take(), ready, &mut stats)?;
            }
        }
        self.hand_over(current.take(), ready, &mut stats)?;
        stats.skipped = source.skipped();
        tracing::info!(chunks = stats.chunks, records = stats.records, skipped = stats.skipped, "chunking finished");
        Ok(stats)
    }

    fn hand_over<R: Record>(
        &self,
        chunk: Option<(PathBuf, RecordSink<R>, usize)>,
        ready: &Sender<PathBuf>,
        stats: &mut ChunkStats,
    ) -> Result<()> {
        let (path, mut sink, len) = match chunk {
            Some(c) => c,
            None => return Ok(()),
        };
        sink.finish()?;
        stats.chunks += 1;
        tracing::debug!(chunk = %path.display(), records = len, "chunk ready");
        ready.send(path).map_err(|_| Error::config("chunk consumer stopped before the input was exhausted"))
    }
}
