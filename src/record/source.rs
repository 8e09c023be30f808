use std::marker::PhantomData;

use crate::{
    codec::{builder::BoxSource, DataSource, Tell},
    error::Result,
    record::{Record, Token, TokenPair, Weighted},
};

/// Running statistics over the records a source has produced.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightStats {
    pub count: u64,
    pub weight_sum: f64,
    pub weight_max: f64,
    /// One past the largest leading id seen.
    pub cardinality: u32,
}

impl WeightStats {
    #[inline]
    fn observe<R: Record>(&mut self, record: &R) {
        self.count += 1;
        if let Some(w) = record.weight() {
            self.weight_sum += w;
            if self.count == 1 || w > self.weight_max {
                self.weight_max = w;
            }
        }
        self.cardinality = self.cardinality.max(record.key().saturating_add(1));
    }
}

/// Typed reader over a codec chain.
///
/// On a malformed record the rest of it is skipped before the error is
/// returned, so the caller may either propagate the error or log it and
/// keep reading. With [`skip_malformed`](Self::skip_malformed) the source
/// does the logging itself.
pub struct RecordSource<R, S = BoxSource<'static>> {
    inner: S,
    skip_malformed: bool,
    skipped: u64,
    stats: WeightStats,
    _record: PhantomData<fn() -> R>,
}

pub type TokenSource<S = BoxSource<'static>> = RecordSource<Token, S>;
pub type TokenPairSource<S = BoxSource<'static>> = RecordSource<TokenPair, S>;
pub type WeightedTokenSource<S = BoxSource<'static>> = RecordSource<Weighted<Token>, S>;
pub type WeightedTokenPairSource<S = BoxSource<'static>> = RecordSource<Weighted<TokenPair>, S>;

impl<R: Record, S: DataSource> RecordSource<R, S> {
    pub fn new(inner: S) -> Self {
        RecordSource { inner, skip_malformed: false, skipped: 0, stats: WeightStats::default(), _record: PhantomData }
    }

    pub fn skip_malformed(mut self, skip: bool) -> Self {
        self.skip_malformed = skip;
        self
    }

    #[inline]
    pub fn has_next(&mut self) -> Result<bool> {
        self.inner.has_next()
    }

    /// Next record, or `None` at end of stream.
    pub fn read(&mut self) -> Result<Option<R>> {
        loop {
            if !self.inner.has_next()? {
                return Ok(None);
            }
            match self.read_one() {
                Ok(record) => {
                    self.stats.observe(&record);
                    return Ok(Some(record));
                }
                Err(e) if e.is_recoverable() => {
                    self.inner.skip_record()?;
                    self.skipped += 1;
                    if !self.skip_malformed {
                        return Err(e);
                    }
                    tracing::warn!(error = %e, "skipping malformed record");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn read_one(&mut self) -> Result<R> {
        let record = R::read(&mut self.inner)?;
        self.inner.end_of_record()?;
        Ok(record)
    }

    #[inline]
    pub fn position(&mut self) -> Result<Tell> {
        self.inner.position()
    }

    #[inline]
    pub fn seek(&mut self, tell: Tell) -> Result<()> {
        self.inner.seek(tell)
    }

    #[inline]
    pub fn progress(&self) -> f64 {
        self.inner.progress()
    }

    /// Malformed records skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn stats(&self) -> &WeightStats {
        &self.stats
    }

    /// Drain the source, returning every record.
    pub fn read_all(&mut self) -> Result<Vec<R>> {
        let mut out = Vec::new();
        while let Some(r) = self.read()? {
            out.push(r);
        }
        Ok(out)
    }
}

impl<R: Record, S: DataSource> Iterator for RecordSource<R, S> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{
        codec::{compact::CompactSource, tsv::TsvSource},
        Error,
    };

    type Mem = TsvSource<Cursor<Vec<u8>>>;

    fn mem(text: &str) -> Mem {
        TsvSource::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn weighted_tokens_keep_statistics() {
        let mut src: WeightedTokenSource<Mem> = RecordSource::new(mem("0\t2\n3\t5.5\n1\t0.5\n"));
        let all = src.read_all().unwrap();
        assert_eq!(all.len(), 3);
        let stats = src.stats();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.weight_sum, 8.0);
        assert_eq!(stats.weight_max, 5.5);
        assert_eq!(stats.cardinality, 4);
    }

    #[test]
    fn malformed_records_propagate_or_skip() {
        let text = "0\t1\t1\nbad\t1\t1\n2\t3\t1\n";

        let mut strict: WeightedTokenPairSource<Mem> = RecordSource::new(mem(text));
        assert!(strict.read().unwrap().is_some());
        assert!(matches!(strict.read(), Err(Error::MalformedRecord { .. })));
        let next = strict.read().unwrap().unwrap();
        assert_eq!(next.record, TokenPair::new(2, 3));

        let mut lenient: WeightedTokenPairSource<Mem> = RecordSource::new(mem(text)).skip_malformed(true);
        let all: Vec<_> = lenient.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(lenient.skipped(), 1);
    }

    #[test]
    fn resumes_after_a_captured_position() {
        let text = "0\t1\t1\t2\t1\n1\t0\t4\n2\t2\t1\t3\t1\t4\t2\n";
        let open = || -> WeightedTokenPairSource<CompactSource<Mem>> { RecordSource::new(CompactSource::new(mem(text), 3)) };
        let mut src = open();
        let all = src.read_all().unwrap();
        assert_eq!(all.len(), 6);

        for k in 0..all.len() {
            let mut first = open();
            for _ in 0..k {
                first.read().unwrap();
            }
            let tell = first.position().unwrap();
            let mut again = open();
            again.seek(tell).unwrap();
            let rest = again.read_all().unwrap();
            let expected: Vec<_> = all[k..].to_vec();
            assert_eq!(rest.len(), expected.len());
            for (a, b) in rest.iter().zip(&expected) {
                assert_eq!(a.record, b.record);
                assert_eq!(a.weight, b.weight);
            }
        }
    }
}
