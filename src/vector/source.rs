use crate::{
    codec::{builder::BoxSource, DataSource, Tell},
    error::{Error, Result},
    record::{source::WeightedTokenPairSource, RecordSource, TokenPair, Weighted},
    vector::SparseDoubleVector,
};

/// An entry id together with its feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: u32,
    pub vector: SparseDoubleVector,
}

/// Groups a sorted events stream into one vector per entry.
///
/// Keeps one record of lookahead; [`position`](Self::position) reports the
/// start of the next unread entry, so a saved position always resumes on an
/// entry boundary.
pub struct EventsVectorSource<S = BoxSource<'static>> {
    source: WeightedTokenPairSource<S>,
    pending: Option<(Tell, Weighted<TokenPair>)>,
    previous: Option<u32>,
}

impl<S: DataSource> EventsVectorSource<S> {
    pub fn new(inner: S) -> Self {
        EventsVectorSource { source: RecordSource::new(inner), pending: None, previous: None }
    }

    fn fill(&mut self) -> Result<()> {
        if self.pending.is_none() && self.source.has_next()? {
            let tell = self.source.position()?;
            if let Some(record) = self.source.read()? {
                self.pending = Some((tell, record));
            }
        }
        Ok(())
    }

    pub fn has_next(&mut self) -> Result<bool> {
        self.fill()?;
        Ok(self.pending.is_some())
    }

    pub fn position(&mut self) -> Result<Tell> {
        match &self.pending {
            Some((tell, _)) => Ok(tell.clone()),
            None => self.source.position(),
        }
    }

    pub fn seek(&mut self, tell: Tell) -> Result<()> {
        self.pending = None;
        self.previous = None;
        self.source.seek(tell)
    }

    pub fn progress(&self) -> f64 {
        self.source.progress()
    }

    /// Next entry, or `None` at end of stream.
    pub fn read(&mut self) -> Result<Option<Entry>> {
        self.fill()?;
        let (tell, first) = match self.pending.take() {
            Some(p) => p,
            None => return Ok(None),
        };
        let id = first.record.first;
        if let Some(prev) = self.previous {
            if id <= prev {
                return Err(Error::malformed(
                    tell,
                    format!("entry {} follows entry {}; events must be sorted and grouped by entry", id, prev),
                ));
            }
        }
        let mut features = vec![(first.record.second, first.weight)];
        loop {
            self.fill()?;
            match &self.pending {
                Some((_, next)) if next.record.first == id => {
                    features.push((next.record.second, next.weight));
                    self.pending = None;
                }
                _ => break,
            }
        }
        self.previous = Some(id);
        let vector = SparseDoubleVector::from_entries(features)
            .map_err(|e| Error::malformed(tell, format!("entry {}: {}", id, e)))?;
        Ok(Some(Entry { id, vector }))
    }

    /// Drain the source into memory.
    pub fn read_all(&mut self) -> Result<Vec<Entry>> {
        let mut out = Vec::new();
        while let Some(e) = self.read()? {
            out.push(e);
        }
        Ok(out)
    }
}

impl<S: DataSource> Iterator for EventsVectorSource<S> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::{compact::CompactSource, tsv::TsvSource};

    type Mem = CompactSource<TsvSource<Cursor<Vec<u8>>>>;

    fn open(text: &str) -> EventsVectorSource<Mem> {
        EventsVectorSource::new(CompactSource::new(TsvSource::new(Cursor::new(text.as_bytes().to_vec())), 3))
    }

    #[test]
    fn groups_records_by_entry() {
        let mut src = open("0\t1\t2\n0\t2\t1\n1\t2\t3\n");
        let all = src.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, 0);
        assert_eq!(all[0].vector.keys(), &[1, 2]);
        assert_eq!(all[0].vector.sum(), 3.0);
        assert_eq!(all[1].id, 1);
        assert_eq!(all[1].vector.values(), &[3.0]);
    }

    #[test]
    fn compact_and_verbose_give_the_same_vectors() {
        let verbose = open("0\t1\t2\n0\t2\t1\n1\t2\t3\n").read_all().unwrap();
        let compact = open("0\t1\t2\t2\t1\n1\t2\t3\n").read_all().unwrap();
        assert_eq!(verbose, compact);
    }

    #[test]
    fn positions_fall_on_entry_boundaries() {
        let text = "0\t1\t2\t2\t1\n3\t0\t1\n5\t1\t1\t4\t4\n";
        let mut src = open(text);
        let mut tells = Vec::new();
        let mut all = Vec::new();
        while src.has_next().unwrap() {
            tells.push(src.position().unwrap());
            all.push(src.read().unwrap().unwrap());
        }
        for (k, tell) in tells.into_iter().enumerate() {
            let mut again = open(text);
            again.seek(tell).unwrap();
            assert_eq!(again.read_all().unwrap(), all[k..].to_vec());
        }
    }

    #[test]
    fn ungrouped_entries_are_malformed() {
        let mut src = open("1\t1\t1\n0\t1\t1\n");
        src.read().unwrap();
        assert!(matches!(src.read(), Err(Error::MalformedRecord { .. })));
    }

    #[test]
    fn non_finite_weights_are_malformed() {
        let mut src = open("0\t1\tNaN\n1\t1\tinf\n2\t1\t1\t3\t-inf\n4\t1\t2\n");
        for _ in 0..3 {
            let err = src.read().unwrap_err();
            assert!(err.is_recoverable(), "{}", err);
        }
        let last = src.read().unwrap().unwrap();
        assert_eq!((last.id, last.vector.sum()), (4, 2.0));
        assert!(src.read().unwrap().is_none());
    }
}
