use std::sync::Arc;

use crate::{
    codec::{Carried, DataSink, DataSource, Tell},
    error::{Error, Result},
    utils::enumerator::Enumerator,
};

/// String ↔ id lookup used by the dictionary layer.
///
/// An exclusively borrowed [`Enumerator`] interns unseen strings; a shared
/// one is frozen and reports them as [`Error::UnknownToken`].
pub trait Dictionary {
    fn index(&mut self, value: &str) -> Result<u32>;
    fn value(&self, id: u32) -> Result<&str>;
}

impl Dictionary for &mut Enumerator {
    #[inline]
    fn index(&mut self, value: &str) -> Result<u32> {
        Enumerator::index(self, value)
    }

    #[inline]
    fn value(&self, id: u32) -> Result<&str> {
        Enumerator::value(self, id).ok_or(Error::UnknownId(id))
    }
}

impl Dictionary for Arc<Enumerator> {
    #[inline]
    fn index(&mut self, value: &str) -> Result<u32> {
        self.get(value).ok_or_else(|| Error::UnknownToken(value.to_owned()))
    }

    #[inline]
    fn value(&self, id: u32) -> Result<&str> {
        Enumerator::value(self, id).ok_or(Error::UnknownId(id))
    }
}

fn missing(column: usize, dictionary: usize) -> Error {
    Error::config(format!("column {} names missing dictionary {}", column, dictionary))
}

/// Maps logical columns to dictionaries.
///
/// `slots[c] == Some(d)` routes column `c` through `dictionaries[d]`; columns
/// past the end of `slots` pass through untouched. Entries and features
/// share one dictionary when both slots point at the same index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slots(Vec<Option<usize>>);

impl Slots {
    pub fn new(slots: Vec<Option<usize>>) -> Self {
        Slots(slots)
    }

    /// Both columns through one dictionary.
    pub fn combined() -> Self {
        Slots(vec![Some(0), Some(0)])
    }

    /// Column 0 through dictionary 0, column 1 through dictionary 1.
    pub fn separate() -> Self {
        Slots(vec![Some(0), Some(1)])
    }

    #[inline]
    fn get(&self, column: usize) -> Option<usize> {
        self.0.get(column).copied().flatten()
    }

    /// Whether `column` goes through a dictionary.
    #[inline]
    pub fn maps(&self, column: usize) -> bool {
        self.get(column).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    /// Columns that go through a dictionary.
    pub fn mapped(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().filter_map(|(c, d)| d.map(|_| c))
    }
}

/// Reads string columns and presents them as ids.
pub struct DictionarySource<S, D> {
    inner: S,
    dictionaries: Vec<D>,
    slots: Slots,
    column: usize,
}

impl<S: DataSource, D: Dictionary> DictionarySource<S, D> {
    pub fn new(inner: S, dictionaries: Vec<D>, slots: Slots) -> Self {
        DictionarySource { inner, dictionaries, slots, column: 0 }
    }

    pub fn into_dictionaries(self) -> Vec<D> {
        self.dictionaries
    }
}

impl<S: DataSource, D: Dictionary> DataSource for DictionarySource<S, D> {
    fn read_int(&mut self) -> Result<i64> {
        let value = match self.slots.get(self.column) {
            Some(d) => {
                let s = self.inner.read_string()?;
                let column = self.column;
                let dict = self.dictionaries.get_mut(d).ok_or_else(|| missing(column, d))?;
                dict.index(&s)? as i64
            }
            None => self.inner.read_int()?,
        };
        self.column += 1;
        Ok(value)
    }

    fn read_string(&mut self) -> Result<String> {
        let s = self.inner.read_string()?;
        self.column += 1;
        Ok(s)
    }

    fn read_double(&mut self) -> Result<f64> {
        let d = self.inner.read_double()?;
        self.column += 1;
        Ok(d)
    }

    fn end_of_record(&mut self) -> Result<()> {
        self.inner.end_of_record()?;
        self.column = 0;
        Ok(())
    }

    fn is_end_of_record_next(&mut self) -> Result<bool> {
        self.inner.is_end_of_record_next()
    }

    fn has_next(&mut self) -> Result<bool> {
        self.inner.has_next()
    }

    fn skip_record(&mut self) -> Result<()> {
        self.inner.skip_record()?;
        self.column = 0;
        Ok(())
    }

    fn position(&mut self) -> Result<Tell> {
        Ok(self.inner.position()?.push(Carried::Int(self.column as i64)))
    }

    fn seek(&mut self, tell: Tell) -> Result<()> {
        let (rest, column) = tell.pop_int()?;
        self.inner.seek(rest)?;
        self.column = column.max(0) as usize;
        Ok(())
    }

    fn progress(&self) -> f64 {
        self.inner.progress()
    }
}

/// Writes id columns as their strings.
pub struct DictionarySink<S, D> {
    inner: S,
    dictionaries: Vec<D>,
    slots: Slots,
    column: usize,
}

impl<S: DataSink, D: Dictionary> DictionarySink<S, D> {
    pub fn new(inner: S, dictionaries: Vec<D>, slots: Slots) -> Self {
        DictionarySink { inner, dictionaries, slots, column: 0 }
    }
}

impl<S: DataSink, D: Dictionary> DataSink for DictionarySink<S, D> {
    fn write_int(&mut self, value: i64) -> Result<()> {
        match self.slots.get(self.column) {
            Some(d) => {
                let column = self.column;
                let dict = self.dictionaries.get(d).ok_or_else(|| missing(column, d))?;
                let id = u32::try_from(value).map_err(|_| Error::config(format!("{} is not a token id", value)))?;
                self.inner.write_string(dict.value(id)?)?;
            }
            None => self.inner.write_int(value)?,
        }
        self.column += 1;
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> Result<()> {
        self.inner.write_string(value)?;
        self.column += 1;
        Ok(())
    }

    fn write_double(&mut self, value: f64) -> Result<()> {
        self.inner.write_double(value)?;
        self.column += 1;
        Ok(())
    }

    fn end_of_record(&mut self) -> Result<()> {
        self.inner.end_of_record()?;
        self.column = 0;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::tsv::{TsvSink, TsvSource};

    #[test]
    fn interns_while_reading_and_decodes_while_writing() {
        let text = "apple\tred\t2\npear\tred\t1\napple\tround\t3\n";
        let mut entries = Enumerator::new();
        let mut features = Enumerator::new();
        let mut ids = Vec::new();
        {
            let mut src = DictionarySource::new(
                TsvSource::new(Cursor::new(text.as_bytes().to_vec())),
                vec![&mut entries, &mut features],
                Slots::separate(),
            );
            while src.has_next().unwrap() {
                let e = src.read_int().unwrap();
                let f = src.read_int().unwrap();
                let w = src.read_double().unwrap();
                src.end_of_record().unwrap();
                ids.push((e, f, w));
            }
        }
        assert_eq!(ids, vec![(0, 0, 2.0), (1, 0, 1.0), (0, 1, 3.0)]);

        let mut sink = DictionarySink::new(
            TsvSink::new(Vec::new()),
            vec![Arc::new(entries), Arc::new(features)],
            Slots::separate(),
        );
        for &(e, f, w) in &ids {
            sink.write_int(e).unwrap();
            sink.write_int(f).unwrap();
            sink.write_double(w).unwrap();
            sink.end_of_record().unwrap();
        }
        sink.finish().unwrap();
        assert_eq!(String::from_utf8(sink.inner.into_inner()).unwrap(), text);
    }

    #[test]
    fn combined_mode_shares_one_id_space() {
        let mut both = Enumerator::new();
        let mut src = DictionarySource::new(
            TsvSource::new(Cursor::new(b"a\tb\nb\ta\n".to_vec())),
            vec![&mut both],
            Slots::combined(),
        );
        let mut ids = Vec::new();
        while src.has_next().unwrap() {
            ids.push((src.read_int().unwrap(), src.read_int().unwrap()));
            src.end_of_record().unwrap();
        }
        assert_eq!(ids, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn frozen_dictionary_rejects_unseen_strings() {
        let mut e = Enumerator::new();
        e.index("known").unwrap();
        let mut src = DictionarySource::new(
            TsvSource::new(Cursor::new(b"unseen\n".to_vec())),
            vec![Arc::new(e)],
            Slots::new(vec![Some(0)]),
        );
        assert!(matches!(src.read_int(), Err(Error::UnknownToken(ref s)) if s == "unseen"));
    }

    #[test]
    fn seek_through_compact_lines_with_string_columns() {
        use crate::codec::compact::CompactSource;

        let text = "apple\tred\t2\tround\t3\tsweet\t1\npear\tred\t1\tsoft\t4\n";
        let open = |dictionaries: Vec<Arc<Enumerator>>| {
            DictionarySource::new(
                CompactSource::new(TsvSource::new(Cursor::new(text.as_bytes().to_vec())), 3),
                dictionaries,
                Slots::separate(),
            )
        };
        let read_rest = |src: &mut dyn DataSource| {
            let mut out = Vec::new();
            while src.has_next().unwrap() {
                let row = (src.read_int().unwrap(), src.read_int().unwrap(), src.read_double().unwrap());
                src.end_of_record().unwrap();
                out.push(row);
            }
            out
        };

        let mut entries = Enumerator::new();
        let mut features = Enumerator::new();
        for (i, v) in ["apple", "pear"].iter().enumerate() {
            assert_eq!(entries.index(v).unwrap(), i as u32);
        }
        for (i, v) in ["red", "round", "sweet", "soft"].iter().enumerate() {
            assert_eq!(features.index(v).unwrap(), i as u32);
        }
        let dictionaries = vec![Arc::new(entries), Arc::new(features)];

        let mut src = open(dictionaries.clone());
        let mut tells = Vec::new();
        let mut all = Vec::new();
        while src.has_next().unwrap() {
            tells.push(src.position().unwrap());
            all.push((src.read_int().unwrap(), src.read_int().unwrap(), src.read_double().unwrap()));
            src.end_of_record().unwrap();
        }
        assert_eq!(all, vec![(0, 0, 2.0), (0, 1, 3.0), (0, 2, 1.0), (1, 0, 1.0), (1, 3, 4.0)]);

        for (k, tell) in tells.into_iter().enumerate() {
            let mut again = open(dictionaries.clone());
            again.seek(tell).unwrap();
            assert_eq!(read_rest(&mut again), all[k..].to_vec(), "resumed at record {}", k);
        }
    }
}
