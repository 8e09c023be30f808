use crate::{
    codec::{Carried, DataSink, DataSource, Tell},
    error::{Error, Result},
};

fn key_as_int(key: &Carried) -> Result<i64> {
    match key {
        Carried::Int(v) => Ok(*v),
        Carried::Str(s) => s
            .parse::<i64>()
            .map_err(|_| Error::config(format!("compact key \"{}\" is not an integer", s))),
        other => Err(Error::config(format!("unexpected compact key {:?}", other))),
    }
}

/// Expands compact lines into logical records.
///
/// A physical line `key a1 b1 a2 b2 ...` is read as records `key a1 b1`,
/// `key a2 b2`, ... where `width` is the number of columns in one logical
/// record, key included. A verbose file is read unchanged since each of its
/// lines is a compact line holding a single record.
pub struct CompactSource<S> {
    inner: S,
    width: usize,
    key: Option<Carried>,
    column: usize,
}

impl<S: DataSource> CompactSource<S> {
    pub fn new(inner: S, width: usize) -> Self {
        CompactSource { inner, width: width.max(1), key: None, column: 0 }
    }
}

impl<S: DataSource> DataSource for CompactSource<S> {
    fn read_int(&mut self) -> Result<i64> {
        let value = match (self.column, &self.key) {
            (0, Some(key)) => key_as_int(key)?,
            (0, None) => {
                let v = self.inner.read_int()?;
                self.key = Some(Carried::Int(v));
                v
            }
            _ => self.inner.read_int()?,
        };
        self.column += 1;
        Ok(value)
    }

    fn read_string(&mut self) -> Result<String> {
        let value = match (self.column, &self.key) {
            (0, Some(key)) => key.to_text(),
            (0, None) => {
                let s = self.inner.read_string()?;
                self.key = Some(Carried::Str(s.clone()));
                s
            }
            _ => self.inner.read_string()?,
        };
        self.column += 1;
        Ok(value)
    }

    fn read_double(&mut self) -> Result<f64> {
        if self.column == 0 && self.key.is_some() {
            return Err(Error::config("compact key column cannot be read as a number"));
        }
        let v = self.inner.read_double()?;
        self.column += 1;
        Ok(v)
    }

    fn end_of_record(&mut self) -> Result<()> {
        if self.inner.is_end_of_record_next()? {
            self.inner.end_of_record()?;
            self.key = None;
        } else if self.column < self.width {
            let tell = self.inner.position()?;
            return Err(Error::malformed(
                tell,
                format!("expected end of record after {} of {} columns", self.column, self.width),
            ));
        }
        self.column = 0;
        Ok(())
    }

    fn is_end_of_record_next(&mut self) -> Result<bool> {
        Ok(self.column >= self.width || self.inner.is_end_of_record_next()?)
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(self.key.is_some() || self.inner.has_next()?)
    }

    /// Skips the whole physical line, including any records of the same key
    /// still on it.
    fn skip_record(&mut self) -> Result<()> {
        self.inner.skip_record()?;
        self.key = None;
        self.column = 0;
        Ok(())
    }

    fn position(&mut self) -> Result<Tell> {
        Ok(self
            .inner
            .position()?
            .push(self.key.clone().unwrap_or(Carried::None))
            .push(Carried::Int(self.column as i64)))
    }

    fn seek(&mut self, tell: Tell) -> Result<()> {
        let (tell, column) = tell.pop_int()?;
        let (rest, key) = tell.pop()?;
        self.inner.seek(rest)?;
        self.column = column.max(0) as usize;
        self.key = match key {
            Carried::None => None,
            k => Some(k),
        };
        Ok(())
    }

    fn progress(&self) -> f64 {
        self.inner.progress()
    }
}

/// Collapses consecutive records with the same key onto one line.
pub struct CompactSink<S> {
    inner: S,
    key: Option<Carried>,
    column: usize,
}

impl<S: DataSink> CompactSink<S> {
    pub fn new(inner: S) -> Self {
        CompactSink { inner, key: None, column: 0 }
    }

    /// Start a new physical line unless `key` continues the open one.
    fn write_key(&mut self, key: Carried) -> Result<bool> {
        if self.key.as_ref() == Some(&key) {
            return Ok(false);
        }
        if self.key.is_some() {
            self.inner.end_of_record()?;
        }
        self.key = Some(key);
        Ok(true)
    }
}

impl<S: DataSink> DataSink for CompactSink<S> {
    fn write_int(&mut self, value: i64) -> Result<()> {
        if self.column == 0 {
            if self.write_key(Carried::Int(value))? {
                self.inner.write_int(value)?;
            }
        } else {
            self.inner.write_int(value)?;
        }
        self.column += 1;
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> Result<()> {
        if self.column == 0 {
            if self.write_key(Carried::Str(value.to_owned()))? {
                self.inner.write_string(value)?;
            }
        } else {
            self.inner.write_string(value)?;
        }
        self.column += 1;
        Ok(())
    }

    fn write_double(&mut self, value: f64) -> Result<()> {
        if self.column == 0 {
            return Err(Error::config("compact key column cannot hold a number"));
        }
        self.inner.write_double(value)?;
        self.column += 1;
        Ok(())
    }

    fn end_of_record(&mut self) -> Result<()> {
        self.column = 0;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn finish(&mut self) -> Result<()> {
        if self.key.take().is_some() {
            self.inner.end_of_record()?;
        }
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::{
        delta::{DeltaColumns, DeltaSink, DeltaSource},
        tsv::{TsvSink, TsvSource},
    };

    const ROWS: [(&str, &str, f64); 5] = [
        ("apple", "red", 2.0),
        ("apple", "round", 1.0),
        ("apple", "sweet", 4.0),
        ("lemon", "sour", 3.0),
        ("pear", "sweet", 1.5),
    ];

    fn write_rows<S: DataSink>(sink: &mut S, rows: &[(&str, &str, f64)]) {
        for &(e, f, w) in rows {
            sink.write_string(e).unwrap();
            sink.write_string(f).unwrap();
            sink.write_double(w).unwrap();
            sink.end_of_record().unwrap();
        }
        sink.finish().unwrap();
    }

    fn write(rows: &[(&str, &str, f64)], compact: bool) -> String {
        let bytes = if compact {
            let mut sink = CompactSink::new(TsvSink::new(Vec::new()));
            write_rows(&mut sink, rows);
            sink.inner.into_inner()
        } else {
            let mut sink = TsvSink::new(Vec::new());
            write_rows(&mut sink, rows);
            sink.into_inner()
        };
        String::from_utf8(bytes).unwrap()
    }

    fn read(text: &str) -> Vec<(String, String, f64)> {
        let mut src = CompactSource::new(TsvSource::new(Cursor::new(text.as_bytes().to_vec())), 3);
        let mut rows = Vec::new();
        while src.has_next().unwrap() {
            let e = src.read_string().unwrap();
            let f = src.read_string().unwrap();
            let w = src.read_double().unwrap();
            src.end_of_record().unwrap();
            rows.push((e, f, w));
        }
        rows
    }

    fn owned(rows: &[(&str, &str, f64)]) -> Vec<(String, String, f64)> {
        rows.iter().map(|&(e, f, w)| (e.to_owned(), f.to_owned(), w)).collect()
    }

    #[test]
    fn groups_records_sharing_a_key() {
        let text = write(&ROWS, true);
        assert_eq!(
            text,
            "apple\tred\t2\tround\t1\tsweet\t4\nlemon\tsour\t3\npear\tsweet\t1.5\n"
        );
    }

    #[test]
    fn compact_is_no_larger_and_reads_back_the_same_records() {
        let verbose = write(&ROWS, false);
        let compact = write(&ROWS, true);
        assert!(compact.len() <= verbose.len());
        assert_eq!(read(&compact), owned(&ROWS));
        assert_eq!(read(&verbose), owned(&ROWS));
    }

    #[test]
    fn odd_trailing_columns_are_malformed() {
        let mut src = CompactSource::new(TsvSource::new(Cursor::new(b"a\tx\t1\ty\n".to_vec())), 3);
        src.read_string().unwrap();
        src.read_string().unwrap();
        src.read_double().unwrap();
        src.end_of_record().unwrap();
        src.read_string().unwrap();
        src.read_string().unwrap();
        let err = src.read_double().unwrap_err();
        assert!(err.is_recoverable());
        src.skip_record().unwrap();
        assert!(!src.has_next().unwrap());
    }

    #[test]
    fn seek_mid_line_replays_the_pending_key() {
        let mut sink = CompactSink::new(DeltaSink::new(TsvSink::new(Vec::new()), DeltaColumns::new(true, true)));
        for &(e, f) in &[(1i64, 2i64), (1, 5), (1, 9), (4, 1), (4, 3)] {
            sink.write_int(e).unwrap();
            sink.write_int(f).unwrap();
            sink.end_of_record().unwrap();
        }
        sink.finish().unwrap();
        let text = String::from_utf8(sink.inner.into_inner().into_inner()).unwrap();
        assert_eq!(text, "1\t2\t3\t4\n3\t-8\t2\n");

        let open = || {
            CompactSource::new(
                DeltaSource::new(TsvSource::new(Cursor::new(text.as_bytes().to_vec())), DeltaColumns::new(true, true)),
                2,
            )
        };
        let mut src = open();
        let mut all = Vec::new();
        let mut tells = Vec::new();
        while src.has_next().unwrap() {
            tells.push(src.position().unwrap());
            let e = src.read_int().unwrap();
            let f = src.read_int().unwrap();
            src.end_of_record().unwrap();
            all.push((e, f));
        }
        assert_eq!(all, vec![(1, 2), (1, 5), (1, 9), (4, 1), (4, 3)]);

        for k in 0..tells.len() {
            let mut again = open();
            again.seek(tells[k].clone()).unwrap();
            let mut rest = Vec::new();
            while again.has_next().unwrap() {
                let e = again.read_int().unwrap();
                let f = again.read_int().unwrap();
                again.end_of_record().unwrap();
                rest.push((e, f));
            }
            assert_eq!(rest, all[k..].to_vec());
        }
    }
}
