use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write},
    path::Path,
};

use crate::{
    codec::{Carried, DataSink, DataSource, Tell},
    error::{Error, Result},
};

const TAB: u8 = b'\t';
const LF: u8 = b'\n';
const CR: u8 = b'\r';

#[inline]
fn is_delimiter(b: u8) -> bool {
    b == TAB || b == LF || b == CR
}

/// Fails if `value` holds a byte that would split it into more columns or
/// records when written.
pub fn check_field(value: &str) -> Result<()> {
    match value.bytes().position(is_delimiter) {
        Some(at) => Err(Error::config(format!("{:?} contains a tab or line break at byte {}", value, at))),
        None => Ok(()),
    }
}

/// Base reader: tab separated columns, newline separated records.
///
/// Tracks the byte offset of the next unread column so that
/// [`position`](DataSource::position) is exact even in the middle of a line.
pub struct TsvSource<R> {
    reader: R,
    offset: u64,
    column: usize,
    len: Option<u64>,
}

impl TsvSource<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut source = TsvSource::new(BufReader::new(file));
        source.len = Some(len);
        Ok(source)
    }
}

impl<R> TsvSource<R>
where
    R: BufRead + Seek,
{
    pub fn new(reader: R) -> Self {
        TsvSource { reader, offset: 0, column: 0, len: None }
    }

    #[inline]
    fn peek(&mut self) -> Result<Option<u8>> {
        let buf = self.reader.fill_buf()?;
        Ok(buf.first().copied())
    }

    #[inline]
    fn consume(&mut self, n: usize) {
        self.reader.consume(n);
        self.offset += n as u64;
    }

    fn here(&self) -> Tell {
        Tell::at(self.offset).push(Carried::Int(self.column as i64))
    }

    /// Read the raw bytes of the next column, consuming a trailing tab but
    /// leaving a newline for `end_of_record`.
    fn read_column(&mut self) -> Result<String> {
        match self.peek()? {
            None => return Err(Error::malformed(self.here(), "expected a column but found end of stream")),
            Some(b) if b == LF || b == CR => {
                return Err(Error::malformed(self.here(), "expected a column but found end of record"))
            }
            _ => {}
        }
        let start = self.here();
        let mut bytes = Vec::new();
        let mut delimiter = None;
        loop {
            let (used, done) = {
                let buf = self.reader.fill_buf()?;
                if buf.is_empty() {
                    (0, true)
                } else {
                    match buf.iter().position(|b| is_delimiter(*b)) {
                        Some(i) => {
                            bytes.extend_from_slice(&buf[..i]);
                            delimiter = Some(buf[i]);
                            (i, true)
                        }
                        None => {
                            bytes.extend_from_slice(buf);
                            (buf.len(), false)
                        }
                    }
                }
            };
            self.consume(used);
            if done {
                break;
            }
        }
        if delimiter == Some(TAB) {
            self.consume(1);
        }
        self.column += 1;
        String::from_utf8(bytes).map_err(|_| Error::malformed(start, "column is not valid UTF-8"))
    }
}

impl<R> DataSource for TsvSource<R>
where
    R: BufRead + Seek,
{
    fn read_int(&mut self) -> Result<i64> {
        let tell = self.here();
        let text = self.read_column()?;
        text.parse::<i64>()
            .map_err(|_| Error::malformed(tell, format!("expected an integer but found \"{}\"", text)))
    }

    fn read_string(&mut self) -> Result<String> {
        self.read_column()
    }

    fn read_double(&mut self) -> Result<f64> {
        let tell = self.here();
        let text = self.read_column()?;
        text.parse::<f64>()
            .map_err(|_| Error::malformed(tell, format!("expected a number but found \"{}\"", text)))
    }

    fn end_of_record(&mut self) -> Result<()> {
        match self.peek()? {
            None => {}
            Some(CR) => {
                self.consume(1);
                if self.peek()? == Some(LF) {
                    self.consume(1);
                }
            }
            Some(LF) => self.consume(1),
            Some(_) => {
                return Err(Error::malformed(self.here(), "expected end of record but found another column"))
            }
        }
        self.column = 0;
        Ok(())
    }

    fn is_end_of_record_next(&mut self) -> Result<bool> {
        Ok(match self.peek()? {
            None => true,
            Some(b) => b == LF || b == CR,
        })
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(self.peek()?.is_some())
    }

    fn skip_record(&mut self) -> Result<()> {
        let mut discarded = Vec::new();
        let n = self.reader.read_until(LF, &mut discarded)?;
        self.offset += n as u64;
        self.column = 0;
        Ok(())
    }

    fn position(&mut self) -> Result<Tell> {
        Ok(self.here())
    }

    fn seek(&mut self, tell: Tell) -> Result<()> {
        let (tell, column) = tell.pop_int()?;
        self.reader.seek(SeekFrom::Start(tell.offset()))?;
        self.offset = tell.offset();
        self.column = column.max(0) as usize;
        Ok(())
    }

    fn progress(&self) -> f64 {
        match self.len {
            Some(0) | None => 1.0,
            Some(len) => (self.offset as f64 / len as f64).min(1.0),
        }
    }
}

/// Base writer, the inverse of [`TsvSource`].
pub struct TsvSink<W: Write> {
    writer: W,
    column: usize,
}

impl TsvSink<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(TsvSink::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> TsvSink<W> {
    pub fn new(writer: W) -> Self {
        TsvSink { writer, column: 0 }
    }

    #[inline]
    fn separate(&mut self) -> Result<()> {
        if self.column > 0 {
            self.writer.write_all(&[TAB])?;
        }
        self.column += 1;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DataSink for TsvSink<W> {
    fn write_int(&mut self, value: i64) -> Result<()> {
        self.separate()?;
        write!(self.writer, "{}", value)?;
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> Result<()> {
        check_field(value)?;
        self.separate()?;
        self.writer.write_all(value.as_bytes())?;
        Ok(())
    }

    fn write_double(&mut self, value: f64) -> Result<()> {
        self.separate()?;
        write!(self.writer, "{}", value)?;
        Ok(())
    }

    fn end_of_record(&mut self) -> Result<()> {
        self.writer.write_all(&[LF])?;
        self.column = 0;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn source(text: &str) -> TsvSource<Cursor<Vec<u8>>> {
        TsvSource::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn reads_typed_columns_and_records() {
        let mut src = source("apple\t3\t0.5\npear\t-1\t2\n");
        assert!(src.has_next().unwrap());
        assert_eq!(src.read_string().unwrap(), "apple");
        assert_eq!(src.read_int().unwrap(), 3);
        assert!(!src.is_end_of_record_next().unwrap());
        assert_eq!(src.read_double().unwrap(), 0.5);
        assert!(src.is_end_of_record_next().unwrap());
        src.end_of_record().unwrap();
        assert_eq!(src.read_string().unwrap(), "pear");
        assert_eq!(src.read_int().unwrap(), -1);
        assert_eq!(src.read_double().unwrap(), 2.0);
        src.end_of_record().unwrap();
        assert!(!src.has_next().unwrap());
    }

    #[test]
    fn last_record_without_newline_is_complete() {
        let mut src = source("a\t1");
        assert_eq!(src.read_string().unwrap(), "a");
        assert_eq!(src.read_int().unwrap(), 1);
        src.end_of_record().unwrap();
        assert!(!src.has_next().unwrap());
    }

    #[test]
    fn type_mismatch_is_malformed_and_skip_resynchronises() {
        let mut src = source("x\tnot-a-number\tjunk\ny\t2\n");
        assert_eq!(src.read_string().unwrap(), "x");
        let err = src.read_int().unwrap_err();
        assert!(err.is_recoverable());
        src.skip_record().unwrap();
        assert_eq!(src.read_string().unwrap(), "y");
        assert_eq!(src.read_int().unwrap(), 2);
        src.end_of_record().unwrap();
    }

    #[test]
    fn missing_and_extra_columns_are_malformed() {
        let mut src = source("a\n");
        src.read_string().unwrap();
        match src.read_int() {
            Err(Error::MalformedRecord { tell, .. }) => assert_eq!(tell.offset(), 1),
            other => panic!("expected malformed record, got {:?}", other),
        }

        let mut src = source("a\tb\n");
        src.read_string().unwrap();
        assert!(src.end_of_record().unwrap_err().is_recoverable());
    }

    #[test]
    fn seek_resumes_at_the_next_unread_record() {
        let text = "1\t10\n2\t20\n3\t30\n4\t40\n";
        let mut src = source(text);
        let mut tells = Vec::new();
        let mut rows = Vec::new();
        while src.has_next().unwrap() {
            tells.push(src.position().unwrap());
            let a = src.read_int().unwrap();
            let b = src.read_int().unwrap();
            src.end_of_record().unwrap();
            rows.push((a, b));
        }
        let mut again = source(text);
        again.seek(tells[2].clone()).unwrap();
        let mut rest = Vec::new();
        while again.has_next().unwrap() {
            let a = again.read_int().unwrap();
            let b = again.read_int().unwrap();
            again.end_of_record().unwrap();
            rest.push((a, b));
        }
        assert_eq!(rest, rows[2..].to_vec());
    }

    #[test]
    fn sink_writes_what_source_reads() {
        let mut sink = TsvSink::new(Vec::new());
        sink.write_string("e1").unwrap();
        sink.write_int(7).unwrap();
        sink.write_double(1.5).unwrap();
        sink.end_of_record().unwrap();
        sink.finish().unwrap();
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), "e1\t7\t1.5\n");
    }

    #[test]
    fn strings_with_delimiters_are_refused() {
        let mut sink = TsvSink::new(Vec::new());
        for bad in ["a\tb", "line\n", "\rx"] {
            assert!(matches!(sink.write_string(bad), Err(Error::Configuration(_))));
        }
        sink.write_string("fine").unwrap();
        sink.end_of_record().unwrap();
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), "fine\n");
    }
}
