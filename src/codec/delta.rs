use serde::{Deserialize, Serialize};

use crate::{
    codec::{Carried, DataSink, DataSource, Tell},
    error::{Error, Result},
};

/// Which physical columns are delta encoded.
///
/// The leading column (the record key) and the trailing integer columns each
/// keep their own previous value. The history persists across records, so a
/// sorted file whose keys repeat or grow slowly encodes to small numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaColumns {
    pub leading: bool,
    pub trailing: bool,
}

impl DeltaColumns {
    pub const NONE: DeltaColumns = DeltaColumns { leading: false, trailing: false };

    pub fn new(leading: bool, trailing: bool) -> Self {
        DeltaColumns { leading, trailing }
    }

    #[inline]
    pub fn any(&self) -> bool {
        self.leading || self.trailing
    }

    /// Whether `column` is stored as a difference.
    #[inline]
    pub fn covers(&self, column: usize) -> bool {
        self.group(column).is_some()
    }

    /// Index into the history for `column`, or `None` if it is stored as is.
    #[inline]
    fn group(&self, column: usize) -> Option<usize> {
        match column {
            0 if self.leading => Some(0),
            c if c > 0 && self.trailing => Some(1),
            _ => None,
        }
    }
}

/// Shared bookkeeping of the read and write sides.
#[derive(Debug, Clone, Default)]
struct DeltaState {
    columns: DeltaColumns,
    column: usize,
    previous: [i64; 2],
}

impl DeltaState {
    fn new(columns: DeltaColumns) -> Self {
        DeltaState { columns, column: 0, previous: [0; 2] }
    }

    fn carried(&self) -> Carried {
        Carried::Ints(vec![self.column as i64, self.previous[0], self.previous[1]])
    }

    fn restore(&mut self, carried: Carried) -> Result<()> {
        match carried {
            Carried::Ints(v) if v.len() == 3 => {
                self.column = v[0].max(0) as usize;
                self.previous = [v[1], v[2]];
                Ok(())
            }
            other => Err(Error::config(format!("expected delta layer state, found {:?}", other))),
        }
    }

    fn reject_string(&self) -> Result<()> {
        if self.columns.group(self.column).is_some() {
            return Err(Error::config(format!(
                "column {} is delta encoded and can only hold integers",
                self.column
            )));
        }
        Ok(())
    }
}

pub struct DeltaSource<S> {
    inner: S,
    state: DeltaState,
}

impl<S: DataSource> DeltaSource<S> {
    pub fn new(inner: S, columns: DeltaColumns) -> Self {
        DeltaSource { inner, state: DeltaState::new(columns) }
    }
}

impl<S: DataSource> DataSource for DeltaSource<S> {
    fn read_int(&mut self) -> Result<i64> {
        let raw = self.inner.read_int()?;
        let value = match self.state.columns.group(self.state.column) {
            Some(g) => {
                let v = self.state.previous[g].wrapping_add(raw);
                self.state.previous[g] = v;
                v
            }
            None => raw,
        };
        self.state.column += 1;
        Ok(value)
    }

    fn read_string(&mut self) -> Result<String> {
        self.state.reject_string()?;
        let s = self.inner.read_string()?;
        self.state.column += 1;
        Ok(s)
    }

    fn read_double(&mut self) -> Result<f64> {
        let d = self.inner.read_double()?;
        self.state.column += 1;
        Ok(d)
    }

    fn end_of_record(&mut self) -> Result<()> {
        self.inner.end_of_record()?;
        self.state.column = 0;
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
        self.state.column = 0;
        Ok(())
    }

    fn position(&mut self) -> Result<Tell> {
        Ok(self.inner.position()?.push(self.state.carried()))
    }

    fn seek(&mut self, tell: Tell) -> Result<()> {
        let (rest, carried) = tell.pop()?;
        self.state.restore(carried)?;
        self.inner.seek(rest)
    }

    fn progress(&self) -> f64 {
        self.inner.progress()
    }
}

pub struct DeltaSink<S> {
    inner: S,
    state: DeltaState,
}

impl<S: DataSink> DeltaSink<S> {
    pub fn new(inner: S, columns: DeltaColumns) -> Self {
        DeltaSink { inner, state: DeltaState::new(columns) }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: DataSink> DataSink for DeltaSink<S> {
    fn write_int(&mut self, value: i64) -> Result<()> {
        let encoded = match self.state.columns.group(self.state.column) {
            Some(g) => {
                let d = value.wrapping_sub(self.state.previous[g]);
                self.state.previous[g] = value;
                d
            }
            None => value,
        };
        self.inner.write_int(encoded)?;
        self.state.column += 1;
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> Result<()> {
        self.state.reject_string()?;
        self.inner.write_string(value)?;
        self.state.column += 1;
        Ok(())
    }

    fn write_double(&mut self, value: f64) -> Result<()> {
        self.inner.write_double(value)?;
        self.state.column += 1;
        Ok(())
    }

    fn end_of_record(&mut self) -> Result<()> {
        self.inner.end_of_record()?;
        self.state.column = 0;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.finish()
    }
}
