pub mod format;
pub mod sink;
pub mod source;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use static_assertions::assert_eq_size;

use crate::{
    codec::{DataSink, DataSource},
    error::{Error, Result},
};

pub use format::{Format, FrozenVocabulary, Layout, Vocabulary};
pub use sink::{RecordSink, Sink, WeightSumReducerSink};
pub use source::{RecordSource, WeightStats};

/// Interned id of an entry or feature string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Token(pub u32);

/// `(first, second)` ids: an entry with one of its features, or two
/// entries in similarity output. Ordered lexicographically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(C)]
pub struct TokenPair {
    pub first: u32,
    pub second: u32,
}

assert_eq_size!(Token, u32);
assert_eq_size!(TokenPair, u64);

impl Token {
    #[inline]
    pub fn id(self) -> u32 {
        self.0
    }
}

impl TokenPair {
    #[inline]
    pub fn new(first: u32, second: u32) -> Self {
        TokenPair { first, second }
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.first == self.second
    }
}

/// A record with a frequency or similarity weight.
///
/// Equality and ordering look at the record only, so a sorted run of
/// weighted records groups equal keys together whatever their weights.
/// Use [`Weighted::cmp_with_weight`] when the weight must break ties.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Weighted<T> {
    pub record: T,
    pub weight: f64,
}

impl<T> Weighted<T> {
    #[inline]
    pub fn new(record: T, weight: f64) -> Self {
        Weighted { record, weight }
    }
}

impl<T: Ord> Weighted<T> {
    pub fn cmp_with_weight(&self, other: &Self) -> Ordering {
        self.record.cmp(&other.record).then_with(|| self.weight.total_cmp(&other.weight))
    }
}

impl<T: PartialEq> PartialEq for Weighted<T> {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

impl<T: Eq> Eq for Weighted<T> {}

impl<T: Ord> PartialOrd for Weighted<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for Weighted<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.record.cmp(&other.record)
    }
}

/// A record type with a fixed column layout.
pub trait Record: Sized {
    /// Columns in one record.
    const WIDTH: usize;

    /// Read the columns of one record; the caller consumes the terminator.
    fn read<S: DataSource + ?Sized>(source: &mut S) -> Result<Self>;
    fn write<S: DataSink + ?Sized>(&self, sink: &mut S) -> Result<()>;

    /// Id in the leading column.
    fn key(&self) -> u32;

    fn weight(&self) -> Option<f64> {
        None
    }
}

fn read_id<S: DataSource + ?Sized>(source: &mut S) -> Result<u32> {
    let v = source.read_int()?;
    match u32::try_from(v) {
        Ok(id) => Ok(id),
        Err(_) => Err(Error::malformed(source.position()?, format!("{} is not a token id", v))),
    }
}

impl Record for Token {
    const WIDTH: usize = 1;

    fn read<S: DataSource + ?Sized>(source: &mut S) -> Result<Self> {
        Ok(Token(read_id(source)?))
    }

    fn write<S: DataSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        sink.write_int(self.0 as i64)
    }

    #[inline]
    fn key(&self) -> u32 {
        self.0
    }
}

impl Record for TokenPair {
    const WIDTH: usize = 2;

    fn read<S: DataSource + ?Sized>(source: &mut S) -> Result<Self> {
        let first = read_id(source)?;
        let second = read_id(source)?;
        Ok(TokenPair { first, second })
    }

    fn write<S: DataSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        sink.write_int(self.first as i64)?;
        sink.write_int(self.second as i64)
    }

    #[inline]
    fn key(&self) -> u32 {
        self.first
    }
}

impl<T: Record> Record for Weighted<T> {
    const WIDTH: usize = T::WIDTH + 1;

    fn read<S: DataSource + ?Sized>(source: &mut S) -> Result<Self> {
        let record = T::read(source)?;
        let weight = source.read_double()?;
        Ok(Weighted { record, weight })
    }

    fn write<S: DataSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        self.record.write(sink)?;
        sink.write_double(self.weight)
    }

    #[inline]
    fn key(&self) -> u32 {
        self.record.key()
    }

    #[inline]
    fn weight(&self) -> Option<f64> {
        Some(self.weight)
    }
}
