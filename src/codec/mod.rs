//! Streaming codec for tab/newline delimited records.
//!
//! The base layer ([`tsv`]) reads and writes raw columns. Optional layers
//! wrap it, each implementing the same [`DataSource`] / [`DataSink`]
//! contract, so any chain of them can be seeked with a [`Tell`]:
//!
//! - [`delta`]: integer columns stored as differences from the previous
//!   record's value in the same column
//! - [`compact`]: consecutive records sharing a leading key collapsed onto a
//!   single physical line
//! - [`dictionary`]: string columns interned to integer ids through an
//!   [`Enumerator`](crate::utils::enumerator::Enumerator)
//!
//! [`builder`] assembles the chain in the fixed order
//! tsv → delta → compact → dictionary.
pub mod tell;
pub mod tsv;
pub mod delta;
pub mod compact;
pub mod dictionary;
pub mod builder;

pub use builder::{SinkBuilder, SourceBuilder};
pub use tell::{Carried, Tell};

use crate::error::Result;

/// Column-level reader over a record stream.
///
/// End of stream is reported by `has_next() == false`, never by an error.
pub trait DataSource {
    fn read_int(&mut self) -> Result<i64>;
    fn read_string(&mut self) -> Result<String>;
    fn read_double(&mut self) -> Result<f64>;

    /// Consume the record terminator. Fails if columns remain.
    fn end_of_record(&mut self) -> Result<()>;
    fn is_end_of_record_next(&mut self) -> Result<bool>;
    fn has_next(&mut self) -> Result<bool>;

    /// Discard the remainder of the current record and resynchronise at the
    /// start of the next one.
    fn skip_record(&mut self) -> Result<()>;

    fn position(&mut self) -> Result<Tell>;
    fn seek(&mut self, tell: Tell) -> Result<()>;

    /// Fraction of the underlying stream consumed so far, in `0.0..=1.0`.
    fn progress(&self) -> f64;
}

/// Column-level writer over a record stream.
pub trait DataSink {
    fn write_int(&mut self, value: i64) -> Result<()>;
    fn write_string(&mut self, value: &str) -> Result<()>;
    fn write_double(&mut self, value: f64) -> Result<()>;
    fn end_of_record(&mut self) -> Result<()>;
    fn flush(&mut self) -> Result<()>;

    /// Terminate any physical line still open and flush. Must be called
    /// once when writing is complete.
    fn finish(&mut self) -> Result<()>;
}

impl<S: DataSource + ?Sized> DataSource for Box<S> {
    #[inline]
    fn read_int(&mut self) -> Result<i64> {
        (**self).read_int()
    }
    #[inline]
    fn read_string(&mut self) -> Result<String> {
        (**self).read_string()
    }
    #[inline]
    fn read_double(&mut self) -> Result<f64> {
        (**self).read_double()
    }
    #[inline]
    fn end_of_record(&mut self) -> Result<()> {
        (**self).end_of_record()
    }
    #[inline]
    fn is_end_of_record_next(&mut self) -> Result<bool> {
        (**self).is_end_of_record_next()
    }
    #[inline]
    fn has_next(&mut self) -> Result<bool> {
        (**self).has_next()
    }
    #[inline]
    fn skip_record(&mut self) -> Result<()> {
        (**self).skip_record()
    }
    #[inline]
    fn position(&mut self) -> Result<Tell> {
        (**self).position()
    }
    #[inline]
    fn seek(&mut self, tell: Tell) -> Result<()> {
        (**self).seek(tell)
    }
    #[inline]
    fn progress(&self) -> f64 {
        (**self).progress()
    }
}

impl<S: DataSink + ?Sized> DataSink for Box<S> {
    #[inline]
    fn write_int(&mut self, value: i64) -> Result<()> {
        (**self).write_int(value)
    }
    #[inline]
    fn write_string(&mut self, value: &str) -> Result<()> {
        (**self).write_string(value)
    }
    #[inline]
    fn write_double(&mut self, value: f64) -> Result<()> {
        (**self).write_double(value)
    }
    #[inline]
    fn end_of_record(&mut self) -> Result<()> {
        (**self).end_of_record()
    }
    #[inline]
    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
    #[inline]
    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}
