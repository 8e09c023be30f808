use std::marker::PhantomData;

use crate::{
    codec::{builder::BoxSink, DataSink},
    error::Result,
    record::{Record, Weighted},
};

/// Destination of typed records.
pub trait Sink<R> {
    fn write(&mut self, record: &R) -> Result<()>;

    /// Complete the output. Must be called once, after the last write.
    fn finish(&mut self) -> Result<()>;
}

impl<R: Clone> Sink<R> for Vec<R> {
    fn write(&mut self, record: &R) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<R, K: Sink<R> + ?Sized> Sink<R> for &mut K {
    fn write(&mut self, record: &R) -> Result<()> {
        (**self).write(record)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Writes records through a codec chain.
pub struct RecordSink<R, S = BoxSink<'static>> {
    inner: S,
    _record: PhantomData<fn(R)>,
}

impl<R: Record, S: DataSink> RecordSink<R, S> {
    pub fn new(inner: S) -> Self {
        RecordSink { inner, _record: PhantomData }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<R: Record, S: DataSink> Sink<R> for RecordSink<R, S> {
    #[inline]
    fn write(&mut self, record: &R) -> Result<()> {
        record.write(&mut self.inner)?;
        self.inner.end_of_record()
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.finish()
    }
}

/// Merges runs of equal records by summing their weights.
///
/// Input is expected sorted, so that equal records are adjacent; each run
/// leaves as a single record.
pub struct WeightSumReducerSink<T, K> {
    inner: K,
    pending: Option<Weighted<T>>,
}

impl<T, K> WeightSumReducerSink<T, K>
where
    T: PartialEq + Copy,
    K: Sink<Weighted<T>>,
{
    pub fn new(inner: K) -> Self {
        WeightSumReducerSink { inner, pending: None }
    }

    pub fn into_inner(self) -> K {
        self.inner
    }
}

impl<T, K> Sink<Weighted<T>> for WeightSumReducerSink<T, K>
where
    T: PartialEq + Copy,
    K: Sink<Weighted<T>>,
{
    fn write(&mut self, record: &Weighted<T>) -> Result<()> {
        match &mut self.pending {
            Some(p) if p.record == record.record => {
                p.weight += record.weight;
            }
            Some(p) => {
                let done = *p;
                *p = *record;
                self.inner.write(&done)?;
            }
            None => self.pending = Some(*record),
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(p) = self.pending.take() {
            self.inner.write(&p)?;
        }
        self.inner.finish()
    }
}
