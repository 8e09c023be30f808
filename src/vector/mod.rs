pub mod math;
pub mod source;

use num::Float;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use source::{EventsVectorSource, Entry};

/// One entry's feature weights.
///
/// Keys and values are parallel arrays sorted by key, strictly increasing,
/// with the sum of values cached. All pairwise operations in [`math`] walk
/// the two key arrays in lock step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector<N> {
    keys: Vec<u32>,
    values: Vec<N>,
    sum: N,
}

pub type SparseDoubleVector = SparseVector<f64>;

impl<N: Float> Default for SparseVector<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Float> SparseVector<N> {
    pub fn new() -> Self {
        SparseVector { keys: Vec::new(), values: Vec::new(), sum: N::zero() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SparseVector { keys: Vec::with_capacity(capacity), values: Vec::with_capacity(capacity), sum: N::zero() }
    }

    /// Build from arrays that are already sorted.
    pub fn from_sorted(keys: Vec<u32>, values: Vec<N>) -> Result<Self> {
        if keys.len() != values.len() {
            return Err(Error::config(format!("{} keys but {} values", keys.len(), values.len())));
        }
        if let Some(w) = keys.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::config(format!("keys not strictly increasing at {} >= {}", w[0], w[1])));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::config("vector values must be finite"));
        }
        let sum = values.iter().fold(N::zero(), |acc, &v| acc + v);
        Ok(SparseVector { keys, values, sum })
    }

    /// Build from unordered `(key, value)` pairs; duplicate keys are summed.
    /// Fails if a merged value or the total is not finite.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, N)>,
    {
        let mut pairs: Vec<(u32, N)> = entries.into_iter().collect();
        pairs.sort_unstable_by_key(|p| p.0);
        let mut vec = SparseVector::with_capacity(pairs.len());
        for (k, v) in pairs {
            match vec.keys.last() {
                Some(&last) if last == k => {
                    if let Some(slot) = vec.values.last_mut() {
                        *slot = *slot + v;
                    }
                }
                _ => {
                    vec.keys.push(k);
                    vec.values.push(v);
                }
            }
            vec.sum = vec.sum + v;
        }
        if let Some(i) = vec.values.iter().position(|v| !v.is_finite()) {
            return Err(Error::config(format!("value of key {} is not finite", vec.keys[i])));
        }
        if !vec.sum.is_finite() {
            return Err(Error::config("sum of vector values is not finite"));
        }
        Ok(vec)
    }

    /// Append one element. `key` must exceed every key already present.
    pub fn push(&mut self, key: u32, value: N) -> Result<()> {
        if let Some(&last) = self.keys.last() {
            if key <= last {
                return Err(Error::config(format!("key {} pushed after {}", key, last)));
            }
        }
        if !value.is_finite() || !(self.sum + value).is_finite() {
            return Err(Error::config(format!("value of key {} is not finite", key)));
        }
        self.keys.push(key);
        self.values.push(value);
        self.sum = self.sum + value;
        Ok(())
    }

    #[inline]
    pub fn keys(&self) -> &[u32] {
        &self.keys
    }

    #[inline]
    pub fn values(&self) -> &[N] {
        &self.values
    }

    /// Number of non-zero elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Cached sum of all values.
    #[inline]
    pub fn sum(&self) -> N {
        self.sum
    }

    pub fn get(&self, key: u32) -> Option<N> {
        self.keys.binary_search(&key).ok().map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, N)> + '_ {
        self.keys.iter().copied().zip(self.values.iter().copied())
    }

    /// Transform every value, keeping the keys. The sum is recomputed.
    pub fn map_values<F>(&self, mut f: F) -> Self
    where
        F: FnMut(u32, N) -> N,
    {
        let values: Vec<N> = self.iter().map(|(k, v)| f(k, v)).collect();
        let sum = values.iter().fold(N::zero(), |acc, &v| acc + v);
        SparseVector { keys: self.keys.clone(), values, sum }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_entries_sorts_and_merges_duplicates() {
        let v = SparseDoubleVector::from_entries(vec![(5, 1.0), (2, 2.0), (5, 0.5), (0, 1.0)]).unwrap();
        assert_eq!(v.keys(), &[0, 2, 5]);
        assert_eq!(v.values(), &[1.0, 2.0, 1.5]);
        assert_eq!(v.sum(), 4.5);
        assert_eq!(v.get(5), Some(1.5));
        assert_eq!(v.get(3), None);
    }

    #[test]
    fn from_sorted_checks_invariants() {
        assert!(SparseDoubleVector::from_sorted(vec![1, 3], vec![1.0, 2.0]).is_ok());
        assert!(SparseDoubleVector::from_sorted(vec![3, 3], vec![1.0, 2.0]).is_err());
        assert!(SparseDoubleVector::from_sorted(vec![1], vec![f64::NAN]).is_err());
        assert!(SparseDoubleVector::from_sorted(vec![1, 2], vec![1.0]).is_err());
    }

    #[test]
    fn push_rejects_out_of_order_keys() {
        let mut v = SparseDoubleVector::new();
        v.push(1, 1.0).unwrap();
        v.push(4, 2.0).unwrap();
        assert!(v.push(4, 1.0).is_err());
        assert_eq!(v.sum(), 3.0);
    }

    #[test]
    fn values_must_be_finite() {
        assert!(SparseDoubleVector::from_entries(vec![(0, 1.0), (1, f64::NAN)]).is_err());
        assert!(SparseDoubleVector::from_entries(vec![(2, f64::INFINITY)]).is_err());
        assert!(SparseDoubleVector::from_entries(vec![(0, f64::MAX), (1, f64::MAX)]).is_err());
        let mut v = SparseDoubleVector::new();
        assert!(v.push(0, f64::NEG_INFINITY).is_err());
        assert!(v.is_empty());
    }

    #[test]
    fn map_values_recomputes_sum() {
        let v = SparseDoubleVector::from_sorted(vec![0, 1], vec![1.0, 3.0]).unwrap();
        let w = v.map_values(|_, x| x * 2.0);
        assert_eq!(w.values(), &[2.0, 6.0]);
        assert_eq!(w.sum(), 8.0);
    }

    #[test]
    fn generic_over_float_width() {
        let v: SparseVector<f32> = SparseVector::from_entries(vec![(1, 0.5f32), (1, 0.25)]).unwrap();
        assert_eq!(v.sum(), 0.75f32);
    }
}
