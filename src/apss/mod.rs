//! All-pairs similarity search.
//!
//! Vectors from source A are taken in chunks. Each chunk is compared against
//! source B by one [`Algorithm`], and the chunk results, each sorted by
//! `(a, b)`, are written in chunk order. Source A is assumed sorted by entry,
//! so the whole output is sorted by `(a, b)`.
pub mod inverted;
pub mod naive;
pub mod sink;
pub mod threaded;

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    codec::builder::BoxSource,
    error::{Error, Result},
    measure::Measure,
    record::{TokenPair, Weighted},
    vector::{Entry, EventsVectorSource, SparseDoubleVector},
};

pub use inverted::Inverted;
pub use naive::Naive;
pub use threaded::{AllPairs, ApssStats};

/// A vector cursor over an events file.
pub type VectorCursor = EventsVectorSource<BoxSource<'static>>;

/// Opens independent cursors over one vector file; each worker gets its own.
pub trait VectorOpener: Send + Sync {
    fn open(&self) -> Result<VectorCursor>;
}

impl<F> VectorOpener for F
where
    F: Fn() -> Result<VectorCursor> + Send + Sync,
{
    fn open(&self) -> Result<VectorCursor> {
        self()
    }
}

/// Which pairs make it to the output.
///
/// A bound of -inf below or +inf above is stored as no bound at all. The
/// opposite infinities are kept and admit nothing. NaN scores never pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProductionFilter {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub include_identity: bool,
}

impl Default for ProductionFilter {
    fn default() -> Self {
        ProductionFilter { min: None, max: None, include_identity: false }
    }
}

impl ProductionFilter {
    pub fn new(min: f64, max: f64, include_identity: bool) -> Self {
        let min = (min != f64::NEG_INFINITY).then_some(min);
        let max = (max != f64::INFINITY).then_some(max);
        ProductionFilter { min, max, include_identity }
    }

    #[inline]
    pub fn accepts_score(&self, score: f64) -> bool {
        !score.is_nan() && self.min.map_or(true, |m| score >= m) && self.max.map_or(true, |m| score <= m)
    }

    #[inline]
    pub fn accepts(&self, a: u32, b: u32, score: f64) -> bool {
        (self.include_identity || a != b) && self.accepts_score(score)
    }
}

impl fmt::Display for ProductionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: Option<f64>, inf: &str| b.map_or_else(|| inf.to_owned(), |v| v.to_string());
        write!(
            f,
            "[{}, {}]{}",
            bound(self.min, "-inf"),
            bound(self.max, "inf"),
            if self.include_identity { " with identity pairs" } else { "" }
        )
    }
}

/// An entry vector mapped through the measure, with its single-vector terms.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub id: u32,
    pub vector: SparseDoubleVector,
    pub left: f64,
    pub right: f64,
}

/// Measure plus filter: everything needed to score and keep a pair.
#[derive(Debug, Clone)]
pub struct Scorer {
    pub measure: Arc<dyn Measure>,
    pub filter: ProductionFilter,
}

impl Scorer {
    pub fn new(measure: Arc<dyn Measure>, filter: ProductionFilter) -> Self {
        Scorer { measure, filter }
    }

    pub fn prepare(&self, entry: Entry) -> Prepared {
        let vector = self.measure.prepare(&entry.vector).into_owned();
        let left = self.measure.left(&vector);
        let right = self.measure.right(&vector);
        Prepared { id: entry.id, vector, left, right }
    }

    /// Score `a` against `b`, pushing the pair if the filter keeps it.
    #[inline]
    pub fn emit(&self, a: &Prepared, b: &Prepared, out: &mut Vec<Weighted<TokenPair>>) {
        let score = self.measure.combine(self.measure.shared(&a.vector, &b.vector), a.left, b.right);
        self.keep(a.id, b.id, score, out);
    }

    #[inline]
    pub fn keep(&self, a: u32, b: u32, score: f64, out: &mut Vec<Weighted<TokenPair>>) {
        if self.filter.accepts(a, b, score) {
            out.push(Weighted::new(TokenPair::new(a, b), score));
        }
    }

    /// Whether pairs without shared features can pass the filter.
    pub fn admits_disjoint(&self) -> bool {
        self.filter.accepts_score(self.measure.heterogeneity_bound())
    }
}

/// One comparison strategy.
pub trait Algorithm: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-off pass over source B before any chunk is scored.
    fn index(&mut self, _b: &mut VectorCursor, _scorer: &Scorer) -> Result<()> {
        Ok(())
    }

    /// Compare every vector of `chunk` with source B. `b` is a cursor
    /// freshly opened at the start of source B. The result is sorted by
    /// `(a, b)`.
    fn score_chunk(
        &self,
        chunk: &[Prepared],
        b: &mut VectorCursor,
        scorer: &Scorer,
    ) -> Result<Vec<Weighted<TokenPair>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Every A vector against every B vector.
    Naive,
    /// Only B vectors sharing a feature with the A vector.
    Inverted,
}

impl Strategy {
    pub fn build(self) -> Box<dyn Algorithm> {
        match self {
            Strategy::Naive => Box::new(Naive),
            Strategy::Inverted => Box::new(Inverted::default()),
        }
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "naive" => Ok(Strategy::Naive),
            "inverted" | "index" | "indexed" => Ok(Strategy::Inverted),
            _ => Err(Error::config(format!("unknown algorithm \"{}\"", s))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Naive => "naive",
            Strategy::Inverted => "inverted",
        })
    }
}

/// Sort a chunk's output into `(a, b)` order.
pub(crate) fn sort_pairs(pairs: &mut [Weighted<TokenPair>]) {
    pairs.sort_unstable_by(|x, y| x.record.cmp(&y.record));
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_drops_identity_and_out_of_range_scores() {
        let f = ProductionFilter::new(0.1, f64::INFINITY, false);
        assert_eq!(f.max, None);
        assert!(f.accepts(1, 2, 0.1));
        assert!(!f.accepts(1, 2, 0.05));
        assert!(!f.accepts(3, 3, 1.0));
        let with_identity = ProductionFilter { include_identity: true, ..f };
        assert!(with_identity.accepts(3, 3, 1.0));
        assert_eq!(ProductionFilter::default().to_string(), "[-inf, inf]");
    }

    #[test]
    fn opposite_infinities_admit_nothing() {
        let unbounded = ProductionFilter::new(f64::NEG_INFINITY, f64::INFINITY, false);
        assert_eq!((unbounded.min, unbounded.max), (None, None));
        assert!(unbounded.accepts_score(-1e300));
        assert!(!unbounded.accepts_score(f64::NAN));
        for (min, max) in [(f64::INFINITY, f64::INFINITY), (f64::NEG_INFINITY, f64::NEG_INFINITY)] {
            let f = ProductionFilter::new(min, max, true);
            assert!(!f.accepts_score(0.5));
            assert!(!f.accepts_score(0.0));
        }
    }

    #[test]
    fn strategies_parse() {
        assert_eq!("Naive".parse::<Strategy>().unwrap(), Strategy::Naive);
        assert_eq!("inverted".parse::<Strategy>().unwrap(), Strategy::Inverted);
        assert!("quantum".parse::<Strategy>().is_err());
    }
}
