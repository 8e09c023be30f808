//! Pairwise similarity measures.
//!
//! Every measure is decomposed into a term over the shared features of both
//! vectors, a term over the first vector alone, a term over the second
//! alone, and a function combining the three. The APSS engine relies on the
//! decomposition to compute the single-vector terms once per vector instead
//! of once per pair.
pub mod impls;

use std::{borrow::Cow, fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    vector::SparseDoubleVector,
    weighting::{compose, FeatureMarginals, Weighting, WeightingKind},
};

pub use impls::{Cosine, Dice, Jaccard, Lin, Precision, Recall};

/// Two scores closer than this are considered equal.
pub const EPSILON: f64 = 1e-7;

#[inline]
pub fn epsilon_equals(a: f64, b: f64) -> bool {
    a == b || (a - b).abs() < EPSILON
}

pub trait Measure: Send + Sync + fmt::Debug {
    fn shared(&self, a: &SparseDoubleVector, b: &SparseDoubleVector) -> f64;
    fn left(&self, a: &SparseDoubleVector) -> f64;
    fn right(&self, b: &SparseDoubleVector) -> f64;
    fn combine(&self, shared: f64, left: f64, right: f64) -> f64;

    fn is_commutative(&self) -> bool;
    /// Score of a vector compared with itself.
    fn homogeneity_bound(&self) -> f64;
    /// Score of two vectors with no feature in common.
    fn heterogeneity_bound(&self) -> f64;
    /// Weighting the measure's formula assumes its inputs have.
    fn expected_weighting(&self) -> WeightingKind;
    fn name(&self) -> String;

    /// Map a raw vector into the space `shared`, `left` and `right` work
    /// in. Identity unless the measure carries a weighting.
    fn prepare<'v>(&self, vector: &'v SparseDoubleVector) -> Cow<'v, SparseDoubleVector> {
        Cow::Borrowed(vector)
    }

    /// Score two prepared vectors.
    #[inline]
    fn score(&self, a: &SparseDoubleVector, b: &SparseDoubleVector) -> f64 {
        self.combine(self.shared(a, b), self.left(a), self.right(b))
    }

    /// Score two raw vectors.
    fn similarity(&self, a: &SparseDoubleVector, b: &SparseDoubleVector) -> f64 {
        let a = self.prepare(a);
        let b = self.prepare(b);
        self.score(&a, &b)
    }
}

/// `m'(a, b) = m(b, a)`.
#[derive(Debug, Clone)]
pub struct Reversed {
    inner: Arc<dyn Measure>,
}

impl Measure for Reversed {
    fn shared(&self, a: &SparseDoubleVector, b: &SparseDoubleVector) -> f64 {
        self.inner.shared(b, a)
    }

    fn left(&self, a: &SparseDoubleVector) -> f64 {
        self.inner.right(a)
    }

    fn right(&self, b: &SparseDoubleVector) -> f64 {
        self.inner.left(b)
    }

    fn combine(&self, shared: f64, left: f64, right: f64) -> f64 {
        self.inner.combine(shared, right, left)
    }

    fn is_commutative(&self) -> bool {
        self.inner.is_commutative()
    }

    fn homogeneity_bound(&self) -> f64 {
        self.inner.homogeneity_bound()
    }

    fn heterogeneity_bound(&self) -> f64 {
        self.inner.heterogeneity_bound()
    }

    fn expected_weighting(&self) -> WeightingKind {
        self.inner.expected_weighting()
    }

    fn name(&self) -> String {
        format!("Reversed({})", self.inner.name())
    }

    fn prepare<'v>(&self, vector: &'v SparseDoubleVector) -> Cow<'v, SparseDoubleVector> {
        self.inner.prepare(vector)
    }
}

/// Applies a weighting to both inputs before scoring.
#[derive(Debug, Clone)]
pub struct AutoWeighted {
    inner: Arc<dyn Measure>,
    weighting: Arc<dyn Weighting>,
}

impl Measure for AutoWeighted {
    fn shared(&self, a: &SparseDoubleVector, b: &SparseDoubleVector) -> f64 {
        self.inner.shared(a, b)
    }

    fn left(&self, a: &SparseDoubleVector) -> f64 {
        self.inner.left(a)
    }

    fn right(&self, b: &SparseDoubleVector) -> f64 {
        self.inner.right(b)
    }

    fn combine(&self, shared: f64, left: f64, right: f64) -> f64 {
        self.inner.combine(shared, left, right)
    }

    fn is_commutative(&self) -> bool {
        self.inner.is_commutative()
    }

    fn homogeneity_bound(&self) -> f64 {
        self.inner.homogeneity_bound()
    }

    fn heterogeneity_bound(&self) -> f64 {
        self.inner.heterogeneity_bound()
    }

    fn expected_weighting(&self) -> WeightingKind {
        self.inner.expected_weighting()
    }

    fn name(&self) -> String {
        format!("{}[{}]", self.inner.name(), self.weighting.name())
    }

    fn prepare<'v>(&self, vector: &'v SparseDoubleVector) -> Cow<'v, SparseDoubleVector> {
        let inner = self.inner.prepare(vector);
        Cow::Owned(self.weighting.apply(&inner))
    }
}

/// Swap the argument order of `measure`. A commutative measure is returned
/// unchanged.
pub fn reverse(measure: Arc<dyn Measure>) -> Arc<dyn Measure> {
    if measure.is_commutative() {
        tracing::warn!(measure = %measure.name(), "reversing a commutative measure has no effect");
        measure
    } else {
        Arc::new(Reversed { inner: measure })
    }
}

/// Weight the inputs of `measure`, unless `weighting` is the identity.
pub fn auto_weighted(measure: Arc<dyn Measure>, weighting: Arc<dyn Weighting>) -> Arc<dyn Measure> {
    if weighting.is_identity() {
        measure
    } else {
        Arc::new(AutoWeighted { inner: measure, weighting })
    }
}

/// Names of the available measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasureKind {
    /// Cosine of the angle between the vectors.
    Cosine,
    /// Intersection over union of the weight multisets.
    Jaccard,
    /// Twice the intersection over the summed totals.
    Dice,
    /// Lin's information-theoretic similarity.
    Lin,
    /// Asymmetric, `precision(a, b) == recall(b, a)`.
    Precision,
    /// Asymmetric, how much of `a` is covered by `b`.
    Recall,
}

const MEASURE_ALIASES: &[(&str, MeasureKind)] = &[
    ("cosine", MeasureKind::Cosine),
    ("cos", MeasureKind::Cosine),
    ("jaccard", MeasureKind::Jaccard),
    ("dice", MeasureKind::Dice),
    ("lin", MeasureKind::Lin),
    ("precision", MeasureKind::Precision),
    ("prec", MeasureKind::Precision),
    ("recall", MeasureKind::Recall),
    ("rec", MeasureKind::Recall),
];

impl MeasureKind {
    pub const ALL: [MeasureKind; 6] = [
        MeasureKind::Cosine,
        MeasureKind::Jaccard,
        MeasureKind::Dice,
        MeasureKind::Lin,
        MeasureKind::Precision,
        MeasureKind::Recall,
    ];

    pub fn build(self) -> Arc<dyn Measure> {
        match self {
            MeasureKind::Cosine => Arc::new(Cosine),
            MeasureKind::Jaccard => Arc::new(Jaccard),
            MeasureKind::Dice => Arc::new(Dice),
            MeasureKind::Lin => Arc::new(Lin),
            MeasureKind::Precision => Arc::new(Precision),
            MeasureKind::Recall => Arc::new(Recall),
        }
    }

    /// Whether the measure, composed with `weighting`, needs feature
    /// marginals to be loaded.
    pub fn needs_marginals(self, weighting: WeightingKind) -> bool {
        weighting.needs_marginals() || self.build().expected_weighting().needs_marginals()
    }
}

impl FromStr for MeasureKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MEASURE_ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(s.trim()))
            .map(|(_, kind)| *kind)
            .ok_or_else(|| Error::config(format!("unknown measure \"{}\"", s)))
    }
}

impl fmt::Display for MeasureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build().name())
    }
}

/// Assemble the measure used for a run: the named measure, optionally
/// reversed, with the user's weighting followed by the measure's expected
/// weighting applied to its inputs.
pub fn build_measure(
    kind: MeasureKind,
    reversed: bool,
    weighting: WeightingKind,
    marginals: Option<&Arc<FeatureMarginals>>,
) -> Result<Arc<dyn Measure>> {
    let base = kind.build();
    let weighting = compose(weighting.build(marginals)?, base.expected_weighting().build(marginals)?);
    let measure = if reversed { reverse(base) } else { base };
    let measure = auto_weighted(measure, weighting);
    tracing::debug!(measure = %measure.name(), "built measure");
    Ok(measure)
}
