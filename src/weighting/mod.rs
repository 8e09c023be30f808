//! Per-value transforms applied to feature vectors before comparison.
pub mod impls;
pub mod marginals;

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    vector::SparseDoubleVector,
};

pub use impls::{Compose, GeoMean, LogProduct, NullWeighting, Pmi, PositiveWeighting};
pub use marginals::{FeatureMarginals, FeatureMarginalsCarrier};

/// Whole-vector weighting.
pub trait Weighting: Send + Sync + fmt::Debug {
    fn apply(&self, vector: &SparseDoubleVector) -> SparseDoubleVector;
    fn lower_bound(&self) -> f64;
    fn upper_bound(&self) -> f64;
    fn name(&self) -> String;

    /// True only for the weighting that leaves every value unchanged.
    fn is_identity(&self) -> bool {
        false
    }
}

/// Weighting defined value by value. The vector is passed so that a value
/// can be scaled by properties of its whole row.
pub trait ElementwiseWeighting: Send + Sync + fmt::Debug {
    fn apply_value(&self, vector: &SparseDoubleVector, key: u32, value: f64) -> f64;
    fn lower_bound(&self) -> f64;
    fn upper_bound(&self) -> f64;
    fn name(&self) -> String;

    fn is_identity(&self) -> bool {
        false
    }
}

impl<T: ElementwiseWeighting> Weighting for T {
    fn apply(&self, vector: &SparseDoubleVector) -> SparseDoubleVector {
        if ElementwiseWeighting::is_identity(self) {
            return vector.clone();
        }
        vector.map_values(|k, v| self.apply_value(vector, k, v))
    }

    fn lower_bound(&self) -> f64 {
        ElementwiseWeighting::lower_bound(self)
    }

    fn upper_bound(&self) -> f64 {
        ElementwiseWeighting::upper_bound(self)
    }

    fn name(&self) -> String {
        ElementwiseWeighting::name(self)
    }

    fn is_identity(&self) -> bool {
        ElementwiseWeighting::is_identity(self)
    }
}

/// Names of the available weightings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeightingKind {
    /// Leaves values unchanged.
    Null,
    /// Clamps negative values to zero.
    Positive,
    /// `log2(1 + v) * v`
    LogProduct,
    /// Value over the geometric mean of its entry and feature totals.
    /// Needs feature marginals.
    GeoMean,
    /// Pointwise mutual information of entry and feature.
    /// Needs feature marginals.
    Pmi,
}

const WEIGHTING_ALIASES: &[(&str, WeightingKind)] = &[
    ("null", WeightingKind::Null),
    ("none", WeightingKind::Null),
    ("identity", WeightingKind::Null),
    ("positive", WeightingKind::Positive),
    ("pos", WeightingKind::Positive),
    ("logproduct", WeightingKind::LogProduct),
    ("log-product", WeightingKind::LogProduct),
    ("geomean", WeightingKind::GeoMean),
    ("geometric-mean", WeightingKind::GeoMean),
    ("pmi", WeightingKind::Pmi),
];

impl WeightingKind {
    pub fn name(self) -> &'static str {
        match self {
            WeightingKind::Null => "Null",
            WeightingKind::Positive => "Positive",
            WeightingKind::LogProduct => "LogProduct",
            WeightingKind::GeoMean => "GeoMean",
            WeightingKind::Pmi => "PMI",
        }
    }

    pub fn needs_marginals(self) -> bool {
        matches!(self, WeightingKind::GeoMean | WeightingKind::Pmi)
    }

    /// Instantiate. Contextual weightings require `marginals`.
    pub fn build(self, marginals: Option<&Arc<FeatureMarginals>>) -> Result<Arc<dyn Weighting>> {
        let need = || {
            marginals.cloned().ok_or_else(|| {
                Error::config(format!("{} weighting requires feature marginals; supply a features file", self.name()))
            })
        };
        Ok(match self {
            WeightingKind::Null => Arc::new(NullWeighting),
            WeightingKind::Positive => Arc::new(PositiveWeighting),
            WeightingKind::LogProduct => Arc::new(LogProduct),
            WeightingKind::GeoMean => Arc::new(GeoMean::new(need()?)),
            WeightingKind::Pmi => Arc::new(Pmi::new(need()?)),
        })
    }
}

impl FromStr for WeightingKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        WEIGHTING_ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(s.trim()))
            .map(|(_, kind)| *kind)
            .ok_or_else(|| Error::config(format!("unknown weighting \"{}\"", s)))
    }
}

impl fmt::Display for WeightingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `second ∘ first`, skipping identities.
pub fn compose(first: Arc<dyn Weighting>, second: Arc<dyn Weighting>) -> Arc<dyn Weighting> {
    if first.is_identity() {
        second
    } else if second.is_identity() {
        first
    } else {
        Arc::new(Compose::new(first, second))
    }
}
