use std::sync::Arc;

use crate::{
    vector::SparseDoubleVector,
    weighting::{ElementwiseWeighting, FeatureMarginals, FeatureMarginalsCarrier, Weighting},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct NullWeighting;

impl ElementwiseWeighting for NullWeighting {
    #[inline]
    fn apply_value(&self, _vector: &SparseDoubleVector, _key: u32, value: f64) -> f64 {
        value
    }

    fn lower_bound(&self) -> f64 {
        f64::NEG_INFINITY
    }

    fn upper_bound(&self) -> f64 {
        f64::INFINITY
    }

    fn name(&self) -> String {
        "Null".into()
    }

    fn is_identity(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PositiveWeighting;

impl ElementwiseWeighting for PositiveWeighting {
    #[inline]
    fn apply_value(&self, _vector: &SparseDoubleVector, _key: u32, value: f64) -> f64 {
        value.max(0.0)
    }

    fn lower_bound(&self) -> f64 {
        0.0
    }

    fn upper_bound(&self) -> f64 {
        f64::INFINITY
    }

    fn name(&self) -> String {
        "Positive".into()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogProduct;

impl ElementwiseWeighting for LogProduct {
    #[inline]
    fn apply_value(&self, _vector: &SparseDoubleVector, _key: u32, value: f64) -> f64 {
        (1.0 + value).log2() * value
    }

    fn lower_bound(&self) -> f64 {
        f64::NEG_INFINITY
    }

    fn upper_bound(&self) -> f64 {
        f64::INFINITY
    }

    fn name(&self) -> String {
        "LogProduct".into()
    }
}

/// `v / sqrt(sum(entry) * marginal(feature))`
#[derive(Debug, Clone)]
pub struct GeoMean {
    marginals: Arc<FeatureMarginals>,
}

impl GeoMean {
    pub fn new(marginals: Arc<FeatureMarginals>) -> Self {
        GeoMean { marginals }
    }
}

impl ElementwiseWeighting for GeoMean {
    fn apply_value(&self, vector: &SparseDoubleVector, key: u32, value: f64) -> f64 {
        let denominator = (vector.sum() * self.marginals.marginal(key)).sqrt();
        if denominator > 0.0 {
            value / denominator
        } else {
            0.0
        }
    }

    fn lower_bound(&self) -> f64 {
        0.0
    }

    fn upper_bound(&self) -> f64 {
        f64::INFINITY
    }

    fn name(&self) -> String {
        "GeoMean".into()
    }
}

/// `log2(p(feature | entry) / p(feature))`
///
/// Non-positive values and features without a marginal weigh zero.
#[derive(Debug, Clone)]
pub struct Pmi {
    marginals: Arc<FeatureMarginals>,
}

impl Pmi {
    pub fn new(marginals: Arc<FeatureMarginals>) -> Self {
        Pmi { marginals }
    }
}

impl ElementwiseWeighting for Pmi {
    fn apply_value(&self, vector: &SparseDoubleVector, key: u32, value: f64) -> f64 {
        let prior = self.marginals.prior(key);
        let total = vector.sum();
        if value <= 0.0 || prior <= 0.0 || total <= 0.0 {
            return 0.0;
        }
        (value / total / prior).log2()
    }

    fn lower_bound(&self) -> f64 {
        f64::NEG_INFINITY
    }

    fn upper_bound(&self) -> f64 {
        f64::INFINITY
    }

    fn name(&self) -> String {
        "PMI".into()
    }
}

/// Applies `first`, then `second` to the result.
#[derive(Debug, Clone)]
pub struct Compose {
    first: Arc<dyn Weighting>,
    second: Arc<dyn Weighting>,
}

impl Compose {
    pub fn new(first: Arc<dyn Weighting>, second: Arc<dyn Weighting>) -> Self {
        Compose { first, second }
    }
}

impl Weighting for Compose {
    fn apply(&self, vector: &SparseDoubleVector) -> SparseDoubleVector {
        self.second.apply(&self.first.apply(vector))
    }

    fn lower_bound(&self) -> f64 {
        self.second.lower_bound()
    }

    fn upper_bound(&self) -> f64 {
        self.second.upper_bound()
    }

    fn name(&self) -> String {
        format!("{}({})", self.second.name(), self.first.name())
    }
}
