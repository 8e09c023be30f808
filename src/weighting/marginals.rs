use serde::{Deserialize, Serialize};

use crate::{
    codec::DataSource,
    error::Result,
    record::{source::WeightedTokenSource, Token, Weighted},
};

/// Corpus-wide feature statistics needed by contextual weightings.
pub trait FeatureMarginalsCarrier {
    /// Sum of all feature frequencies.
    fn grand_total(&self) -> f64;
    /// Frequency of each feature, indexed by id.
    fn feature_marginals(&self) -> &[f64];
    /// Number of distinct features that occur.
    fn feature_cardinality(&self) -> u64;

    #[inline]
    fn marginal(&self, key: u32) -> f64 {
        self.feature_marginals().get(key as usize).copied().unwrap_or(0.0)
    }

    /// Marginal probability of a feature.
    #[inline]
    fn prior(&self, key: u32) -> f64 {
        let total = self.grand_total();
        if total == 0.0 {
            0.0
        } else {
            self.marginal(key) / total
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMarginals {
    grand_total: f64,
    marginals: Vec<f64>,
    cardinality: u64,
}

impl FeatureMarginals {
    /// Tally weighted feature records. A feature listed more than once has
    /// its weights summed.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Weighted<Token>>,
    {
        let mut marginals: Vec<f64> = Vec::new();
        let mut seen: Vec<bool> = Vec::new();
        let mut grand_total = 0.0;
        let mut cardinality = 0u64;
        let mut duplicates = 0u64;
        for Weighted { record: Token(id), weight } in records {
            let i = id as usize;
            if i >= marginals.len() {
                marginals.resize(i + 1, 0.0);
                seen.resize(i + 1, false);
            }
            if seen[i] {
                duplicates += 1;
            } else {
                seen[i] = true;
                cardinality += 1;
            }
            marginals[i] += weight;
            grand_total += weight;
        }
        if duplicates > 0 {
            tracing::warn!(duplicates, "duplicate feature records merged by summing their weights");
        }
        FeatureMarginals { grand_total, marginals, cardinality }
    }

    /// Read a features file through `source`.
    pub fn read<S: DataSource>(source: &mut WeightedTokenSource<S>) -> Result<Self> {
        let records = source.read_all()?;
        let marginals = Self::from_records(records);
        tracing::info!(
            features = marginals.cardinality,
            grand_total = marginals.grand_total,
            "loaded feature marginals"
        );
        Ok(marginals)
    }
}

impl FeatureMarginalsCarrier for FeatureMarginals {
    fn grand_total(&self) -> f64 {
        self.grand_total
    }

    fn feature_marginals(&self) -> &[f64] {
        &self.marginals
    }

    fn feature_cardinality(&self) -> u64 {
        self.cardinality
    }
}
