use crate::{measure::Measure, vector::SparseDoubleVector, weighting::WeightingKind};

#[inline]
fn positive_sum(v: &SparseDoubleVector) -> f64 {
    v.values().iter().filter(|x| **x > 0.0).sum()
}

/// Cosine of the angle between two vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cosine;

impl Measure for Cosine {
    fn shared(&self, a: &SparseDoubleVector, b: &SparseDoubleVector) -> f64 {
        a.dot(b)
    }

    fn left(&self, a: &SparseDoubleVector) -> f64 {
        a.length()
    }

    fn right(&self, b: &SparseDoubleVector) -> f64 {
        b.length()
    }

    fn combine(&self, shared: f64, left: f64, right: f64) -> f64 {
        if shared == 0.0 {
            0.0
        } else {
            shared / (left * right)
        }
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn homogeneity_bound(&self) -> f64 {
        1.0
    }

    fn heterogeneity_bound(&self) -> f64 {
        0.0
    }

    fn expected_weighting(&self) -> WeightingKind {
        WeightingKind::Null
    }

    fn name(&self) -> String {
        "Cosine".into()
    }
}

/// Multi-set Jaccard: intersection over union.
#[derive(Debug, Clone, Copy, Default)]
pub struct Jaccard;

impl Measure for Jaccard {
    fn shared(&self, a: &SparseDoubleVector, b: &SparseDoubleVector) -> f64 {
        a.intersection(b)
    }

    fn left(&self, a: &SparseDoubleVector) -> f64 {
        a.sum()
    }

    fn right(&self, b: &SparseDoubleVector) -> f64 {
        b.sum()
    }

    fn combine(&self, shared: f64, left: f64, right: f64) -> f64 {
        if shared == 0.0 {
            0.0
        } else {
            shared / (left + right - shared)
        }
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn homogeneity_bound(&self) -> f64 {
        1.0
    }

    fn heterogeneity_bound(&self) -> f64 {
        0.0
    }

    fn expected_weighting(&self) -> WeightingKind {
        WeightingKind::Positive
    }

    fn name(&self) -> String {
        "Jaccard".into()
    }
}

/// Multi-set Dice: twice the intersection over the summed totals.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dice;

impl Measure for Dice {
    fn shared(&self, a: &SparseDoubleVector, b: &SparseDoubleVector) -> f64 {
        a.intersection(b)
    }

    fn left(&self, a: &SparseDoubleVector) -> f64 {
        a.sum()
    }

    fn right(&self, b: &SparseDoubleVector) -> f64 {
        b.sum()
    }

    fn combine(&self, shared: f64, left: f64, right: f64) -> f64 {
        if shared == 0.0 {
            0.0
        } else {
            2.0 * shared / (left + right)
        }
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn homogeneity_bound(&self) -> f64 {
        1.0
    }

    fn heterogeneity_bound(&self) -> f64 {
        0.0
    }

    fn expected_weighting(&self) -> WeightingKind {
        WeightingKind::Positive
    }

    fn name(&self) -> String {
        "Dice".into()
    }
}

/// Lin's measure: weight of the shared positive features over the weight of
/// all positive features of both entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lin;

impl Measure for Lin {
    fn shared(&self, a: &SparseDoubleVector, b: &SparseDoubleVector) -> f64 {
        a.fold_shared(b, |acc, x, y| if x > 0.0 && y > 0.0 { acc + x + y } else { acc })
    }

    fn left(&self, a: &SparseDoubleVector) -> f64 {
        positive_sum(a)
    }

    fn right(&self, b: &SparseDoubleVector) -> f64 {
        positive_sum(b)
    }

    fn combine(&self, shared: f64, left: f64, right: f64) -> f64 {
        if shared == 0.0 {
            0.0
        } else {
            shared / (left + right)
        }
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn homogeneity_bound(&self) -> f64 {
        1.0
    }

    fn heterogeneity_bound(&self) -> f64 {
        0.0
    }

    fn expected_weighting(&self) -> WeightingKind {
        WeightingKind::Positive
    }

    fn name(&self) -> String {
        "Lin".into()
    }
}

/// Share of the first entry's positive weight that falls on features it
/// shares with the second.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recall;

impl Measure for Recall {
    fn shared(&self, a: &SparseDoubleVector, b: &SparseDoubleVector) -> f64 {
        a.fold_shared(b, |acc, x, y| if x > 0.0 && y > 0.0 { acc + x } else { acc })
    }

    fn left(&self, a: &SparseDoubleVector) -> f64 {
        positive_sum(a)
    }

    fn right(&self, _b: &SparseDoubleVector) -> f64 {
        0.0
    }

    fn combine(&self, shared: f64, left: f64, _right: f64) -> f64 {
        if shared == 0.0 {
            0.0
        } else {
            shared / left
        }
    }

    fn is_commutative(&self) -> bool {
        false
    }

    fn homogeneity_bound(&self) -> f64 {
        1.0
    }

    fn heterogeneity_bound(&self) -> f64 {
        0.0
    }

    fn expected_weighting(&self) -> WeightingKind {
        WeightingKind::Positive
    }

    fn name(&self) -> String {
        "Recall".into()
    }
}

/// Share of the second entry's positive weight that falls on features it
/// shares with the first. `precision(a, b) == recall(b, a)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Precision;

impl Measure for Precision {
    fn shared(&self, a: &SparseDoubleVector, b: &SparseDoubleVector) -> f64 {
        a.fold_shared(b, |acc, x, y| if x > 0.0 && y > 0.0 { acc + y } else { acc })
    }

    fn left(&self, _a: &SparseDoubleVector) -> f64 {
        0.0
    }

    fn right(&self, b: &SparseDoubleVector) -> f64 {
        positive_sum(b)
    }

    fn combine(&self, shared: f64, _left: f64, right: f64) -> f64 {
        if shared == 0.0 {
            0.0
        } else {
            shared / right
        }
    }

    fn is_commutative(&self) -> bool {
        false
    }

    fn homogeneity_bound(&self) -> f64 {
        1.0
    }

    fn heterogeneity_bound(&self) -> f64 {
        0.0
    }

    fn expected_weighting(&self) -> WeightingKind {
        WeightingKind::Positive
    }

    fn name(&self) -> String {
        "Precision".into()
    }
}
