use std::cmp::Ordering;

use num::Float;

use super::SparseVector;

impl<N: Float> SparseVector<N> {
    /// Walk the shared keys of `self` and `other`, folding their value pairs.
    #[inline]
    pub fn fold_shared<F>(&self, other: &Self, mut f: F) -> N
    where
        F: FnMut(N, N, N) -> N,
    {
        let (ak, av) = (self.keys(), self.values());
        let (bk, bv) = (other.keys(), other.values());
        let mut acc = N::zero();
        let mut i = 0;
        let mut j = 0;
        while i < ak.len() && j < bk.len() {
            match ak[i].cmp(&bk[j]) {
                Ordering::Equal => {
                    acc = f(acc, av[i], bv[j]);
                    i += 1;
                    j += 1;
                }
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
            }
        }
        acc
    }

    /// Multi-set intersection: sum of `min(a[k], b[k])` over shared keys.
    ///
    /// # Arguments
    /// * `other` - the other vector
    #[inline]
    pub fn intersection(&self, other: &Self) -> N {
        self.fold_shared(other, |acc, a, b| acc + a.min(b))
    }

    /// Multi-set union: `sum(a) + sum(b) - intersection(a, b)`.
    #[inline]
    pub fn union(&self, other: &Self) -> N {
        self.sum() + other.sum() - self.intersection(other)
    }

    /// Inner product.
    #[inline]
    pub fn dot(&self, other: &Self) -> N {
        self.fold_shared(other, |acc, a, b| acc + a * b)
    }

    #[inline]
    pub fn length_squared(&self) -> N {
        self.values().iter().fold(N::zero(), |acc, &v| acc + v * v)
    }

    /// Euclidean norm, zero for the empty vector.
    #[inline]
    pub fn length(&self) -> N {
        if self.is_empty() {
            N::zero()
        } else {
            self.length_squared().sqrt()
        }
    }

    /// Whether any key occurs in both vectors.
    pub fn overlaps(&self, other: &Self) -> bool {
        let (ak, bk) = (self.keys(), other.keys());
        let mut i = 0;
        let mut j = 0;
        while i < ak.len() && j < bk.len() {
            match ak[i].cmp(&bk[j]) {
                Ordering::Equal => return true,
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
            }
        }
        false
    }
}
