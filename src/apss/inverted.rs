use ahash::{AHashMap, AHashSet};

use crate::{
    apss::{sort_pairs, Algorithm, Prepared, Scorer, VectorCursor},
    codec::Tell,
    error::{Error, Result},
    record::{TokenPair, Weighted},
};

/// Where one B vector lives and its precomputed right term.
#[derive(Debug, Clone)]
struct Indexed {
    id: u32,
    tell: Tell,
    right: f64,
}

/// Feature to entry index over source B.
///
/// Only B vectors sharing at least one feature with an A vector are read and
/// scored. When the measure's disjoint score passes the filter, the other
/// B vectors are emitted too, scored from their precomputed right term.
#[derive(Debug, Default)]
pub struct Inverted {
    entries: Vec<Indexed>,
    postings: AHashMap<u32, Vec<usize>>,
}

impl Inverted {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indices into `entries` of every B vector sharing a feature with `a`.
    fn candidates(&self, a: &Prepared) -> Vec<usize> {
        let mut seen = AHashSet::new();
        for key in a.vector.keys() {
            if let Some(list) = self.postings.get(key) {
                seen.extend(list.iter().copied());
            }
        }
        let mut out: Vec<usize> = seen.into_iter().collect();
        out.sort_unstable();
        out
    }
}

impl Algorithm for Inverted {
    fn name(&self) -> &'static str {
        "inverted"
    }

    fn index(&mut self, b: &mut VectorCursor, scorer: &Scorer) -> Result<()> {
        self.entries.clear();
        self.postings.clear();
        while b.has_next()? {
            let tell = b.position()?;
            let entry = match b.read()? {
                Some(e) => e,
                None => break,
            };
            let prepared = scorer.prepare(entry);
            let slot = self.entries.len();
            for key in prepared.vector.keys() {
                self.postings.entry(*key).or_default().push(slot);
            }
            self.entries.push(Indexed { id: prepared.id, tell, right: prepared.right });
        }
        tracing::debug!(entries = self.entries.len(), features = self.postings.len(), "built inverted index");
        Ok(())
    }

    fn score_chunk(
        &self,
        chunk: &[Prepared],
        b: &mut VectorCursor,
        scorer: &Scorer,
    ) -> Result<Vec<Weighted<TokenPair>>> {
        let per_a: Vec<Vec<usize>> = chunk.iter().map(|a| self.candidates(a)).collect();
        let mut wanted: Vec<usize> = per_a.iter().flatten().copied().collect();
        wanted.sort_unstable();
        wanted.dedup();

        // Candidates are read in file order; consecutive ones need no seek.
        let mut loaded: AHashMap<usize, Prepared> = AHashMap::with_capacity(wanted.len());
        let mut next_slot = None;
        for slot in wanted {
            let indexed = &self.entries[slot];
            if next_slot != Some(slot) {
                b.seek(indexed.tell.clone())?;
            }
            let entry = b.read()?.ok_or_else(|| {
                Error::malformed(indexed.tell.clone(), format!("indexed entry {} is missing", indexed.id))
            })?;
            if entry.id != indexed.id {
                return Err(Error::malformed(
                    indexed.tell.clone(),
                    format!("expected entry {}, found {}; source changed after indexing", indexed.id, entry.id),
                ));
            }
            loaded.insert(slot, scorer.prepare(entry));
            next_slot = Some(slot + 1);
        }

        let disjoint = scorer.admits_disjoint();
        let mut out = Vec::new();
        for (a, candidates) in chunk.iter().zip(&per_a) {
            for slot in candidates {
                if let Some(right) = loaded.get(slot) {
                    scorer.emit(a, right, &mut out);
                }
            }
            if disjoint {
                let mut shared = candidates.iter().peekable();
                for (slot, indexed) in self.entries.iter().enumerate() {
                    if shared.peek() == Some(&&slot) {
                        shared.next();
                        continue;
                    }
                    let score = scorer.measure.combine(0.0, a.left, indexed.right);
                    scorer.keep(a.id, indexed.id, score, &mut out);
                }
            }
        }
        sort_pairs(&mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        apss::{naive::Naive, testing, ProductionFilter, VectorOpener},
        measure::{build_measure, epsilon_equals, MeasureKind},
        weighting::WeightingKind,
    };

    fn events() -> Vec<(u32, u32, f64)> {
        vec![
            (0, 0, 1.0),
            (0, 3, 2.0),
            (1, 1, 4.0),
            (2, 0, 1.0),
            (2, 1, 1.0),
            (2, 2, 0.5),
            (4, 5, 3.0),
            (5, 2, 2.0),
            (5, 3, 1.0),
            (7, 3, -1.0),
            (7, 6, 2.0),
        ]
    }

    fn run(algorithm: &mut dyn Algorithm, open: &dyn VectorOpener, scorer: &Scorer) -> Vec<Weighted<TokenPair>> {
        algorithm.index(&mut open.open().unwrap(), scorer).unwrap();
        let all: Vec<Prepared> = open.open().unwrap().read_all().unwrap().into_iter().map(|e| scorer.prepare(e)).collect();
        let mut out = Vec::new();
        for chunk in all.chunks(3) {
            out.extend(algorithm.score_chunk(chunk, &mut open.open().unwrap(), scorer).unwrap());
        }
        out
    }

    #[test]
    fn agrees_with_naive_for_every_measure_and_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events");
        testing::write_events(&path, &events());
        let open = testing::opener(&path);
        let filters = [
            ProductionFilter::default(),
            ProductionFilter::new(0.1, f64::INFINITY, false),
            ProductionFilter::new(f64::NEG_INFINITY, 0.5, true),
            ProductionFilter::new(0.2, 0.9, true),
        ];
        for kind in MeasureKind::ALL {
            let measure = build_measure(kind, false, WeightingKind::Null, None).unwrap();
            for filter in filters {
                let scorer = Scorer::new(measure.clone(), filter);
                let naive = run(&mut Naive, &open, &scorer);
                let inverted = run(&mut Inverted::default(), &open, &scorer);
                assert_eq!(naive.len(), inverted.len(), "{} {}", kind, filter);
                for (n, i) in naive.iter().zip(&inverted) {
                    assert_eq!(n.record, i.record, "{} {}", kind, filter);
                    assert!(epsilon_equals(n.weight, i.weight), "{} {}: {} vs {}", kind, filter, n.weight, i.weight);
                }
            }
        }
    }

    #[test]
    fn skips_disjoint_pairs_when_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events");
        testing::write_events(&path, &events());
        let open = testing::opener(&path);
        let measure = build_measure(MeasureKind::Cosine, false, WeightingKind::Null, None).unwrap();
        let scorer = Scorer::new(measure, ProductionFilter::new(1e-9, f64::INFINITY, false));
        let mut inverted = Inverted::default();
        let out = run(&mut inverted, &open, &scorer);
        assert_eq!(inverted.len(), 6);
        assert!(out.iter().all(|w| w.weight > 0.0 && !w.record.is_identity()));
        assert!(!out.iter().any(|w| w.record.first == 4 || w.record.second == 4));
    }
}
