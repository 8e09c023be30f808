use crate::{
    apss::{sort_pairs, Algorithm, Prepared, Scorer, VectorCursor},
    error::Result,
    record::{TokenPair, Weighted},
};

/// Scores every pair. Source B is streamed once per chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct Naive;

impl Algorithm for Naive {
    fn name(&self) -> &'static str {
        "naive"
    }

    fn score_chunk(
        &self,
        chunk: &[Prepared],
        b: &mut VectorCursor,
        scorer: &Scorer,
    ) -> Result<Vec<Weighted<TokenPair>>> {
        let mut out = Vec::new();
        while let Some(entry) = b.read()? {
            let right = scorer.prepare(entry);
            for left in chunk {
                scorer.emit(left, &right, &mut out);
            }
        }
        sort_pairs(&mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        apss::{testing, ProductionFilter, VectorOpener},
        measure::{build_measure, epsilon_equals, MeasureKind},
        weighting::WeightingKind,
    };

    #[test]
    fn recall_is_directional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events");
        testing::write_events(&path, &[(1, 1, 2.0), (1, 2, 1.0), (2, 2, 3.0)]);
        let open = testing::opener(&path);
        let measure = build_measure(MeasureKind::Recall, false, WeightingKind::Null, None).unwrap();
        let scorer = Scorer::new(measure, ProductionFilter::default());

        let chunk: Vec<Prepared> =
            open.open().unwrap().read_all().unwrap().into_iter().map(|e| scorer.prepare(e)).collect();
        let out = Naive.score_chunk(&chunk, &mut open.open().unwrap(), &scorer).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].record, TokenPair::new(1, 2));
        assert!(epsilon_equals(out[0].weight, 1.0 / 3.0));
        assert_eq!(out[1].record, TokenPair::new(2, 1));
        assert!(epsilon_equals(out[1].weight, 1.0));

        let with_identity = Scorer::new(Arc::clone(&scorer.measure), ProductionFilter::new(0.5, 2.0, true));
        let out = Naive.score_chunk(&chunk, &mut open.open().unwrap(), &with_identity).unwrap();
        let pairs: Vec<_> = out.iter().map(|w| (w.record.first, w.record.second)).collect();
        assert_eq!(pairs, vec![(1, 1), (2, 1), (2, 2)]);
    }
}
