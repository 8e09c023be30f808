use std::{fmt, path::PathBuf, sync::Arc};

use serde::Serialize;

use crate::{
    apss::{threaded::DEFAULT_CHUNK_SIZE, AllPairs, ApssStats, ProductionFilter, Scorer, Strategy, VectorCursor},
    error::{Error, Result},
    jobs,
    measure::{build_measure, MeasureKind},
    record::{Format, Layout, RecordSink, RecordSource, Vocabulary},
    utils::{
        progress::{LoggingProgressListener, ProgressListener},
        temp::TempFiles,
    },
    vector::EventsVectorSource,
    weighting::{FeatureMarginals, WeightingKind},
};

/// Scores every pair of entries in an events file, or in two events files,
/// and writes the pairs the filter keeps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllPairsConfig {
    /// Events file, sorted and grouped by entry.
    pub input: PathBuf,
    /// Second events file; the first is compared with itself if absent.
    pub input_b: Option<PathBuf>,
    /// Features file, required by weightings that need feature marginals.
    pub features: Option<PathBuf>,
    pub output: PathBuf,
    pub entries_index: Option<PathBuf>,
    pub features_index: Option<PathBuf>,
    pub combined: bool,
    /// Encoding of the inputs; the output uses the same entry encoding.
    pub format: Format,
    pub measure: String,
    pub measure_reversed: bool,
    pub weighting: String,
    pub min_similarity: f64,
    pub max_similarity: f64,
    pub include_identity: bool,
    pub algorithm: Strategy,
    pub chunk_size: usize,
    pub threads: usize,
    pub temp_dir: PathBuf,
    pub keep_temporary: bool,
    pub charset: String,
}

impl AllPairsConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        AllPairsConfig {
            input: input.into(),
            input_b: None,
            features: None,
            output: output.into(),
            entries_index: None,
            features_index: None,
            combined: false,
            format: Format::strings(),
            measure: MeasureKind::Lin.to_string(),
            measure_reversed: false,
            weighting: WeightingKind::Null.to_string(),
            min_similarity: f64::NEG_INFINITY,
            max_similarity: f64::INFINITY,
            include_identity: false,
            algorithm: Strategy::Inverted,
            chunk_size: DEFAULT_CHUNK_SIZE,
            threads: jobs::default_threads() + 1,
            temp_dir: jobs::default_temp_dir(),
            keep_temporary: false,
            charset: jobs::CHARSET.to_owned(),
        }
    }

    /// Encoding of the similarity output.
    fn output_format(&self) -> Format {
        Format { enumerated_features: true, ..self.format }
    }

    fn kinds(&self) -> Result<(MeasureKind, WeightingKind)> {
        Ok((self.measure.parse()?, self.weighting.parse()?))
    }

    pub fn validate(&self) -> Result<()> {
        jobs::check_charset(&self.charset)?;
        jobs::check_input("input", &self.input)?;
        let mut paths = vec![("input", self.input.as_path()), ("output", self.output.as_path())];
        if let Some(b) = &self.input_b {
            jobs::check_input("second input", b)?;
            paths.push(("second input", b.as_path()));
        }
        if let Some(f) = &self.features {
            jobs::check_input("features", f)?;
            paths.push(("features", f.as_path()));
        }
        jobs::check_distinct(&paths)?;
        jobs::check_positive("chunk size", self.chunk_size)?;
        jobs::check_positive("threads", self.threads)?;
        if self.min_similarity.is_nan()
            || self.max_similarity.is_nan()
            || self.min_similarity > self.max_similarity
            || self.min_similarity == f64::INFINITY
            || self.max_similarity == f64::NEG_INFINITY
        {
            return Err(Error::config(format!(
                "similarity range [{}, {}] is empty",
                self.min_similarity, self.max_similarity
            )));
        }
        let (measure, weighting) = self.kinds()?;
        if measure.needs_marginals(weighting) && self.features.is_none() {
            return Err(Error::config(format!(
                "{} with {} weighting needs a features file for the feature marginals",
                measure, weighting
            )));
        }
        self.format.validate(Layout::Events)?;
        self.output_format().validate(Layout::Similarities)
    }

    pub fn run(&self) -> Result<ApssStats> {
        self.run_with(&[])
    }

    pub fn run_with(&self, listeners: &[Arc<dyn ProgressListener>]) -> Result<ApssStats> {
        self.validate()?;
        tracing::info!(config = %self, "starting all-pairs");
        let (measure_kind, weighting_kind) = self.kinds()?;
        let temp = TempFiles::new(&self.temp_dir, self.keep_temporary)?;
        let mut vocabulary =
            Vocabulary::open(self.entries_index.as_deref(), self.features_index.as_deref(), self.combined)?;

        // Cursors are opened once per chunk and thread, so string inputs are
        // enumerated up front into scratch files.
        let mut scratch = Vec::new();
        let mut enumerate = |path: &PathBuf, vocabulary: &mut Vocabulary| -> Result<(PathBuf, Format)> {
            if self.format.is_enumerated() {
                return Ok((path.clone(), self.format));
            }
            let to = temp.allocate("apss.");
            let source = self.format.source(path, Layout::Events, vocabulary.writers(), self.combined)?;
            let sink = Format::ENUMERATED.sink(&to, Layout::Events, jobs::no_dictionaries(), false)?;
            let n = jobs::transcode_layout(Layout::Events, source, sink, false)?;
            tracing::debug!(input = %path.display(), records = n, "enumerated events");
            scratch.push(to.clone());
            Ok((to, Format::ENUMERATED))
        };
        let a = enumerate(&self.input, &mut vocabulary)?;
        let b = match &self.input_b {
            Some(path) => enumerate(path, &mut vocabulary)?,
            None => a.clone(),
        };

        let marginals = match (&self.features, measure_kind.needs_marginals(weighting_kind)) {
            (Some(path), true) => {
                let source = self.format.source(path, Layout::Features, vocabulary.writers(), self.combined)?;
                Some(Arc::new(FeatureMarginals::read(&mut RecordSource::new(source))?))
            }
            _ => None,
        };
        if !self.format.is_enumerated() {
            vocabulary.save(self.entries_index.as_deref(), self.features_index.as_deref())?;
        }
        let vocabulary = vocabulary.freeze();

        let measure = build_measure(measure_kind, self.measure_reversed, weighting_kind, marginals.as_ref())?;
        let filter = ProductionFilter::new(self.min_similarity, self.max_similarity, self.include_identity);
        let job = AllPairs::new(Scorer::new(measure, filter), self.algorithm)
            .chunk_size(self.chunk_size)
            .threads(self.threads)
            .with_listener(Arc::new(LoggingProgressListener));
        let job = listeners.iter().fold(job, |job, l| job.with_listener(Arc::clone(l)));

        let sink = self.output_format().sink(&self.output, Layout::Similarities, vocabulary.readers(), self.combined)?;
        let (_, stats) = job.run(&opener(a), &opener(b), RecordSink::new(sink))?;

        for path in &scratch {
            temp.discard(path)?;
        }
        Ok(stats)
    }
}

fn opener((path, format): (PathBuf, Format)) -> impl Fn() -> Result<VectorCursor> + Send + Sync {
    move || Ok(EventsVectorSource::new(format.source(&path, Layout::Events, jobs::no_dictionaries(), false)?))
}

impl fmt::Display for AllPairsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.input.display())?;
        if let Some(b) = &self.input_b {
            write!(f, " x {}", b.display())?;
        }
        write!(
            f,
            " -> {} ({}{} / {}, {}, {}, chunk size {}, {} threads)",
            self.output.display(),
            self.measure,
            if self.measure_reversed { " reversed" } else { "" },
            self.weighting,
            ProductionFilter::new(self.min_similarity, self.max_similarity, self.include_identity),
            self.algorithm,
            self.chunk_size,
            self.threads
        )
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn config(dir: &std::path::Path, events: &str) -> AllPairsConfig {
        fs::write(dir.join("events"), events).unwrap();
        let mut c = AllPairsConfig::new(dir.join("events"), dir.join("sims"));
        c.temp_dir = dir.join("tmp");
        c.threads = 2;
        c.chunk_size = 1;
        c
    }

    fn lines(path: &std::path::Path) -> Vec<(String, String, f64)> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| {
                let c: Vec<&str> = l.split('\t').collect();
                (c[0].to_owned(), c[1].to_owned(), c[2].parse().unwrap())
            })
            .collect()
    }

    #[test]
    fn recall_over_string_events() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = config(dir.path(), "e1\tf1\t2\ne1\tf2\t1\ne2\tf2\t3\n");
        c.measure = "recall".into();
        let stats = c.run().unwrap();
        assert_eq!(stats.pairs, 2);
        let out = lines(&c.output);
        assert_eq!((out[0].0.as_str(), out[0].1.as_str()), ("e1", "e2"));
        assert!((out[0].2 - 1.0 / 3.0).abs() < 1e-7);
        assert_eq!((out[1].0.as_str(), out[1].1.as_str()), ("e2", "e1"));
        assert!((out[1].2 - 1.0).abs() < 1e-7);
        assert_eq!(fs::read_dir(&c.temp_dir).unwrap().count(), 0);
    }

    #[test]
    fn strategies_and_thread_counts_agree() {
        let dir = tempfile::tempdir().unwrap();
        let events = "0\t0\t1\n0\t1\t2\n1\t1\t1\n1\t2\t1\n2\t0\t3\n3\t4\t1\n";
        let mut reference = None;
        for (algorithm, threads) in [(Strategy::Naive, 1), (Strategy::Inverted, 1), (Strategy::Inverted, 3)] {
            let mut c = config(dir.path(), events);
            c.format = Format::ENUMERATED;
            c.measure = "cosine".into();
            c.min_similarity = 0.0;
            c.algorithm = algorithm;
            c.threads = threads;
            c.run().unwrap();
            let out = lines(&c.output);
            match &reference {
                None => reference = Some(out),
                Some(r) => {
                    assert_eq!(r.len(), out.len());
                    for (x, y) in r.iter().zip(&out) {
                        assert_eq!((&x.0, &x.1), (&y.0, &y.1));
                        assert!((x.2 - y.2).abs() < 1e-7);
                    }
                }
            }
        }
    }

    #[test]
    fn marginal_weightings_need_a_features_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = config(dir.path(), "a\tx\t1\n");
        c.weighting = "pmi".into();
        assert!(matches!(c.validate(), Err(Error::Configuration(_))));
        fs::write(dir.path().join("features"), "x\t1\n").unwrap();
        c.features = Some(dir.path().join("features"));
        assert!(c.validate().is_ok());
        c.min_similarity = 1.0;
        c.max_similarity = 0.5;
        assert!(c.validate().is_err());
        c.min_similarity = f64::INFINITY;
        c.max_similarity = f64::INFINITY;
        assert!(matches!(c.validate(), Err(Error::Configuration(_))));
        c.min_similarity = f64::NEG_INFINITY;
        c.max_similarity = f64::NEG_INFINITY;
        assert!(c.validate().is_err());
        c.min_similarity = 1.0;
        c.max_similarity = 2.0;
        assert!(c.validate().is_ok());
        c.measure = "weeds".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn pmi_weighted_run_reads_marginals() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = config(dir.path(), "a\tx\t2\na\ty\t1\nb\tx\t1\nb\ty\t2\n");
        fs::write(dir.path().join("features"), "x\t3\ny\t3\n").unwrap();
        c.features = Some(dir.path().join("features"));
        c.weighting = "pmi".into();
        c.measure = "cosine".into();
        c.include_identity = true;
        let stats = c.run().unwrap();
        assert_eq!(stats.pairs, 4);
        let out = lines(&c.output);
        assert!((out[0].2 - 1.0).abs() < 1e-7);
        assert!(out[1].2 < 0.0);
    }
}
