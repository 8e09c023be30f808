use std::{fmt, path::Path, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    codec::{
        builder::{BoxSink, BoxSource},
        delta::DeltaColumns,
        dictionary::{Dictionary, Slots},
        SinkBuilder, SourceBuilder,
    },
    error::{Error, Result},
    utils::enumerator::Enumerator,
};

/// What the id columns of a weighted file refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    /// `entry feature`, unweighted raw observations.
    Instances,
    /// `entry weight`
    Entries,
    /// `feature weight`
    Features,
    /// `entry feature weight`
    Events,
    /// `entry entry score`
    Similarities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vocab {
    Entry,
    Feature,
}

impl Layout {
    fn vocabularies(self) -> &'static [Vocab] {
        match self {
            Layout::Instances => &[Vocab::Entry, Vocab::Feature],
            Layout::Entries => &[Vocab::Entry],
            Layout::Features => &[Vocab::Feature],
            Layout::Events => &[Vocab::Entry, Vocab::Feature],
            Layout::Similarities => &[Vocab::Entry, Vocab::Entry],
        }
    }

    /// Id columns in one record.
    pub fn key_columns(self) -> usize {
        self.vocabularies().len()
    }

    pub fn is_weighted(self) -> bool {
        self != Layout::Instances
    }

    /// All columns in one record, weight included.
    pub fn record_width(self) -> usize {
        self.key_columns() + usize::from(self.is_weighted())
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layout::Instances => "instances",
            Layout::Entries => "entries",
            Layout::Features => "features",
            Layout::Events => "events",
            Layout::Similarities => "similarities",
        };
        f.write_str(name)
    }
}

impl FromStr for Layout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instances" => Ok(Layout::Instances),
            "entries" => Ok(Layout::Entries),
            "features" => Ok(Layout::Features),
            "events" | "entry-features" => Ok(Layout::Events),
            "similarities" | "sims" => Ok(Layout::Similarities),
            _ => Err(Error::config(format!("unknown file layout \"{}\"", s))),
        }
    }
}

/// On-disk encoding of a weighted file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    /// Entry columns hold ids rather than strings.
    pub enumerated_entries: bool,
    /// Feature columns hold ids rather than strings.
    pub enumerated_features: bool,
    pub compact: bool,
    pub delta: DeltaColumns,
}

impl Format {
    /// Plain ids, one record per line. Used for intermediate files.
    pub const ENUMERATED: Format = Format {
        enumerated_entries: true,
        enumerated_features: true,
        compact: false,
        delta: DeltaColumns::NONE,
    };

    pub fn strings() -> Self {
        Format::default()
    }

    pub fn is_enumerated(&self) -> bool {
        self.enumerated_entries && self.enumerated_features
    }

    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Column routing for `layout`. With a combined vocabulary every string
    /// column goes through dictionary 0; otherwise entries use 0 and
    /// features 1.
    pub fn slots(&self, layout: Layout, combined: bool) -> Slots {
        Slots::new(
            layout
                .vocabularies()
                .iter()
                .map(|v| match v {
                    Vocab::Entry if self.enumerated_entries => None,
                    Vocab::Feature if self.enumerated_features => None,
                    _ if combined => Some(0),
                    Vocab::Entry => Some(0),
                    Vocab::Feature => Some(1),
                })
                .collect(),
        )
    }

    /// Reject delta encoding on columns that carry strings.
    pub fn validate(&self, layout: Layout) -> Result<()> {
        let strings = self.slots(layout, false);
        if strings.mapped().any(|c| self.delta.covers(c)) {
            return Err(Error::config(format!(
                "delta encoding of {} requires enumerated columns",
                layout
            )));
        }
        Ok(())
    }

    pub fn source<'a, D>(
        &self,
        path: &Path,
        layout: Layout,
        dictionaries: Vec<D>,
        combined: bool,
    ) -> Result<BoxSource<'a>>
    where
        D: Dictionary + Send + 'a,
    {
        let mut builder = SourceBuilder::new(path).delta(self.delta);
        if self.compact {
            builder = builder.compact(layout.record_width());
        }
        builder.build_with(dictionaries, self.slots(layout, combined))
    }

    pub fn sink<'a, D>(&self, path: &Path, layout: Layout, dictionaries: Vec<D>, combined: bool) -> Result<BoxSink<'a>>
    where
        D: Dictionary + Send + 'a,
    {
        SinkBuilder::new(path)
            .delta(self.delta)
            .compact(self.compact)
            .build_with(dictionaries, self.slots(layout, combined))
    }
}

/// The entry and feature enumerators of one job, while they may still grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    dictionaries: Vec<Enumerator>,
    combined: bool,
}

impl Vocabulary {
    pub fn new(combined: bool) -> Self {
        let n = if combined { 1 } else { 2 };
        Vocabulary { dictionaries: vec![Enumerator::new(); n], combined }
    }

    /// Load persisted tables where they exist. A combined vocabulary lives
    /// in the entries table alone.
    pub fn open(entries: Option<&Path>, features: Option<&Path>, combined: bool) -> Result<Self> {
        let load = |p: Option<&Path>| p.map(Enumerator::open).transpose().map(Option::unwrap_or_default);
        let mut dictionaries = vec![load(entries)?];
        if !combined {
            dictionaries.push(load(features)?);
        }
        Ok(Vocabulary { dictionaries, combined })
    }

    pub fn save(&self, entries: Option<&Path>, features: Option<&Path>) -> Result<()> {
        if let Some(p) = entries {
            self.entries().save(p)?;
        }
        if let (Some(p), false) = (features, self.combined) {
            self.features().save(p)?;
        }
        Ok(())
    }

    pub fn is_combined(&self) -> bool {
        self.combined
    }

    pub fn entries(&self) -> &Enumerator {
        &self.dictionaries[0]
    }

    pub fn features(&self) -> &Enumerator {
        &self.dictionaries[self.dictionaries.len() - 1]
    }

    /// Exclusive handles in slot order, for interning.
    pub fn writers(&mut self) -> Vec<&mut Enumerator> {
        self.dictionaries.iter_mut().collect()
    }

    pub fn freeze(self) -> FrozenVocabulary {
        FrozenVocabulary {
            dictionaries: self.dictionaries.into_iter().map(Arc::new).collect(),
            combined: self.combined,
        }
    }
}

/// Read-only, cheaply cloned view of a [`Vocabulary`].
#[derive(Debug, Clone)]
pub struct FrozenVocabulary {
    dictionaries: Vec<Arc<Enumerator>>,
    combined: bool,
}

impl FrozenVocabulary {
    pub fn is_combined(&self) -> bool {
        self.combined
    }

    /// Shared handles in slot order, for lookups.
    pub fn readers(&self) -> Vec<Arc<Enumerator>> {
        self.dictionaries.clone()
    }

    pub fn entries(&self) -> &Enumerator {
        &self.dictionaries[0]
    }

    pub fn features(&self) -> &Enumerator {
        &self.dictionaries[self.dictionaries.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_vocabulary_mode() {
        let strings = Format::strings();
        assert_eq!(strings.slots(Layout::Events, false), Slots::new(vec![Some(0), Some(1)]));
        assert_eq!(strings.slots(Layout::Events, true), Slots::new(vec![Some(0), Some(0)]));
        assert_eq!(strings.slots(Layout::Features, false), Slots::new(vec![Some(1)]));
        assert_eq!(strings.slots(Layout::Similarities, false), Slots::new(vec![Some(0), Some(0)]));

        let half = Format { enumerated_features: true, ..Format::default() };
        assert_eq!(half.slots(Layout::Events, false), Slots::new(vec![Some(0), None]));
        assert!(Format::ENUMERATED.slots(Layout::Events, false).is_empty());
    }

    #[test]
    fn delta_needs_enumerated_columns() {
        let mut f = Format::strings();
        f.delta = DeltaColumns::new(true, false);
        assert!(f.validate(Layout::Events).is_err());
        f.enumerated_entries = true;
        assert!(f.validate(Layout::Events).is_ok());
    }

    #[test]
    fn vocabulary_round_trips_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let (ep, fp) = (dir.path().join("e.enum"), dir.path().join("f.enum"));
        let mut v = Vocabulary::new(false);
        {
            let mut w = v.writers();
            w[0].index("apple").unwrap();
            w[1].index("red").unwrap();
            w[1].index("round").unwrap();
        }
        v.save(Some(&ep), Some(&fp)).unwrap();
        let loaded = Vocabulary::open(Some(&ep), Some(&fp), false).unwrap();
        assert_eq!(loaded, v);
        let frozen = loaded.freeze();
        assert_eq!(frozen.features().get("round"), Some(1));
        assert_eq!(frozen.readers().len(), 2);
    }
}
