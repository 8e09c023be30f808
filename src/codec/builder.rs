use std::path::{Path, PathBuf};

use crate::{
    codec::{
        compact::{CompactSink, CompactSource},
        delta::{DeltaColumns, DeltaSink, DeltaSource},
        dictionary::{Dictionary, DictionarySink, DictionarySource, Slots},
        tsv::{TsvSink, TsvSource},
        DataSink, DataSource,
    },
    error::{Error, Result},
};

pub type BoxSource<'a> = Box<dyn DataSource + Send + 'a>;
pub type BoxSink<'a> = Box<dyn DataSink + Send + 'a>;

/// Shared layer options of [`SourceBuilder`] and [`SinkBuilder`].
#[derive(Debug, Clone, Default)]
struct Layers {
    delta: DeltaColumns,
    compact: Option<usize>,
}

impl Layers {
    fn check(&self, slots: &Slots) -> Result<()> {
        if let Some(column) = slots.mapped().find(|&c| self.delta.covers(c)) {
            return Err(Error::config(format!(
                "delta encoding only applies to integer columns, but column {} is dictionary encoded",
                column
            )));
        }
        Ok(())
    }
}

/// Opens a record file and stacks the requested layers on it, innermost
/// first: tsv → delta → compact → dictionary.
///
/// ```no_run
/// use distsim::codec::{SourceBuilder, delta::DeltaColumns};
///
/// let source = SourceBuilder::new("events.tsv")
///     .delta(DeltaColumns::new(true, false))
///     .compact(3)
///     .build()?;
/// # Ok::<(), distsim::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct SourceBuilder {
    path: PathBuf,
    layers: Layers,
}

impl SourceBuilder {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        SourceBuilder { path: path.as_ref().to_path_buf(), layers: Layers::default() }
    }

    pub fn delta(mut self, columns: DeltaColumns) -> Self {
        self.layers.delta = columns;
        self
    }

    /// Expand compact lines into records of `width` columns.
    pub fn compact(mut self, width: usize) -> Self {
        self.layers.compact = Some(width);
        self
    }

    fn base<'a>(&self) -> Result<BoxSource<'a>> {
        let mut source: BoxSource<'a> = Box::new(TsvSource::open(&self.path)?);
        if self.layers.delta.any() {
            source = Box::new(DeltaSource::new(source, self.layers.delta));
        }
        if let Some(width) = self.layers.compact {
            source = Box::new(CompactSource::new(source, width));
        }
        Ok(source)
    }

    pub fn build(self) -> Result<BoxSource<'static>> {
        self.base()
    }

    /// Build with a dictionary layer on top.
    pub fn build_with<'a, D>(self, dictionaries: Vec<D>, slots: Slots) -> Result<BoxSource<'a>>
    where
        D: Dictionary + Send + 'a,
    {
        if slots.is_empty() {
            return self.base();
        }
        self.layers.check(&slots)?;
        let inner = self.base()?;
        Ok(Box::new(DictionarySource::new(inner, dictionaries, slots)))
    }
}

/// Write side counterpart of [`SourceBuilder`].
#[derive(Debug, Clone)]
pub struct SinkBuilder {
    path: PathBuf,
    layers: Layers,
}

impl SinkBuilder {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        SinkBuilder { path: path.as_ref().to_path_buf(), layers: Layers::default() }
    }

    pub fn delta(mut self, columns: DeltaColumns) -> Self {
        self.layers.delta = columns;
        self
    }

    /// Group consecutive records sharing a key onto one line.
    pub fn compact(mut self, enabled: bool) -> Self {
        self.layers.compact = if enabled { Some(0) } else { None };
        self
    }

    fn base<'a>(&self) -> Result<BoxSink<'a>> {
        let mut sink: BoxSink<'a> = Box::new(TsvSink::create(&self.path)?);
        if self.layers.delta.any() {
            sink = Box::new(DeltaSink::new(sink, self.layers.delta));
        }
        if self.layers.compact.is_some() {
            sink = Box::new(CompactSink::new(sink));
        }
        Ok(sink)
    }

    pub fn build(self) -> Result<BoxSink<'static>> {
        self.base()
    }

    pub fn build_with<'a, D>(self, dictionaries: Vec<D>, slots: Slots) -> Result<BoxSink<'a>>
    where
        D: Dictionary + Send + 'a,
    {
        if slots.is_empty() {
            return self.base();
        }
        self.layers.check(&slots)?;
        let inner = self.base()?;
        Ok(Box::new(DictionarySink::new(inner, dictionaries, slots)))
    }
}
