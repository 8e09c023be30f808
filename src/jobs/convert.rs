use std::{fmt, path::PathBuf};

use serde::Serialize;

use crate::{
    error::Result,
    jobs,
    record::{Format, Layout, Vocabulary},
    utils::temp::TempFiles,
};

/// Re-encodes a file: verbose or compact, strings or ids, delta or not.
///
/// Records pass through an enumerated scratch file, so the vocabulary is
/// only ever written while reading and only read while writing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub layout: Layout,
    pub from: Format,
    pub to: Format,
    pub entries_index: Option<PathBuf>,
    pub features_index: Option<PathBuf>,
    pub combined: bool,
    pub temp_dir: PathBuf,
    pub keep_temporary: bool,
    pub skip_malformed: bool,
    pub charset: String,
}

impl ConvertConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, layout: Layout) -> Self {
        ConvertConfig {
            input: input.into(),
            output: output.into(),
            layout,
            from: Format::strings(),
            to: Format::strings(),
            entries_index: None,
            features_index: None,
            combined: false,
            temp_dir: jobs::default_temp_dir(),
            keep_temporary: false,
            skip_malformed: false,
            charset: jobs::CHARSET.to_owned(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        jobs::check_charset(&self.charset)?;
        jobs::check_input("input", &self.input)?;
        jobs::check_distinct(&[("input", &self.input), ("output", &self.output)])?;
        self.from.validate(self.layout)?;
        self.to.validate(self.layout)
    }

    /// Returns the number of records converted.
    pub fn run(&self) -> Result<u64> {
        self.validate()?;
        tracing::info!(config = %self, "starting convert");
        let temp = TempFiles::new(&self.temp_dir, self.keep_temporary)?;
        let mut vocabulary =
            Vocabulary::open(self.entries_index.as_deref(), self.features_index.as_deref(), self.combined)?;

        let scratch = temp.allocate("cnv.");
        let source = self.from.source(&self.input, self.layout, vocabulary.writers(), self.combined)?;
        let sink = Format::ENUMERATED.sink(&scratch, self.layout, jobs::no_dictionaries(), false)?;
        jobs::transcode_layout(self.layout, source, sink, self.skip_malformed)?;

        if !self.from.is_enumerated() {
            vocabulary.save(self.entries_index.as_deref(), self.features_index.as_deref())?;
        }
        let n = jobs::publish(Some(&scratch), &self.output, self.layout, &self.to, &vocabulary.freeze())?;
        temp.discard(&scratch)?;
        Ok(n)
    }
}

impl fmt::Display for ConvertConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let describe = |format: &Format| {
            format!(
                "{}{}",
                if format.is_enumerated() { "enumerated" } else { "strings" },
                if format.compact { ", compact" } else { "" }
            )
        };
        write!(
            f,
            "{} {} ({}) -> {} ({})",
            self.layout,
            self.input.display(),
            describe(&self.from),
            self.output.display(),
            describe(&self.to)
        )
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{codec::delta::DeltaColumns, error::Error};

    #[test]
    fn strings_to_compact_ids_and_back() {
        let dir = tempfile::tempdir().unwrap();
        let p = |n: &str| dir.path().join(n);
        let text = "cat\tpet\t2\ncat\tfurry\t1\ndog\tpet\t3\n";
        fs::write(p("events"), text).unwrap();

        let mut there = ConvertConfig::new(p("events"), p("ids"), Layout::Events);
        there.temp_dir = p("tmp");
        there.entries_index = Some(p("entries.index"));
        there.features_index = Some(p("features.index"));
        there.to = Format::ENUMERATED.with_compact(true);
        there.to.delta = DeltaColumns::new(true, false);
        assert_eq!(there.run().unwrap(), 3);
        assert_eq!(fs::read_to_string(p("ids")).unwrap(), "0\t0\t2\t1\t1\n1\t0\t3\n");

        let mut back = ConvertConfig::new(p("ids"), p("strings"), Layout::Events);
        back.temp_dir = p("tmp");
        back.entries_index = there.entries_index.clone();
        back.features_index = there.features_index.clone();
        back.from = there.to;
        assert_eq!(back.run().unwrap(), 3);
        assert_eq!(fs::read_to_string(p("strings")).unwrap(), text);
    }

    #[test]
    fn unknown_ids_fail_when_decoding() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("entries"), "7\t1\n").unwrap();
        let mut c = ConvertConfig::new(dir.path().join("entries"), dir.path().join("out"), Layout::Entries);
        c.temp_dir = dir.path().join("tmp");
        c.from = Format::ENUMERATED;
        assert!(matches!(c.run(), Err(Error::UnknownId(7))));
    }
}
