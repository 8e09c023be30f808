use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::{
    codec::tsv::check_field,
    error::{Error, Result},
};

/// Append-only bijection between strings and dense `u32` ids.
///
/// Ids are assigned in first-seen order and never reused. While a job is
/// interning new strings it holds the enumerator by `&mut`; once writing is
/// done it can be frozen behind an `Arc` and shared with readers.
///
/// On disk the table is one string per line, line `n` holding id `n`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enumerator {
    values: IndexSet<Box<str>>,
}

impl Enumerator {
    pub fn new() -> Self {
        Self { values: IndexSet::new() }
    }

    /// Load a persisted table.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut values = IndexSet::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if !values.insert(Box::<str>::from(line)) {
                return Err(Error::config(format!(
                    "enumerator table {} repeats \"{}\" on line {}",
                    path.display(),
                    line,
                    n + 1
                )));
            }
        }
        tracing::debug!(path = %path.display(), len = values.len(), "loaded enumerator");
        Ok(Self { values })
    }

    /// Load `path` if it exists, otherwise start empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        for value in &self.values {
            check_field(value)?;
        }
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        for value in &self.values {
            writer.write_all(value.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        tracing::debug!(path = %path.as_ref().display(), len = self.values.len(), "saved enumerator");
        Ok(())
    }

    /// Id of `value`, interning it if unseen.
    pub fn index(&mut self, value: &str) -> Result<u32> {
        if let Some(id) = self.values.get_index_of(value) {
            return Ok(id as u32);
        }
        check_field(value)?;
        if self.values.len() > u32::MAX as usize {
            return Err(Error::config("enumerator is full"));
        }
        let (id, _) = self.values.insert_full(Box::from(value));
        Ok(id as u32)
    }

    /// Id of `value` without interning.
    #[inline]
    pub fn get(&self, value: &str) -> Option<u32> {
        self.values.get_index_of(value).map(|id| id as u32)
    }

    #[inline]
    pub fn value(&self, id: u32) -> Option<&str> {
        self.values.get_index(id as usize).map(|v| v.as_ref())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.values.iter().enumerate().map(|(id, v)| (id as u32, v.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_first_seen_order() {
        let mut e = Enumerator::new();
        assert_eq!(e.index("the").unwrap(), 0);
        assert_eq!(e.index("cat").unwrap(), 1);
        assert_eq!(e.index("the").unwrap(), 0);
        assert_eq!(e.get("cat"), Some(1));
        assert_eq!(e.get("dog"), None);
        assert_eq!(e.value(1), Some("cat"));
        assert_eq!(e.value(2), None);
        assert_eq!(e.len(), 2);
    }

    #[test]
    fn saved_table_loads_with_the_same_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.enum");
        let mut e = Enumerator::new();
        for w in ["apple", "pear", "lemon"] {
            e.index(w).unwrap();
        }
        e.save(&path).unwrap();
        let loaded = Enumerator::load(&path).unwrap();
        assert_eq!(loaded, e);
        assert_eq!(loaded.get("lemon"), Some(2));

        let missing = Enumerator::open(dir.path().join("none.enum")).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn duplicate_lines_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.enum");
        std::fs::write(&path, "a\nb\na\n").unwrap();
        assert!(matches!(Enumerator::load(&path), Err(Error::Configuration(_))));
    }

    #[test]
    fn strings_with_delimiters_are_never_interned_or_saved() {
        let mut e = Enumerator::new();
        assert!(matches!(e.index("two\twords"), Err(Error::Configuration(_))));
        assert!(matches!(e.index("cr\r"), Err(Error::Configuration(_))));
        assert!(e.is_empty());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.enum");
        std::fs::write(&path, "ok\nhas\ttab\n").unwrap();
        let loaded = Enumerator::load(&path).unwrap();
        let out = dir.path().join("out.enum");
        assert!(matches!(loaded.save(&out), Err(Error::Configuration(_))));
        assert!(!out.exists());
    }
}
