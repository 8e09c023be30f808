use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A value carried inside a [`Tell`] by one codec layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Carried {
    None,
    Int(i64),
    Str(String),
    Ints(Vec<i64>),
}

impl Carried {
    /// Render as column text, used when a compact key is replayed through
    /// a string read.
    pub fn to_text(&self) -> String {
        match self {
            Carried::None => String::new(),
            Carried::Int(v) => v.to_string(),
            Carried::Str(s) => s.clone(),
            Carried::Ints(vs) => vs.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","),
        }
    }
}

/// Position cursor over a record stream.
///
/// The byte offset locates the next unread column in the underlying file.
/// Every codec layer stacked on top of the file pushes the state it needs to
/// resume reading (column counter, delta history, pending compact key), so
/// seeking to a `Tell` restores the whole chain exactly as it was when the
/// position was taken.
///
/// Tells compare by offset first, so positions from the same stream order
/// the same way the records do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tell {
    offset: u64,
    state: Vec<Carried>,
}

impl Tell {
    /// Position of the first record of a stream.
    pub fn start() -> Self {
        Tell { offset: 0, state: Vec::new() }
    }

    pub fn at(offset: u64) -> Self {
        Tell { offset, state: Vec::new() }
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Depth of the layer state stack.
    #[inline]
    pub fn depth(&self) -> usize {
        self.state.len()
    }

    /// Push one layer's state on top of the inner layers' state.
    pub fn push(mut self, value: Carried) -> Self {
        self.state.push(value);
        self
    }

    /// Remove the outermost layer state.
    pub fn pop(mut self) -> Result<(Self, Carried)> {
        match self.state.pop() {
            Some(value) => Ok((self, value)),
            None => Err(Error::config(format!(
                "tell at byte {} carries no state for this codec layer",
                self.offset
            ))),
        }
    }

    pub fn pop_int(self) -> Result<(Self, i64)> {
        let (rest, value) = self.pop()?;
        match value {
            Carried::Int(v) => Ok((rest, v)),
            other => Err(Error::config(format!("expected integer layer state, found {:?}", other))),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_cbor::from_slice(bytes)?)
    }
}

impl PartialOrd for Tell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tell {
    fn cmp(&self, other: &Self) -> Ordering {
        self.offset.cmp(&other.offset).then_with(|| self.state.cmp(&other.state))
    }
}

impl fmt::Display for Tell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.offset)?;
        if !self.state.is_empty() {
            write!(f, "{:?}", self.state)?;
        }
        Ok(())
    }
}
