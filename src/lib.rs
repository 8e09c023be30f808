//! Out-of-core distributional similarity.
//!
//! The crate turns a large file of `entry feature` observations into
//! frequency tables and then scores pairs of entries by how similar their
//! feature vectors are. Nothing is assumed to fit in memory: counts are
//! produced by sorting and merging chunk files, and the all-pairs search
//! streams one of its operands from disk.
//!
//! The pieces, bottom up:
//! - [`codec`] is the layered record codec (TSV, delta, compact and
//!   dictionary layers) with resumable [`codec::Tell`] positions.
//! - [`record`] holds typed records over the codec and the on-disk
//!   [`record::Format`].
//! - [`external`] is the chunk, sort and merge pipeline behind counting.
//! - [`vector`], [`weighting`] and [`measure`] describe feature vectors and
//!   how two of them are compared.
//! - [`apss`] is the all-pairs similarity search.
//! - [`jobs`] ties these together into the `count`, `sort`, `allpairs` and
//!   `convert` jobs the binary runs.
pub mod apss;
pub mod codec;
pub mod error;
pub mod external;
pub mod jobs;
pub mod measure;
pub mod record;
pub mod utils;
pub mod vector;
pub mod weighting;

/// Error type shared by every module.
pub use error::{Error, Result};

/// Job configurations, each validated before it runs.
pub use jobs::{AllPairsConfig, ConvertConfig, CountConfig, CountStats, SortConfig};

/// Interning of strings to dense ids.
pub use utils::enumerator::Enumerator;

pub use apss::{AllPairs, ApssStats, ProductionFilter, Scorer, Strategy};
pub use measure::{Measure, MeasureKind};
pub use record::{Format, Layout, Token, TokenPair, Weighted};
pub use vector::SparseDoubleVector;
pub use weighting::{FeatureMarginals, Weighting, WeightingKind};
