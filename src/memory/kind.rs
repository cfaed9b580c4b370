//! Kinds and the size-class table
//!
//! A kind binds an object type and a size class to a chunk count and a
//! collectability flag. The runtime supplies the kinds, and the
//! mapping from a requested (type, length) to a kind, through
//! [`ObjectLayout`]. The table is validated once and is read-only
//! thereafter.

use std::fmt;

use super::cptr::MAX_SEGMENT_CHUNKS;
use super::error::ConfigError;

/// Runtime-defined object type
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeTag(pub u8);

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into the kind table
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KindId(pub u16);

impl KindId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Most kinds a table may hold
pub const MAX_KINDS: usize = u16::MAX as usize;

/// Chunks occupied by each object of a kind
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Chunks {
    /// Small objects sharing segments, `n` chunks each
    Fixed(usize),
    /// One object per segment, sized from its requested length
    Big,
}

/// Where the length of an object is kept, if anywhere
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum AuxLength {
    /// The runtime keeps lengths itself (or has none)
    #[default]
    None,
    /// A side table beside the chunk data records each length
    Stored,
    /// All objects of the kind share one read-only length
    Constant(u32),
}

/// A configuration entry in the kind table
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KindSpec {
    pub tag: TypeTag,
    pub chunks: Chunks,
    /// Objects are never swept; they are scanned whenever reached
    pub uncollected: bool,
    pub length: AuxLength,
    /// Call `Tracer::freed` before objects of the kind are swept
    pub finalize: bool,
}

impl KindSpec {
    /// A collectable small kind
    pub fn small(tag: TypeTag, chunks: usize) -> Self {
        KindSpec {
            tag,
            chunks: Chunks::Fixed(chunks),
            uncollected: false,
            length: AuxLength::None,
            finalize: false,
        }
    }

    /// A collectable big kind
    pub fn big(tag: TypeTag) -> Self {
        KindSpec {
            tag,
            chunks: Chunks::Big,
            uncollected: false,
            length: AuxLength::None,
            finalize: false,
        }
    }

    pub fn uncollected(self) -> Self {
        KindSpec {
            uncollected: true,
            ..self
        }
    }

    pub fn with_length(self, length: AuxLength) -> Self {
        KindSpec { length, ..self }
    }

    pub fn finalized(self) -> Self {
        KindSpec {
            finalize: true,
            ..self
        }
    }

    pub fn is_big(&self) -> bool {
        self.chunks == Chunks::Big
    }
}

/// Shape knowledge supplied by the embedding runtime
///
/// `kind_for` must be pure and monotonic in `length`: a longer object
/// never maps to a kind with a smaller capacity.
pub trait ObjectLayout: Send {
    /// The kind table, read once when the heap is built
    fn kinds(&self) -> Vec<KindSpec>;

    /// Kind for an object of `tag` and `length`
    fn kind_for(&self, tag: TypeTag, length: usize) -> KindId;

    /// Chunks needed by an object of `tag` and `length`; consulted for
    /// big kinds whose size is not a function of the kind alone
    fn chunks_for(&self, tag: TypeTag, length: usize) -> usize;
}

/// Validated, immutable kind table
#[derive(Debug, Clone)]
pub struct KindTable {
    kinds: Vec<KindSpec>,
}

impl KindTable {
    /// Check kinds against the segment geometry
    pub fn new(kinds: Vec<KindSpec>, segment_chunks: usize) -> Result<Self, ConfigError> {
        if kinds.is_empty() || kinds.len() > MAX_KINDS {
            return Err(ConfigError::KindCount(MAX_KINDS));
        }

        debug_assert!(segment_chunks <= MAX_SEGMENT_CHUNKS);

        for (i, spec) in kinds.iter().enumerate() {
            let kind = KindId(i as u16);
            match spec.chunks {
                Chunks::Fixed(0) => return Err(ConfigError::EmptyKind(kind)),
                Chunks::Fixed(n) if n > segment_chunks => {
                    return Err(ConfigError::KindTooLarge {
                        kind,
                        chunks: n,
                        segment_chunks,
                    })
                }
                _ => {}
            }
        }

        Ok(KindTable { kinds })
    }

    pub fn get(&self, kind: KindId) -> Option<&KindSpec> {
        self.kinds.get(kind.as_usize())
    }

    /// Spec for a kind known to be in the table
    pub fn spec(&self, kind: KindId) -> &KindSpec {
        &self.kinds[kind.as_usize()]
    }

    pub fn chunks(&self, kind: KindId) -> Chunks {
        self.spec(kind).chunks
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KindId, &KindSpec)> {
        self.kinds
            .iter()
            .enumerate()
            .map(|(i, spec)| (KindId(i as u16), spec))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_rejects_oversized_kind() {
        let kinds = vec![KindSpec::small(TypeTag(0), 1), KindSpec::small(TypeTag(1), 65)];
        assert_eq!(
            KindTable::new(kinds, 64).unwrap_err(),
            ConfigError::KindTooLarge {
                kind: KindId(1),
                chunks: 65,
                segment_chunks: 64
            }
        );
    }

    #[test]
    pub fn test_rejects_kind_larger_than_short_segments() {
        let kinds = vec![KindSpec::small(TypeTag(0), 32)];
        assert!(KindTable::new(kinds.clone(), 16).is_err());
        assert!(KindTable::new(kinds, 32).is_ok());
    }

    #[test]
    pub fn test_rejects_empty_kind() {
        let kinds = vec![KindSpec::small(TypeTag(0), 0)];
        assert_eq!(
            KindTable::new(kinds, 64).unwrap_err(),
            ConfigError::EmptyKind(KindId(0))
        );
        assert!(KindTable::new(vec![], 64).is_err());
    }

    #[test]
    pub fn test_builders() {
        let spec = KindSpec::big(TypeTag(3))
            .with_length(AuxLength::Stored)
            .finalized();
        assert!(spec.is_big());
        assert!(spec.finalize);
        assert!(!spec.uncollected);
        assert_eq!(spec.length, AuxLength::Stored);
        assert!(KindSpec::small(TypeTag(0), 1).uncollected().uncollected);
    }
}
