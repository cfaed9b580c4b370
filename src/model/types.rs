//! Object types of the sample model and their kinds
//!
//! | type    | data                                    | kinds           |
//! |---------|-----------------------------------------|-----------------|
//! | nil     | none                                    | 1, uncollected  |
//! | symbol  | value reference and `u64` id            | 1, uncollected  |
//! | int vec | `i64` elements                          | 4 classes + big |
//! | pair    | two references                          | 1               |
//! | cell    | one reference and an `i64`              | 1               |
//! | vector  | trailing array of references            | 4 classes + big |

use crate::memory::heap::REF_BYTES;
use crate::memory::{AuxLength, KindId, KindSpec, ObjectLayout, TypeTag};

pub const NIL: TypeTag = TypeTag(0);
pub const SYMBOL: TypeTag = TypeTag(1);
pub const INT_VEC: TypeTag = TypeTag(2);
pub const PAIR: TypeTag = TypeTag(3);
pub const CELL: TypeTag = TypeTag(4);
pub const VECTOR: TypeTag = TypeTag(5);

/// Size classes, in chunks, of variable length types
pub const CLASSES: [usize; 4] = [1, 2, 4, 8];

const NIL_KIND: KindId = KindId(0);
const SYMBOL_KIND: KindId = KindId(1);
const INT_VEC_KINDS: u16 = 2;
const PAIR_KIND: KindId = KindId(7);
const CELL_KIND: KindId = KindId(8);
const VECTOR_KINDS: u16 = 9;

/// Offset of a cell's integer payload
pub const CELL_INT_OFFSET: usize = 8;

/// Offset of a symbol's id, after its value reference
pub const SYMBOL_ID_OFFSET: usize = 8;

pub fn type_name(tag: TypeTag) -> &'static str {
    match tag {
        NIL => "nil",
        SYMBOL => "symbol",
        INT_VEC => "int-vec",
        PAIR => "pair",
        CELL => "cell",
        VECTOR => "vector",
        _ => "unknown",
    }
}

/// Layout of the sample model for a given chunk size
#[derive(Debug, Clone, Copy)]
pub struct ModelLayout {
    chunk_bytes: usize,
}

impl ModelLayout {
    pub fn new(chunk_bytes: usize) -> Self {
        ModelLayout { chunk_bytes }
    }

    fn bytes_for(tag: TypeTag, length: usize) -> usize {
        match tag {
            NIL => 0,
            SYMBOL => SYMBOL_ID_OFFSET + 8,
            INT_VEC => length.saturating_mul(8),
            PAIR => 2 * REF_BYTES,
            CELL => CELL_INT_OFFSET + 8,
            VECTOR => length.saturating_mul(REF_BYTES),
            _ => 0,
        }
    }

    /// Kind of the smallest class holding `chunks`, counting from the
    /// first kind of a variable length type
    fn class_kind(first: u16, chunks: usize) -> KindId {
        let class = CLASSES
            .iter()
            .position(|c| chunks <= *c)
            .unwrap_or(CLASSES.len());
        KindId(first + class as u16)
    }

    fn classed(tag: TypeTag) -> impl Iterator<Item = KindSpec> {
        CLASSES
            .iter()
            .map(move |c| KindSpec::small(tag, *c).with_length(AuxLength::Stored))
            .chain(std::iter::once(
                KindSpec::big(tag).with_length(AuxLength::Stored),
            ))
    }
}

impl ObjectLayout for ModelLayout {
    fn kinds(&self) -> Vec<KindSpec> {
        let fixed = |tag| self.chunks_for(tag, 0);
        let mut kinds = vec![
            KindSpec::small(NIL, 1)
                .uncollected()
                .with_length(AuxLength::Constant(0)),
            KindSpec::small(SYMBOL, fixed(SYMBOL))
                .uncollected()
                .with_length(AuxLength::Constant(1)),
        ];
        kinds.extend(Self::classed(INT_VEC));
        kinds.push(KindSpec::small(PAIR, fixed(PAIR)));
        kinds.push(KindSpec::small(CELL, fixed(CELL)));
        kinds.extend(Self::classed(VECTOR));
        kinds
    }

    fn kind_for(&self, tag: TypeTag, length: usize) -> KindId {
        match tag {
            NIL => NIL_KIND,
            SYMBOL => SYMBOL_KIND,
            INT_VEC => Self::class_kind(INT_VEC_KINDS, self.chunks_for(tag, length)),
            PAIR => PAIR_KIND,
            CELL => CELL_KIND,
            VECTOR => Self::class_kind(VECTOR_KINDS, self.chunks_for(tag, length)),
            _ => KindId(u16::MAX),
        }
    }

    fn chunks_for(&self, tag: TypeTag, length: usize) -> usize {
        Self::bytes_for(tag, length).div_ceil(self.chunk_bytes).max(1)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::memory::Chunks;

    #[test]
    pub fn test_kind_table_shape() {
        let layout = ModelLayout::new(16);
        let kinds = layout.kinds();
        assert_eq!(kinds.len(), 14);
        assert!(kinds[0].uncollected && kinds[1].uncollected);
        assert_eq!(kinds[PAIR_KIND.as_usize()].tag, PAIR);
        assert_eq!(kinds[CELL_KIND.as_usize()].tag, CELL);
        assert_eq!(kinds[6].chunks, Chunks::Big);
        assert_eq!(kinds[13].chunks, Chunks::Big);
        assert_eq!(kinds[13].tag, VECTOR);
    }

    #[test]
    pub fn test_classes_by_length() {
        let layout = ModelLayout::new(16);
        assert_eq!(layout.kind_for(INT_VEC, 0), KindId(2));
        assert_eq!(layout.kind_for(INT_VEC, 2), KindId(2));
        assert_eq!(layout.kind_for(INT_VEC, 3), KindId(3));
        assert_eq!(layout.kind_for(INT_VEC, 16), KindId(5));
        assert_eq!(layout.kind_for(INT_VEC, 17), KindId(6));
        assert_eq!(layout.kind_for(VECTOR, 4), KindId(9));
        assert_eq!(layout.kind_for(VECTOR, 5), KindId(10));
        assert_eq!(layout.kind_for(VECTOR, 33), KindId(13));
    }

    #[test]
    pub fn test_kind_for_is_monotonic() {
        let layout = ModelLayout::new(16);
        let kinds = layout.kinds();
        let capacity = |k: KindId| match kinds[k.as_usize()].chunks {
            Chunks::Fixed(n) => n,
            Chunks::Big => usize::MAX,
        };
        for tag in [INT_VEC, VECTOR] {
            let mut last = 0;
            for length in 0..200 {
                let c = capacity(layout.kind_for(tag, length));
                assert!(c >= last);
                assert!(c >= layout.chunks_for(tag, length));
                last = c;
            }
        }
    }

    #[test]
    pub fn test_small_chunks() {
        let layout = ModelLayout::new(8);
        assert_eq!(layout.chunks_for(CELL, 0), 2);
        assert_eq!(layout.chunks_for(PAIR, 0), 1);
        assert_eq!(layout.chunks_for(INT_VEC, 100), 100);
        assert_eq!(layout.chunks_for(SYMBOL, 1), 2);
    }

    #[test]
    pub fn test_huge_lengths_map_to_big_kinds() {
        let layout = ModelLayout::new(16);
        assert_eq!(layout.chunks_for(INT_VEC, usize::MAX), usize::MAX / 16 + 1);
        assert_eq!(layout.chunks_for(VECTOR, usize::MAX), usize::MAX / 16 + 1);
        assert_eq!(layout.kind_for(INT_VEC, usize::MAX), KindId(6));
        assert_eq!(layout.kind_for(VECTOR, usize::MAX), KindId(13));
    }
}
