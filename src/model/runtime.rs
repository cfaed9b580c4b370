//! A minimal runtime over the heap
//!
//! Objects are kept alive by pushing them on a root stack. Every
//! constructor roots its arguments while it allocates, so a collection
//! triggered by the allocation cannot sweep them. Interned symbols are
//! roots too, which makes a symbol's value a global binding.

use std::collections::HashMap;

use log::debug;

use crate::memory::heap::REF_BYTES;
use crate::memory::{
    CollectionReport, Generation, Heap, HeapConfig, HeapError, HeapView, ObjRef, Tracer, TypeTag,
};

use super::error::ModelError;
use super::types::{
    ModelLayout, CELL, CELL_INT_OFFSET, INT_VEC, NIL, PAIR, SYMBOL, SYMBOL_ID_OFFSET, VECTOR,
};

/// Explicit roots of the model runtime
#[derive(Debug, Default)]
pub struct RootStack {
    stack: Vec<ObjRef>,
    /// Interned symbols, in order of creation
    symbols: Vec<ObjRef>,
}

impl RootStack {
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn symbols(&self) -> &[ObjRef] {
        &self.symbols
    }
}

impl Tracer for RootStack {
    fn roots(&self, visit: &mut dyn FnMut(ObjRef)) {
        self.stack
            .iter()
            .chain(self.symbols.iter())
            .for_each(|r| visit(*r));
    }

    fn object_refs(&self, view: &HeapView<'_>, obj: ObjRef, visit: &mut dyn FnMut(ObjRef)) {
        let slots = match view.type_of(obj) {
            PAIR => 2,
            CELL | SYMBOL => 1,
            VECTOR => view.length_of(obj).unwrap_or(0),
            _ => 0,
        };
        for slot in 0..slots {
            if let Ok(r) = view.read_ref(obj, slot) {
                visit(r);
            }
        }
    }
}

pub struct Runtime {
    heap: Heap,
    roots: RootStack,
    nil: ObjRef,
    symbols: HashMap<u64, ObjRef>,
    /// Run the configured collection policy before allocating
    auto_collect: bool,
}

impl Runtime {
    pub fn new(config: HeapConfig) -> Result<Self, ModelError> {
        let layout = ModelLayout::new(config.chunk_bytes);
        let mut heap = Heap::new(config, layout)?;
        let nil = heap.alloc(NIL, 0)?;
        Ok(Runtime {
            heap,
            roots: RootStack::default(),
            nil,
            symbols: HashMap::new(),
            auto_collect: true,
        })
    }

    pub fn with_auto_collect(self, auto_collect: bool) -> Self {
        Runtime {
            auto_collect,
            ..self
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn roots(&self) -> &RootStack {
        &self.roots
    }

    pub fn push_root(&mut self, obj: ObjRef) {
        self.roots.stack.push(obj);
    }

    pub fn pop_root(&mut self) -> Option<ObjRef> {
        self.roots.stack.pop()
    }

    /// Drop roots above `depth`
    pub fn truncate_roots(&mut self, depth: usize) {
        self.roots.stack.truncate(depth);
    }

    /// Replace the root at `index`
    pub fn set_root(&mut self, index: usize, obj: ObjRef) {
        self.roots.stack[index] = obj;
    }

    pub fn root(&self, index: usize) -> ObjRef {
        self.roots.stack[index]
    }

    pub fn collect(&mut self, level: Generation) -> CollectionReport {
        self.heap.collect(level, &mut self.roots)
    }

    /// Allocate with `pinned` rooted across any collection
    fn alloc(&mut self, tag: TypeTag, length: usize, pinned: &[ObjRef]) -> Result<ObjRef, HeapError> {
        let depth = self.roots.len();
        self.roots.stack.extend_from_slice(pinned);
        if self.auto_collect {
            if let Some(level) = self.heap.policy_requires_collection() {
                debug!("policy collection at level {}", level);
                self.heap.collect(level, &mut self.roots);
            }
        }
        let result = self.heap.alloc_with_retry(tag, length, &mut self.roots);
        self.roots.stack.truncate(depth);
        result
    }

    pub fn nil(&self) -> ObjRef {
        self.nil
    }

    /// The symbol with `id`, allocated on first use
    pub fn symbol(&mut self, id: u64) -> Result<ObjRef, HeapError> {
        if let Some(sym) = self.symbols.get(&id) {
            return Ok(*sym);
        }
        let sym = self.alloc(SYMBOL, 1, &[])?;
        self.heap.write_ref(sym, 0, self.nil)?;
        self.heap.bytes_mut(sym)[SYMBOL_ID_OFFSET..SYMBOL_ID_OFFSET + 8]
            .copy_from_slice(&id.to_le_bytes());
        self.symbols.insert(id, sym);
        self.roots.symbols.push(sym);
        Ok(sym)
    }

    pub fn symbol_id(&self, sym: ObjRef) -> u64 {
        read_u64(self.heap.bytes(sym), SYMBOL_ID_OFFSET)
    }

    /// Value bound to a symbol, nil until set
    pub fn symbol_value(&self, sym: ObjRef) -> Result<ObjRef, HeapError> {
        self.heap.read_ref(sym, 0)
    }

    pub fn set_symbol_value(&mut self, sym: ObjRef, value: ObjRef) -> Result<(), HeapError> {
        self.heap.write_ref(sym, 0, value)
    }

    pub fn int_vec(&mut self, values: &[i64]) -> Result<ObjRef, HeapError> {
        let obj = self.alloc(INT_VEC, values.len(), &[])?;
        let bytes = self.heap.bytes_mut(obj);
        for (i, v) in values.iter().enumerate() {
            bytes[i * 8..i * 8 + 8].copy_from_slice(&v.to_le_bytes());
        }
        Ok(obj)
    }

    pub fn int_vec_values(&self, obj: ObjRef) -> Vec<i64> {
        let bytes = self.heap.bytes(obj);
        (0..self.heap.length_of(obj).unwrap_or(0))
            .map(|i| read_u64(bytes, i * 8) as i64)
            .collect()
    }

    pub fn pair(&mut self, car: ObjRef, cdr: ObjRef) -> Result<ObjRef, HeapError> {
        let obj = self.alloc(PAIR, 0, &[car, cdr])?;
        self.heap.write_ref(obj, 0, car)?;
        self.heap.write_ref(obj, 1, cdr)?;
        Ok(obj)
    }

    pub fn car(&self, pair: ObjRef) -> Result<ObjRef, HeapError> {
        self.heap.read_ref(pair, 0)
    }

    pub fn cdr(&self, pair: ObjRef) -> Result<ObjRef, HeapError> {
        self.heap.read_ref(pair, 1)
    }

    pub fn set_car(&mut self, pair: ObjRef, value: ObjRef) -> Result<(), HeapError> {
        self.heap.write_ref(pair, 0, value)
    }

    pub fn set_cdr(&mut self, pair: ObjRef, value: ObjRef) -> Result<(), HeapError> {
        self.heap.write_ref(pair, 1, value)
    }

    pub fn cell(&mut self, value: ObjRef, n: i64) -> Result<ObjRef, HeapError> {
        let obj = self.alloc(CELL, 0, &[value])?;
        self.heap.write_ref(obj, 0, value)?;
        self.heap.bytes_mut(obj)[CELL_INT_OFFSET..CELL_INT_OFFSET + 8].copy_from_slice(&n.to_le_bytes());
        Ok(obj)
    }

    pub fn cell_value(&self, cell: ObjRef) -> Result<ObjRef, HeapError> {
        self.heap.read_ref(cell, 0)
    }

    pub fn cell_int(&self, cell: ObjRef) -> i64 {
        read_u64(self.heap.bytes(cell), CELL_INT_OFFSET) as i64
    }

    pub fn set_cell_value(&mut self, cell: ObjRef, value: ObjRef) -> Result<(), HeapError> {
        self.heap.write_ref(cell, 0, value)
    }

    /// A vector of `length` elements, all nil
    pub fn vector(&mut self, length: usize) -> Result<ObjRef, HeapError> {
        let obj = self.alloc(VECTOR, length, &[])?;
        for i in 0..length {
            self.heap.write_ref(obj, i, self.nil)?;
        }
        Ok(obj)
    }

    pub fn vector_len(&self, vector: ObjRef) -> usize {
        self.heap.length_of(vector).unwrap_or(0)
    }

    pub fn vector_get(&self, vector: ObjRef, index: usize) -> Result<ObjRef, HeapError> {
        self.check_index(vector, index)?;
        self.heap.read_ref(vector, index)
    }

    pub fn vector_set(&mut self, vector: ObjRef, index: usize, value: ObjRef) -> Result<(), HeapError> {
        self.check_index(vector, index)?;
        self.heap.write_ref(vector, index, value)
    }

    fn check_index(&self, vector: ObjRef, index: usize) -> Result<(), HeapError> {
        if index < self.vector_len(vector) {
            Ok(())
        } else {
            Err(HeapError::FieldOutOfRange {
                obj: vector,
                slot: index,
                capacity: self.vector_len(vector) * REF_BYTES,
            })
        }
    }

    /// Build a list of the given elements
    pub fn list(&mut self, items: &[ObjRef]) -> Result<ObjRef, HeapError> {
        let depth = self.roots.len();
        self.roots.stack.extend_from_slice(items);
        let mut list = self.nil;
        let mut result = Ok(list);
        for item in items.iter().rev() {
            match self.pair(*item, list) {
                Ok(pair) => {
                    list = pair;
                    result = Ok(pair);
                    // keep the partial list alive
                    self.roots.stack.push(pair);
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.roots.stack.truncate(depth);
        result
    }

    /// Elements of a list
    pub fn list_items(&self, list: ObjRef) -> Result<Vec<ObjRef>, HeapError> {
        let mut items = vec![];
        let mut cursor = list;
        while cursor != self.nil {
            items.push(self.car(cursor)?);
            cursor = self.cdr(cursor)?;
        }
        Ok(items)
    }
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn runtime() -> Runtime {
        Runtime::new(
            HeapConfig::default()
                .with_chunk_bytes(16)
                .with_data_alignment(16),
        )
        .unwrap()
        .with_auto_collect(false)
    }

    #[test]
    pub fn test_pairs_and_lists() {
        let mut rt = runtime();
        let a = rt.symbol(1).unwrap();
        let b = rt.symbol(2).unwrap();
        assert_eq!(rt.symbol(1).unwrap(), a);
        assert_eq!(rt.symbol_id(b), 2);

        let list = rt.list(&[a, b, a]).unwrap();
        assert_eq!(rt.list_items(list).unwrap(), vec![a, b, a]);
        assert_eq!(rt.roots().len(), 0);
    }

    #[test]
    pub fn test_cells_and_vectors() {
        let mut rt = runtime();
        let ints = rt.int_vec(&[1, -2, 3]).unwrap();
        assert_eq!(rt.int_vec_values(ints), vec![1, -2, 3]);

        let cell = rt.cell(ints, -42).unwrap();
        assert_eq!(rt.cell_value(cell), Ok(ints));
        assert_eq!(rt.cell_int(cell), -42);

        let vector = rt.vector(5).unwrap();
        assert_eq!(rt.vector_len(vector), 5);
        assert_eq!(rt.vector_get(vector, 4), Ok(rt.nil()));
        rt.vector_set(vector, 2, cell).unwrap();
        assert_eq!(rt.vector_get(vector, 2), Ok(cell));
        assert!(rt.vector_get(vector, 5).is_err());
    }

    #[test]
    pub fn test_rooted_structure_survives_full_collection() {
        let mut rt = runtime();
        let ints = rt.int_vec(&[7; 40]).unwrap();
        let cell = rt.cell(ints, 1).unwrap();
        let vector = rt.vector(3).unwrap();
        rt.vector_set(vector, 0, cell).unwrap();
        rt.push_root(vector);
        rt.int_vec(&[0; 3]).unwrap();

        let report = rt.collect(Generation::Two);
        assert_eq!(report.freed, 1);
        assert_eq!(rt.int_vec_values(ints), vec![7; 40]);
        assert_eq!(rt.vector_get(vector, 0), Ok(cell));
        assert_eq!(rt.heap().generation_of(ints), Generation::Two);
    }

    #[test]
    pub fn test_nil_and_symbols_are_never_swept() {
        let mut rt = runtime();
        let sym = rt.symbol(99).unwrap();
        rt.collect(Generation::Two);
        assert!(rt.heap().is_allocated(rt.nil()));
        assert!(rt.heap().is_allocated(sym));
        assert_eq!(rt.heap().stats().uncollected, 2);
    }

    #[test]
    pub fn test_symbol_values_survive_collections() {
        let mut rt = runtime();
        let sym = rt.symbol(5).unwrap();
        assert_eq!(rt.symbol_value(sym), Ok(rt.nil()));

        let young = rt.int_vec(&[1, 2]).unwrap();
        rt.set_symbol_value(sym, young).unwrap();
        assert!(rt.heap().in_old_to_new(sym));
        rt.collect(Generation::Zero);
        assert_eq!(rt.int_vec_values(young), vec![1, 2]);
        assert_eq!(rt.heap().generation_of(young), Generation::One);

        let cell = rt.cell(young, 3).unwrap();
        rt.set_symbol_value(sym, cell).unwrap();
        let report = rt.collect(Generation::Two);
        assert_eq!(report.freed, 0);
        assert_eq!(rt.symbol_value(sym), Ok(cell));
        assert_eq!(rt.cell_value(cell), Ok(young));
        assert_eq!(rt.symbol_id(sym), 5);
        assert!(!rt.heap().in_old_to_new(sym));
        assert_eq!(rt.roots().symbols(), &[sym]);
    }
}
