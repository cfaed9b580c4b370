//! Generational mark and sweep
//!
//! The collector knows nothing of object shapes. It learns roots and
//! the references held by each object from a [`Tracer`] supplied by
//! the runtime, and tracks everything else (marks, generations,
//! old-to-new membership) in per-segment chunk sets.
//!
//! A collection at level `g` considers objects of generation `g` or
//! younger. Older objects are neither traced nor swept, except that
//! members of the old-to-new set are scanned for references into the
//! collected generations. Objects of uncollected kinds are never swept
//! but are scanned whenever they are reached.

use std::collections::VecDeque;
use std::time::Instant;

use log::debug;

use super::cptr::ObjRef;
use super::heap::{Heap, HeapView};
use super::metrics::CollectionReport;
use super::segment::Generation;

/// Object graph knowledge supplied by the runtime
pub trait Tracer {
    /// Visit every root reference
    fn roots(&self, visit: &mut dyn FnMut(ObjRef));

    /// Visit every reference held by `obj`. `ObjRef::NONE` may be
    /// visited and is ignored.
    fn object_refs(&self, view: &HeapView<'_>, obj: ObjRef, visit: &mut dyn FnMut(ObjRef));

    /// Called for each unreachable object of a kind flagged
    /// `finalize`, before it is swept
    fn freed(&mut self, _view: &HeapView<'_>, _obj: ObjRef) {}
}

impl Heap {
    /// Collect generation `level` and younger
    pub fn collect<T: Tracer + ?Sized>(&mut self, level: Generation, tracer: &mut T) -> CollectionReport {
        let start = Instant::now();
        debug!("level {} collection starting", level);

        for index in self.store.indices() {
            self.store.segment_mut(index).clear_marks();
        }

        let marked = self.mark_from_roots(level, &*tracer);
        let (freed, freed_chunks, promoted, candidates) = self.sweep(level, tracer);
        let old_to_new = self.rebuild_old_to_new(level, &*tracer, candidates);
        let segments_released = self.rebuild_free_lists();

        let report = CollectionReport {
            level,
            marked,
            freed,
            freed_chunks,
            promoted,
            segments_released,
            old_to_new,
            duration: start.elapsed(),
        };
        self.metrics.collection_stats.record(&report);
        self.note_collection(level);
        debug!("{}", report);
        report
    }

    /// Mark everything in scope reachable from the roots and, below
    /// level two, from old objects in the old-to-new set. Returns the
    /// number of objects marked.
    fn mark_from_roots<T: Tracer + ?Sized>(&mut self, level: Generation, tracer: &T) -> usize {
        let mut queue = VecDeque::default();
        let mut marked = 0;

        let mut grey = vec![];
        tracer.roots(&mut |r| grey.push(r));
        for r in grey.drain(..) {
            marked += self.mark(level, r, &mut queue);
        }

        if level < Generation::Two {
            let remembered: Vec<ObjRef> = self
                .store
                .iter()
                .flat_map(|(index, segment)| {
                    segment
                        .old_to_new()
                        .without(segment.in_scope(level))
                        .iter()
                        .map(move |offset| ObjRef::new(index, offset))
                        .collect::<Vec<_>>()
                })
                .collect();
            for obj in remembered {
                tracer.object_refs(&HeapView::new(self), obj, &mut |r| grey.push(r));
                for r in grey.drain(..) {
                    marked += self.mark(level, r, &mut queue);
                }
            }
        }

        while let Some(obj) = queue.pop_front() {
            tracer.object_refs(&HeapView::new(self), obj, &mut |r| grey.push(r));
            for r in grey.drain(..) {
                marked += self.mark(level, r, &mut queue);
            }
        }

        marked
    }

    /// Mark `obj` if it is in scope and unmarked, queueing it for
    /// scanning. Returns 1 if newly marked.
    ///
    /// Uncollected objects are queued the first time they are reached
    /// at any level, so their references keep objects alive, but they
    /// are not counted and never swept.
    fn mark(&mut self, level: Generation, obj: ObjRef, queue: &mut VecDeque<ObjRef>) -> usize {
        if obj.is_none() {
            return 0;
        }
        if self.config().check_refs && !self.store.is_valid(obj) {
            panic!("tracer yielded invalid reference {:?}", obj);
        }
        let uncollected = match self.store.get(obj.segment()) {
            Some(segment) => self.kinds().spec(segment.kind()).uncollected,
            None => return 0,
        };
        let offset = obj.offset();
        match self.store.get_mut(obj.segment()) {
            Some(segment)
                if segment.is_allocated(offset)
                    && (uncollected || segment.generation(offset) <= level)
                    && !segment.is_marked(offset) =>
            {
                segment.mark(offset);
                queue.push_back(obj);
                usize::from(!uncollected)
            }
            _ => 0,
        }
    }

    /// Free unmarked objects in scope and promote marked ones.
    ///
    /// Returns freed objects, freed chunks, promotions, and the
    /// objects that moved from generation one to two, which may now
    /// hold references to younger objects.
    fn sweep<T: Tracer + ?Sized>(
        &mut self,
        level: Generation,
        tracer: &mut T,
    ) -> (usize, usize, usize, Vec<ObjRef>) {
        let mut freed = 0;
        let mut freed_chunks = 0;
        let mut promoted = 0;
        let mut aged = vec![];

        for index in self.store.indices() {
            let segment = self.store.segment(index);
            let spec = *self.kinds().spec(segment.kind());
            if spec.uncollected {
                continue;
            }
            let scope = segment.in_scope(level);
            let dead = scope.without(segment.marked());
            let live = scope & segment.marked();

            if spec.finalize {
                for offset in dead.iter() {
                    tracer.freed(&HeapView::new(self), ObjRef::new(index, offset));
                }
            }
            for offset in dead.iter() {
                freed_chunks += self.release_object(ObjRef::new(index, offset));
                freed += 1;
            }

            if let Some(segment) = self.store.get_mut(index) {
                for offset in live.iter() {
                    let from = segment.generation(offset);
                    let to = from.promoted(level);
                    if to != from {
                        segment.set_generation(offset, to);
                        promoted += 1;
                        if from == Generation::One {
                            aged.push(ObjRef::new(index, offset));
                        }
                    }
                }
            }
        }

        (freed, freed_chunks, promoted, aged)
    }

    /// Recompute old-to-new membership after promotion: a candidate is
    /// kept iff it holds a reference to a strictly younger object.
    /// Returns the size of the set.
    fn rebuild_old_to_new<T: Tracer + ?Sized>(
        &mut self,
        level: Generation,
        tracer: &T,
        aged: Vec<ObjRef>,
    ) -> usize {
        if level == Generation::Two {
            for index in self.store.indices() {
                self.store.segment_mut(index).clear_old_to_new();
            }
            return 0;
        }

        let mut candidates: Vec<ObjRef> = self
            .store
            .iter()
            .flat_map(|(index, segment)| {
                segment
                    .old_to_new()
                    .iter()
                    .map(move |offset| ObjRef::new(index, offset))
                    .collect::<Vec<_>>()
            })
            .collect();
        candidates.extend(aged);

        let mut refs = vec![];
        for obj in candidates {
            if !self.store.is_valid(obj) {
                continue;
            }
            let generation = self.generation_of(obj);
            tracer.object_refs(&HeapView::new(self), obj, &mut |r| refs.push(r));
            let younger = refs
                .drain(..)
                .any(|r| self.store.is_valid(r) && self.generation_of(r) < generation);

            let segment = self.store.segment_mut(obj.segment());
            if younger {
                segment.add_old_to_new(obj.offset());
            } else {
                segment.remove_old_to_new(obj.offset());
            }
        }

        self.store
            .iter()
            .map(|(_, segment)| segment.old_to_new().len())
            .sum()
    }

    /// Requeue segments with free slots and release empty small
    /// segments. Returns the number released.
    fn rebuild_free_lists(&mut self) -> usize {
        for list in self.free_lists.iter_mut() {
            list.clear();
        }
        let mut released = 0;
        for index in self.store.indices() {
            let segment = self.store.segment_mut(index);
            if segment.is_big() {
                segment.on_free_list = false;
            } else if segment.is_empty() {
                self.store.release(index);
                released += 1;
            } else if segment.has_free() {
                segment.on_free_list = true;
                self.free_lists[segment.kind().as_usize()].push_back(index);
            } else {
                segment.on_free_list = false;
            }
        }
        released
    }
}
