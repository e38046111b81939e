//! The compactor. Each collection repeats mark → slide → rewrite over a
//! bounded chunk window until the whole pool has been swept: the mark walk
//! records live objects in the window, the slide packs them toward the output
//! cursor, and the move walk rewrites every reference whose target moved.
//! When there are more live objects than window entries the window clips
//! itself and the loop simply takes another pass.

use std::time::Instant;

use crate::alloc::list;
use crate::api::{kind_type, Kind, ObjectType, Ref, Value};
use crate::heap::{Heap, RootVisitor};
use crate::pool::{round_size, ALLOC_ROUND};
use crate::utils::ByteSize;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CollectKind {
    /// Sweep only the heap above the last full collection's high-water mark.
    /// Skips the long-lived objects that settle at the bottom of the pool.
    Incremental,
    /// Sweep from offset zero.
    Full,
}

/// Every 128th incremental collection is upgraded to a full one to reclaim
/// fragmentation among the settled objects.
const FULL_COLLECT_INTERVAL: u8 = 128;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Mark,
    Move,
}

/// One relocation record. `size` holds the object size while the mark walk
/// fills the window; the slide reuses the slot for the record's new offset.
#[derive(Clone, Copy, Default)]
pub(crate) struct Chunk {
    pub(crate) old_offset: u32,
    pub(crate) size: u32,
}

/// Sorted, bounded array of relocation records plus the pool range the
/// current pass covers. The fixed capacity is what bounds the collector's
/// side state on small targets.
pub(crate) struct ChunkWindow {
    chunks: Box<[Chunk]>,
    pub(crate) low: u32,
    pub(crate) high: u32,
    pub(crate) first: usize,
    pub(crate) last: usize,
}

impl ChunkWindow {
    pub(crate) fn new(entries: usize) -> ChunkWindow {
        ChunkWindow {
            chunks: vec![Chunk::default(); entries].into_boxed_slice(),
            low: 0,
            high: 0,
            first: 0,
            last: 0,
        }
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.chunks.len()
    }

    #[inline(always)]
    pub(crate) fn entry(&self, at: usize) -> Chunk {
        self.chunks[at]
    }

    #[inline(always)]
    pub(crate) fn set_new_offset(&mut self, at: usize, new_offset: u32) {
        self.chunks[at].size = new_offset;
    }

    /// Start a fresh pass covering `[low, top)`.
    pub(crate) fn reset(&mut self, top: u32) {
        self.high = top;
        self.first = 0;
        self.last = 0;
    }

    /// Binary search the active entries for the position of `offset`.
    pub(crate) fn find(&self, offset: u32) -> usize {
        let mut l = self.first;
        let mut r = self.last;
        while l < r {
            let m = (l + r) / 2;
            if self.chunks[m].old_offset < offset {
                l = m + 1;
            } else {
                r = m;
            }
        }
        l
    }

    /// Record a live object found by the mark walk. Offsets outside the
    /// current range belong to some other pass and are ignored. When the
    /// array fills, `high` is clipped to the end of the last captured object
    /// so that later finds above it fall out of range too.
    pub(crate) fn note(&mut self, offset: u32, size: u32) {
        if offset < self.low || self.high <= offset {
            return;
        }

        let at = self.find(offset);
        debug_assert!(at < self.capacity(), "chunk window insert out of range");

        let end = (self.last + 1).min(self.capacity());
        self.chunks.copy_within(at..end - 1, at + 1);
        self.chunks[at] = Chunk {
            old_offset: offset,
            size,
        };

        if self.last < self.capacity() {
            self.last += 1;
        }
        if self.last == self.capacity() {
            let last = self.chunks[self.capacity() - 1];
            self.high = last.old_offset + last.size;
        }
    }
}

impl Heap {
    /// Collect garbage and return the number of free bytes afterwards.
    pub fn collect(&mut self, kind: CollectKind) -> u32 {
        let timer = self.verbose.then(Instant::now);
        let before = self.top;

        let mut kind = kind;
        if kind == CollectKind::Incremental {
            self.collect_counts += 1;
            if self.collect_counts >= FULL_COLLECT_INTERVAL {
                kind = CollectKind::Full;
            }
        }
        // until the first full collection there is no high-water mark to
        // start an incremental sweep from
        if self.last_top == 0 {
            kind = CollectKind::Full;
        }
        if kind == CollectKind::Full {
            self.collect_counts = 0;
        }

        let start = match kind {
            CollectKind::Full => 0,
            CollectKind::Incremental => self.last_top,
        };
        let mut top_out = start;
        self.chunks.low = start;

        loop {
            self.chunks.reset(self.top);
            self.walk(Phase::Mark);

            // objects at or below the output cursor stay put
            let mut at = 0;
            while at < self.chunks.last {
                let chunk = self.chunks.entry(at);
                if chunk.old_offset > top_out {
                    break;
                }
                top_out += chunk.size;
                at += 1;
            }

            // A full window with nothing moving: restart above it. The
            // general path below handles this case as well; the explicit
            // restart keeps the window state out of the move walk entirely.
            if at == self.chunks.capacity() {
                self.chunks.low = self.chunks.high;
                continue;
            }

            // clip the mapping range to the entries that actually move
            self.chunks.first = at;
            if at < self.chunks.last {
                self.chunks.low = self.chunks.entry(at).old_offset;
            }

            while at < self.chunks.last {
                let chunk = self.chunks.entry(at);
                self.chunks.set_new_offset(at, top_out);
                self.pool.copy_within(chunk.old_offset, top_out, chunk.size);
                top_out += chunk.size;
                at += 1;
            }

            if self.chunks.first < self.chunks.last {
                self.walk(Phase::Move);
            }

            // a window that did not fill saw everything up to the old top
            if self.chunks.last != self.chunks.capacity() {
                break;
            }
            self.chunks.low = self.chunks.high;
        }

        self.top = top_out;
        if kind == CollectKind::Full {
            self.last_top = top_out;
            self.full_collections += 1;
        }

        if let Some(timer) = timer {
            eprintln!(
                "[gc] GC({}) Pause {:?} {}->{} {:.4}ms",
                self.total_collections,
                kind,
                ByteSize(before as usize),
                ByteSize(self.top as usize),
                timer.elapsed().as_micros() as f64 / 1000.0
            );
        }
        self.total_collections += 1;

        self.free()
    }

    /// Visit every root once: hooks first, then the typed root slots in
    /// registration order, the code register, the stash registers, and
    /// finally drain the list note-list.
    pub(crate) fn walk(&mut self, phase: Phase) {
        self.busy.clear_all();
        self.note_list = Ref::NULL;

        let mut hooks = std::mem::take(&mut self.hooks);
        for hook in hooks.iter_mut() {
            hook.run(&mut RootVisitor {
                heap: &mut *self,
                phase,
            });
        }
        self.hooks = hooks;

        for at in 0..self.roots.len() {
            let ty = self.roots[at].ty;
            let mut cell = self.roots[at].cell;
            if cell.is_null() {
                continue;
            }
            match phase {
                Phase::Mark => {
                    self.mark_ref(ty, cell);
                }
                Phase::Move => {
                    self.move_ref(ty, &mut cell);
                    self.roots[at].cell = cell;
                }
            }
        }

        let mut code = self.code_reg;
        if !code.is_null() {
            let ty: &'static dyn ObjectType = &crate::alloc::code::CODE_TYPE;
            match phase {
                Phase::Mark => {
                    self.mark_ref(ty, code);
                }
                Phase::Move => {
                    self.move_ref(ty, &mut code);
                    self.code_reg = code;
                }
            }
        }

        for at in 0..self.stash_regs.len() {
            let mut value = self.stash_regs[at];
            if value.is_null() {
                continue;
            }
            match phase {
                Phase::Mark => {
                    self.mark_value(value);
                }
                Phase::Move => {
                    self.move_value(&mut value);
                    self.stash_regs[at] = value;
                }
            }
        }

        self.drain_notes(phase);
    }

    /// Process lists whose interior traversal was deferred. Lists noted while
    /// the chain drains land on a fresh chain picked up by the outer loop, so
    /// nesting depth never grows the call stack. The descriptor is entered
    /// directly: the list's own storage was already marked (or moved) when it
    /// was noted.
    fn drain_notes(&mut self, phase: Phase) {
        while !self.note_list.is_null() {
            let mut note = self.note_list;
            self.note_list = Ref::NULL;
            while let Some(addr) = note.get() {
                let list_type: &'static dyn ObjectType = &list::LIST_TYPE;
                match phase {
                    Phase::Mark => list_type.trace(self, addr),
                    Phase::Move => list_type.relocate(self, addr),
                }
                note = list::note_next(self, addr);
                list::set_note_next(self, addr, Ref::NULL);
                list::set_noted(self, addr, false);
            }
        }
    }

    /// Defer interior traversal of the list at `addr` to the note-list. Each
    /// list is noted at most once per walk.
    pub(crate) fn note_list_entry(&mut self, addr: u32) {
        if !list::noted(self, addr) {
            list::set_note_next(self, addr, self.note_list);
            list::set_noted(self, addr, true);
            self.note_list = Ref::new(addr);
        }
    }

    // -- mark entry points, called from descriptor `trace` bodies --

    /// Record a reached blob of storage. Returns `true` when its granule was
    /// already marked this walk.
    pub fn mark_blob(&mut self, addr: u32, size: u32) -> bool {
        debug_assert!(addr % ALLOC_ROUND == 0 && addr < self.pool.size());
        if self.busy.test(addr) {
            return true;
        }
        self.busy.set(addr);
        self.chunks.note(addr, round_size(size));
        false
    }

    /// Mark an object's own storage without descending into it.
    pub fn mark_block_addr(&mut self, ty: &'static dyn ObjectType, addr: u32) -> bool {
        let size = ty.size(self, addr);
        self.mark_blob(addr, size)
    }

    /// Mark an object and everything it references.
    pub fn mark_addr(&mut self, ty: &'static dyn ObjectType, addr: u32) -> bool {
        let already = self.mark_block_addr(ty, addr);
        if !already {
            ty.trace(self, addr);
        }
        already
    }

    pub fn mark_ref(&mut self, ty: &'static dyn ObjectType, r: Ref) -> bool {
        self.mark_addr(ty, r.offset())
    }

    /// Mark the object behind a tagged value. Immediates are already done;
    /// lists are queued on the note-list instead of being descended into.
    pub fn mark_value(&mut self, value: Value) -> bool {
        let kind = value.kind();
        if kind.is_immediate() {
            return true;
        }
        let addr = value.offset();
        let ty = kind_type(kind);
        let already = self.mark_block_addr(ty, addr);
        if !already {
            if kind == Kind::List {
                self.note_list_entry(addr);
            } else {
                ty.trace(self, addr);
            }
        }
        already
    }

    // -- move entry points, called from descriptor `relocate` bodies --

    /// Map an old offset to its post-slide location. Offsets outside the
    /// window range belong to objects that did not move this pass.
    fn move_map(&self, offset: u32) -> u32 {
        if offset < self.chunks.low || self.chunks.high <= offset {
            return offset;
        }
        let at = self.chunks.find(offset);
        debug_assert_eq!(
            self.chunks.entry(at).old_offset,
            offset,
            "no relocation record for offset"
        );
        self.chunks.entry(at).size
    }

    /// Rewrite one reference cell without descending. Returns `true` when the
    /// target was already processed this walk; the busy bit doubles as the
    /// "already moved" flag here.
    pub fn move_blob_ref(&mut self, r: &mut Ref) -> bool {
        let orig = r.offset();
        let mapped = self.move_map(orig);
        if mapped != orig {
            *r = Ref::new(mapped);
        }
        if self.busy.test(mapped) {
            return true;
        }
        self.busy.set(mapped);
        false
    }

    pub fn move_blob_addr(&mut self, addr: &mut u32) -> bool {
        let mut r = Ref::new(*addr);
        let already = self.move_blob_ref(&mut r);
        *addr = r.offset();
        already
    }

    /// Rewrite a typed reference cell and descend into the object the first
    /// time it is seen this walk.
    pub fn move_ref(&mut self, ty: &'static dyn ObjectType, r: &mut Ref) -> bool {
        let already = self.move_blob_ref(r);
        if !already {
            ty.relocate(self, r.offset());
        }
        already
    }

    pub fn move_addr(&mut self, ty: &'static dyn ObjectType, addr: &mut u32) -> bool {
        let mut r = Ref::new(*addr);
        let already = self.move_ref(ty, &mut r);
        *addr = r.offset();
        already
    }

    /// Rewrite a tagged value in place, deferring list interiors to the
    /// note-list like the mark walk does. The descent happens on the
    /// post-slide address: the bytes were already copied, but the references
    /// inside them still hold pre-move offsets.
    pub fn move_value(&mut self, value: &mut Value) -> bool {
        let kind = value.kind();
        if kind.is_immediate() {
            return true;
        }
        let orig = value.offset();
        let mapped = self.move_map(orig);
        if mapped != orig {
            *value = Value::boxed(value.tag(), mapped);
        }
        if self.busy.test(mapped) {
            return true;
        }
        self.busy.set(mapped);
        if kind == Kind::List {
            self.note_list_entry(mapped);
        } else {
            kind_type(kind).relocate(self, mapped);
        }
        false
    }
}
