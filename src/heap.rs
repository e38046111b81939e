//! The heap: bump allocator, root registry and stash registers. The
//! collector itself lives in [`crate::compact`].

use std::fmt;

use crate::api::{ObjectType, Ref, Value};
use crate::bitmap::BusyBitmap;
use crate::compact::{ChunkWindow, CollectKind, Phase};
use crate::pool::{round_size, Pool, ALLOC_ROUND};
use crate::statistics::HeapStatistics;

pub const DEFAULT_NUM_STASH: usize = 5;

pub struct HeapOptions {
    /// Usable pool size in bytes, a multiple of the allocation granule.
    pub pool_size: u32,
    /// Reserved headroom past the pool that the allocator never hands out.
    pub pool_extra: u32,
    /// Relocation window entries per collector pass. `None` sizes the window
    /// at one entry per 64 pool bytes, the expected average object size.
    /// Explicit values are clamped to `1..=pool_size / ALLOC_ROUND`; a window
    /// with more entries than the pool has granules could never fill.
    pub chunk_window: Option<usize>,
    /// Depth of the value stash.
    pub num_stash: usize,
    /// Log a line per collection to stderr.
    pub verbose: bool,
}

impl Default for HeapOptions {
    fn default() -> Self {
        Self {
            pool_size: 16 * 1024,
            pool_extra: 0,
            chunk_window: None,
            num_stash: DEFAULT_NUM_STASH,
            verbose: false,
        }
    }
}

/// `alloc` could not satisfy the request even after a full collection.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct OutOfMemory {
    /// Rounded request size in bytes.
    pub requested: u32,
}

impl fmt::Display for OutOfMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "out of memory: {} bytes requested", self.requested)
    }
}

impl std::error::Error for OutOfMemory {}

/// Handle to a registered root slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RootId(usize);

pub(crate) struct RootSlot {
    pub(crate) ty: &'static dyn ObjectType,
    pub(crate) cell: Ref,
}

/// Extra roots reported by the interpreter, e.g. an operand stack. Each hook
/// runs once per mark walk and once per move walk; the visitor it receives
/// does the right thing for the current phase.
pub trait RootHook: Send {
    fn run(&mut self, roots: &mut RootVisitor<'_>);
}

/// Phase-aware visitor handed to [`RootHook`]s.
pub struct RootVisitor<'a> {
    pub(crate) heap: &'a mut Heap,
    pub(crate) phase: Phase,
}

impl RootVisitor<'_> {
    pub fn visit_ref(&mut self, ty: &'static dyn ObjectType, cell: &mut Ref) {
        if cell.is_null() {
            return;
        }
        match self.phase {
            Phase::Mark => {
                self.heap.mark_ref(ty, *cell);
            }
            Phase::Move => {
                self.heap.move_ref(ty, cell);
            }
        }
    }

    pub fn visit_value(&mut self, value: &mut Value) {
        if value.is_null() {
            return;
        }
        match self.phase {
            Phase::Mark => {
                self.heap.mark_value(*value);
            }
            Phase::Move => {
                self.heap.move_value(value);
            }
        }
    }
}

pub struct Heap {
    pub(crate) pool: Pool,
    pub(crate) top: u32,
    pub(crate) busy: BusyBitmap,
    pub(crate) chunks: ChunkWindow,
    pub(crate) note_list: Ref,
    pub(crate) roots: Vec<RootSlot>,
    pub(crate) hooks: Vec<Box<dyn RootHook>>,
    pub(crate) stash_regs: Box<[Value]>,
    pub(crate) stash_top: usize,
    pub(crate) code_reg: Ref,
    pub(crate) last_top: u32,
    pub(crate) collect_counts: u8,
    pub(crate) verbose: bool,
    pub(crate) total_collections: usize,
    pub(crate) full_collections: usize,
}

impl Heap {
    /// Heap over an anonymously mapped pool.
    pub fn new(options: HeapOptions) -> Heap {
        let pool = Pool::new(options.pool_size, options.pool_extra);
        Self::build(pool, options)
    }

    /// Heap over caller-reserved memory, for targets that cannot map pages.
    pub fn with_static(mem: &'static mut [u8], options: HeapOptions) -> Heap {
        let pool = Pool::with_static(mem, options.pool_size, options.pool_extra);
        Self::build(pool, options)
    }

    fn build(pool: Pool, options: HeapOptions) -> Heap {
        let max_entries = (pool.size() / ALLOC_ROUND) as usize;
        let entries = options
            .chunk_window
            .unwrap_or((pool.size() / 64) as usize)
            .clamp(1, max_entries);
        Heap {
            busy: BusyBitmap::new(pool.size()),
            chunks: ChunkWindow::new(entries),
            pool,
            top: 0,
            note_list: Ref::NULL,
            roots: Vec::new(),
            hooks: Vec::new(),
            stash_regs: vec![Value::NULL; options.num_stash].into_boxed_slice(),
            stash_top: 0,
            code_reg: Ref::NULL,
            last_top: 0,
            collect_counts: 0,
            verbose: options.verbose,
            total_collections: 0,
            full_collections: 0,
        }
    }

    #[inline(always)]
    pub fn pool_size(&self) -> u32 {
        self.pool.size()
    }

    #[inline(always)]
    pub fn top(&self) -> u32 {
        self.top
    }

    #[inline(always)]
    pub fn free(&self) -> u32 {
        self.pool.size() - self.top
    }

    /// Granule-aligned, zero-filled allocation. Runs an incremental and then
    /// a full collection before giving up. The returned offset (and every
    /// other offset the caller holds outside roots and stash) is only
    /// guaranteed until the next `alloc`.
    pub fn alloc(&mut self, size: u32) -> Result<u32, OutOfMemory> {
        debug_assert!(size > 0);
        let size = round_size(size);
        if self.free() < size
            && self.collect(CollectKind::Incremental) < size
            && self.collect(CollectKind::Full) < size
        {
            return Err(OutOfMemory { requested: size });
        }
        let addr = self.top;
        self.pool.zero(addr, size);
        self.top += size;
        Ok(addr)
    }

    /// Register a typed root slot. Slots are traced in registration order and
    /// rewritten in place when the referenced object moves.
    pub fn add_root(&mut self, ty: &'static dyn ObjectType) -> RootId {
        self.roots.push(RootSlot {
            ty,
            cell: Ref::NULL,
        });
        RootId(self.roots.len() - 1)
    }

    #[inline]
    pub fn root(&self, id: RootId) -> Ref {
        self.roots[id.0].cell
    }

    #[inline]
    pub fn set_root(&mut self, id: RootId, cell: Ref) {
        self.roots[id.0].cell = cell;
    }

    pub fn add_hook(&mut self, hook: Box<dyn RootHook>) {
        self.hooks.push(hook);
    }

    /// Park a value so it survives an allocation that may collect. Bounded
    /// LIFO; overflow and underflow are caller bugs.
    pub fn stash(&mut self, value: Value) {
        assert!(self.stash_top < self.stash_regs.len(), "stash overflow");
        self.stash_regs[self.stash_top] = value;
        self.stash_top += 1;
    }

    /// Pop the most recently stashed value. The slot is cleared so the value
    /// cannot outlive the fetch as a root.
    pub fn fetch(&mut self) -> Value {
        assert!(self.stash_top > 0, "stash underflow");
        self.stash_top -= 1;
        let value = self.stash_regs[self.stash_top];
        self.stash_regs[self.stash_top] = Value::NULL;
        value
    }

    /// Park a code block in the single code register. Overwrites.
    pub fn stash_code(&mut self, code: Ref) {
        self.code_reg = code;
    }

    pub fn fetch_code(&mut self) -> Ref {
        let code = self.code_reg;
        self.code_reg = Ref::NULL;
        code
    }

    pub fn statistics(&self) -> HeapStatistics {
        HeapStatistics {
            pool_size: self.pool.size(),
            top: self.top,
            last_top: self.last_top,
            free: self.free(),
            total_collections: self.total_collections,
            full_collections: self.full_collections,
        }
    }

    // Typed pool accessors for descriptor bodies and the object zoo.

    #[inline(always)]
    pub fn read_u8(&self, offset: u32) -> u8 {
        self.pool.read_u8(offset)
    }

    #[inline(always)]
    pub fn read_u16(&self, offset: u32) -> u16 {
        self.pool.read_u16(offset)
    }

    #[inline(always)]
    pub fn write_u16(&mut self, offset: u32, value: u16) {
        self.pool.write_u16(offset, value);
    }

    #[inline(always)]
    pub fn read_u32(&self, offset: u32) -> u32 {
        self.pool.read_u32(offset)
    }

    #[inline(always)]
    pub fn write_u32(&mut self, offset: u32, value: u32) {
        self.pool.write_u32(offset, value);
    }

    #[inline(always)]
    pub fn read_value(&self, offset: u32) -> Value {
        self.pool.read_value(offset)
    }

    #[inline(always)]
    pub fn write_value(&mut self, offset: u32, value: Value) {
        self.pool.write_value(offset, value);
    }

    #[inline(always)]
    pub fn read_ref(&self, offset: u32) -> Ref {
        self.pool.read_ref(offset)
    }

    #[inline(always)]
    pub fn write_ref(&mut self, offset: u32, r: Ref) {
        self.pool.write_ref(offset, r);
    }

    #[inline(always)]
    pub fn slice(&self, offset: u32, len: u32) -> &[u8] {
        self.pool.slice(offset, len)
    }

    #[inline(always)]
    pub fn write_slice(&mut self, offset: u32, src: &[u8]) {
        self.pool.write_slice(offset, src);
    }

    #[inline(always)]
    pub(crate) fn copy_within(&mut self, src: u32, dst: u32, len: u32) {
        self.pool.copy_within(src, dst, len);
    }
}
