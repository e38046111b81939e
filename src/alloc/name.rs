//! Interned names, kept as a chain threaded through the name objects with
//! its head in a root slot. Interners grow one node per distinct identifier,
//! so the descriptor walks the chain iteratively instead of recursing.

use crate::api::{ObjectType, Ref};
use crate::heap::{Heap, OutOfMemory, RootId};

const NEXT: u32 = 0;
const ID: u32 = 4;
const LEN: u32 = 6;
const BYTES: u32 = 8;

pub struct NameType;
pub static NAME_TYPE: NameType = NameType;

impl ObjectType for NameType {
    fn name(&self) -> &'static str {
        "name"
    }

    fn size(&self, heap: &Heap, addr: u32) -> u32 {
        BYTES + heap.read_u16(addr + LEN) as u32
    }

    fn trace(&self, heap: &mut Heap, addr: u32) {
        let mut next = heap.read_ref(addr + NEXT);
        while let Some(node) = next.get() {
            if heap.mark_blob(node, self.size(heap, node)) {
                break;
            }
            next = heap.read_ref(node + NEXT);
        }
    }

    fn relocate(&self, heap: &mut Heap, addr: u32) {
        let mut at = addr;
        loop {
            let mut next = heap.read_ref(at + NEXT);
            if next.is_null() {
                break;
            }
            let already = heap.move_blob_ref(&mut next);
            heap.write_ref(at + NEXT, next);
            if already {
                break;
            }
            at = next.offset();
        }
    }
}

/// Find or create the interned name for `s`. The chain head lives in the
/// given root slot and is re-read after the allocation.
pub fn intern(heap: &mut Heap, root: RootId, s: &str) -> Result<Ref, OutOfMemory> {
    let mut cursor = heap.root(root);
    while let Some(addr) = cursor.get() {
        if as_str(heap, addr) == s {
            return Ok(Ref::new(addr));
        }
        cursor = heap.read_ref(addr + NEXT);
    }

    assert!(s.len() <= u16::MAX as usize, "name too long");
    let addr = heap.alloc(BYTES + s.len() as u32)?;
    let head = heap.root(root);
    let id = match head.get() {
        Some(prev) => heap.read_u16(prev + ID) + 1,
        None => 1,
    };
    heap.write_ref(addr + NEXT, head);
    heap.write_u16(addr + ID, id);
    heap.write_u16(addr + LEN, s.len() as u16);
    heap.write_slice(addr + BYTES, s.as_bytes());
    heap.set_root(root, Ref::new(addr));
    Ok(Ref::new(addr))
}

pub fn id(heap: &Heap, addr: u32) -> u16 {
    heap.read_u16(addr + ID)
}

pub fn as_str(heap: &Heap, addr: u32) -> &str {
    let len = heap.read_u16(addr + LEN) as u32;
    // contents always originate from a &str
    unsafe { std::str::from_utf8_unchecked(heap.slice(addr + BYTES, len)) }
}
