//! Variable frames: a count, a reference to the enclosing frame and the
//! variable values inline. The current frame and the globals frame live in
//! root slots; tracing follows the `prev` chain, so recursion depth here is
//! call depth.

use crate::api::{ObjectType, Ref, Value};
use crate::heap::{Heap, OutOfMemory, RootId};

const NVAR: u32 = 0;
const PREV: u32 = 4;
const VARS: u32 = 8;
const VALUE_SIZE: u32 = 4;

pub struct FrameType;
pub static FRAME_TYPE: FrameType = FrameType;

impl ObjectType for FrameType {
    fn name(&self) -> &'static str {
        "frame"
    }

    fn size(&self, heap: &Heap, addr: u32) -> u32 {
        VARS + heap.read_u16(addr + NVAR) as u32 * VALUE_SIZE
    }

    fn trace(&self, heap: &mut Heap, addr: u32) {
        let prev = heap.read_ref(addr + PREV);
        if !prev.is_null() {
            heap.mark_ref(&FRAME_TYPE, prev);
        }
        let nvar = heap.read_u16(addr + NVAR) as u32;
        for at in 0..nvar {
            heap.mark_value(heap.read_value(addr + VARS + at * VALUE_SIZE));
        }
    }

    fn relocate(&self, heap: &mut Heap, addr: u32) {
        let mut prev = heap.read_ref(addr + PREV);
        if !prev.is_null() {
            heap.move_ref(&FRAME_TYPE, &mut prev);
            heap.write_ref(addr + PREV, prev);
        }
        let nvar = heap.read_u16(addr + NVAR) as u32;
        for at in 0..nvar {
            let mut value = heap.read_value(addr + VARS + at * VALUE_SIZE);
            heap.move_value(&mut value);
            heap.write_value(addr + VARS + at * VALUE_SIZE, value);
        }
    }
}

/// Push a frame with `nvar` null variables onto the chain rooted at `root`.
/// The previous frame is re-read from the root slot after the allocation, so
/// a collection here cannot unlink the chain.
pub fn push(heap: &mut Heap, root: RootId, nvar: u16) -> Result<Ref, OutOfMemory> {
    let addr = heap.alloc(VARS + nvar as u32 * VALUE_SIZE)?;
    let prev = heap.root(root);
    heap.write_u16(addr + NVAR, nvar);
    heap.write_ref(addr + PREV, prev);
    let frame = Ref::new(addr);
    heap.set_root(root, frame);
    Ok(frame)
}

pub fn pop(heap: &mut Heap, root: RootId) {
    let frame = heap.root(root);
    let prev = heap.read_ref(frame.offset() + PREV);
    heap.set_root(root, prev);
}

pub fn nvar(heap: &Heap, addr: u32) -> u16 {
    heap.read_u16(addr + NVAR)
}

pub fn prev(heap: &Heap, addr: u32) -> Ref {
    heap.read_ref(addr + PREV)
}

pub fn get_var(heap: &Heap, addr: u32, index: u16) -> Value {
    assert!(index < nvar(heap, addr), "frame variable out of range");
    heap.read_value(addr + VARS + index as u32 * VALUE_SIZE)
}

pub fn set_var(heap: &mut Heap, addr: u32, index: u16, value: Value) {
    assert!(index < nvar(heap, addr), "frame variable out of range");
    heap.write_value(addr + VARS + index as u32 * VALUE_SIZE, value);
}
