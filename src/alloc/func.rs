//! Function objects: formal count plus a reference to the compiled code.

use crate::alloc::code::CODE_TYPE;
use crate::api::{ObjectType, Ref};
use crate::heap::{Heap, OutOfMemory};

const NFORMAL: u32 = 0;
const CODE: u32 = 4;
const SIZE: u32 = 8;

pub struct FuncType;
pub static FUNC_TYPE: FuncType = FuncType;

impl ObjectType for FuncType {
    fn name(&self) -> &'static str {
        "func"
    }

    fn size(&self, _heap: &Heap, _addr: u32) -> u32 {
        SIZE
    }

    fn trace(&self, heap: &mut Heap, addr: u32) {
        let code = heap.read_ref(addr + CODE);
        if !code.is_null() {
            heap.mark_ref(&CODE_TYPE, code);
        }
    }

    fn relocate(&self, heap: &mut Heap, addr: u32) {
        let mut code = heap.read_ref(addr + CODE);
        if !code.is_null() {
            heap.move_ref(&CODE_TYPE, &mut code);
            heap.write_ref(addr + CODE, code);
        }
    }
}

/// The code block rides in the code register while the function object is
/// allocated, in case the allocation collects.
pub fn new(heap: &mut Heap, code: Ref, nformal: u16) -> Result<Ref, OutOfMemory> {
    heap.stash_code(code);
    let addr = match heap.alloc(SIZE) {
        Ok(addr) => addr,
        Err(e) => {
            heap.fetch_code();
            return Err(e);
        }
    };
    let code = heap.fetch_code();
    heap.write_u16(addr + NFORMAL, nformal);
    heap.write_ref(addr + CODE, code);
    Ok(Ref::new(addr))
}

pub fn nformal(heap: &Heap, addr: u32) -> u16 {
    heap.read_u16(addr + NFORMAL)
}

pub fn code(heap: &Heap, addr: u32) -> Ref {
    heap.read_ref(addr + CODE)
}
