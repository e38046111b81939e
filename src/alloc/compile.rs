//! Compiler state: the code block under construction. Registered by the
//! compiler as a nullable typed root so a collection in mid-compile keeps
//! the block alive and current.

use crate::alloc::code::CODE_TYPE;
use crate::api::{ObjectType, Ref};
use crate::heap::{Heap, OutOfMemory};

const CODE: u32 = 0;
const SIZE: u32 = 4;

pub struct CompileType;
pub static COMPILE_TYPE: CompileType = CompileType;

impl ObjectType for CompileType {
    fn name(&self) -> &'static str {
        "compile"
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

pub fn new(heap: &mut Heap) -> Result<Ref, OutOfMemory> {
    Ok(Ref::new(heap.alloc(SIZE)?))
}

pub fn code(heap: &Heap, addr: u32) -> Ref {
    heap.read_ref(addr + CODE)
}

pub fn set_code(heap: &mut Heap, addr: u32, code: Ref) {
    heap.write_ref(addr + CODE, code);
}
