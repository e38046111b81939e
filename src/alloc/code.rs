//! Compiled bytecode blocks. A block is an opaque run of bytes to the
//! collector; anything a program constant references is held by the
//! enclosing function object instead.

use crate::api::{ObjectType, Ref};
use crate::heap::{Heap, OutOfMemory};

const LEN: u32 = 0;
const BYTES: u32 = 4;

pub struct CodeType;
pub static CODE_TYPE: CodeType = CodeType;

impl ObjectType for CodeType {
    fn name(&self) -> &'static str {
        "code"
    }

    fn size(&self, heap: &Heap, addr: u32) -> u32 {
        BYTES + heap.read_u16(addr + LEN) as u32
    }

    fn trace(&self, _heap: &mut Heap, _addr: u32) {}

    fn relocate(&self, _heap: &mut Heap, _addr: u32) {}
}

pub fn new(heap: &mut Heap, bytecode: &[u8]) -> Result<Ref, OutOfMemory> {
    assert!(bytecode.len() <= u16::MAX as usize, "code block too long");
    let addr = heap.alloc(BYTES + bytecode.len() as u32)?;
    heap.write_u16(addr + LEN, bytecode.len() as u16);
    heap.write_slice(addr + BYTES, bytecode);
    Ok(Ref::new(addr))
}

pub fn len(heap: &Heap, addr: u32) -> u16 {
    heap.read_u16(addr + LEN)
}

pub fn bytes(heap: &Heap, addr: u32) -> &[u8] {
    heap.slice(addr + BYTES, len(heap, addr) as u32)
}
