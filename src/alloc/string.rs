//! Immutable byte strings: a length word followed by the bytes.

use crate::api::{ObjectType, Ref};
use crate::heap::{Heap, OutOfMemory};

const LEN: u32 = 0;
const BYTES: u32 = 4;

pub struct StringType;
pub static STRING_TYPE: StringType = StringType;

impl ObjectType for StringType {
    fn name(&self) -> &'static str {
        "string"
    }

    fn size(&self, heap: &Heap, addr: u32) -> u32 {
        BYTES + heap.read_u16(addr + LEN) as u32
    }

    fn trace(&self, _heap: &mut Heap, _addr: u32) {}

    fn relocate(&self, _heap: &mut Heap, _addr: u32) {}
}

pub fn new(heap: &mut Heap, s: &str) -> Result<Ref, OutOfMemory> {
    assert!(s.len() <= u16::MAX as usize, "string too long");
    let addr = heap.alloc(BYTES + s.len() as u32)?;
    heap.write_u16(addr + LEN, s.len() as u16);
    heap.write_slice(addr + BYTES, s.as_bytes());
    Ok(Ref::new(addr))
}

pub fn len(heap: &Heap, addr: u32) -> u16 {
    heap.read_u16(addr + LEN)
}

pub fn bytes(heap: &Heap, addr: u32) -> &[u8] {
    heap.slice(addr + BYTES, len(heap, addr) as u32)
}

pub fn as_str(heap: &Heap, addr: u32) -> &str {
    // contents always originate from a &str
    unsafe { std::str::from_utf8_unchecked(bytes(heap, addr)) }
}
