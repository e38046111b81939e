//! Growable lists. A list is a small fixed header plus a separately
//! allocated blob of element values; growing swaps in a bigger blob. Two
//! header fields, `noted` and `note_next`, thread the collector's deferred
//! traversal worklist through the lists themselves, so no auxiliary queue is
//! needed during marking.

use modular_bitfield::prelude::*;

use crate::api::{ObjectType, Ref, Value};
use crate::heap::{Heap, OutOfMemory};

const BITS: u32 = 0;
const NOTE_NEXT: u32 = 4;
const DATA: u32 = 8;
const HEADER_SIZE: u32 = 12;
const VALUE_SIZE: u32 = 4;

#[bitfield(bits = 32)]
#[derive(Clone, Copy)]
struct ListBits {
    len: B15,
    noted: bool,
    cap: B16,
}

fn bits(heap: &Heap, addr: u32) -> ListBits {
    ListBits::from_bytes(heap.read_u32(addr + BITS).to_ne_bytes())
}

fn set_bits(heap: &mut Heap, addr: u32, bits: ListBits) {
    heap.write_u32(addr + BITS, u32::from_ne_bytes(bits.into_bytes()));
}

pub struct ListType;
pub static LIST_TYPE: ListType = ListType;

impl ObjectType for ListType {
    fn name(&self) -> &'static str {
        "list"
    }

    fn size(&self, _heap: &Heap, _addr: u32) -> u32 {
        HEADER_SIZE
    }

    fn trace(&self, heap: &mut Heap, addr: u32) {
        let data = heap.read_ref(addr + DATA);
        let cap = bits(heap, addr).cap() as u32;
        if let Some(data) = data.get() {
            heap.mark_blob(data, cap * VALUE_SIZE);
            for at in 0..cap {
                heap.mark_value(heap.read_value(data + at * VALUE_SIZE));
            }
        }
    }

    fn relocate(&self, heap: &mut Heap, addr: u32) {
        let mut data = heap.read_ref(addr + DATA);
        let cap = bits(heap, addr).cap() as u32;
        if !data.is_null() {
            heap.move_blob_ref(&mut data);
            heap.write_ref(addr + DATA, data);
            let data = data.offset();
            for at in 0..cap {
                let mut value = heap.read_value(data + at * VALUE_SIZE);
                heap.move_value(&mut value);
                heap.write_value(data + at * VALUE_SIZE, value);
            }
        }
    }
}

// Worklist plumbing used by the collector.

pub(crate) fn noted(heap: &Heap, addr: u32) -> bool {
    bits(heap, addr).noted()
}

pub(crate) fn set_noted(heap: &mut Heap, addr: u32, value: bool) {
    let mut b = bits(heap, addr);
    b.set_noted(value);
    set_bits(heap, addr, b);
}

pub(crate) fn note_next(heap: &Heap, addr: u32) -> Ref {
    heap.read_ref(addr + NOTE_NEXT)
}

pub(crate) fn set_note_next(heap: &mut Heap, addr: u32, next: Ref) {
    heap.write_ref(addr + NOTE_NEXT, next);
}

/// Allocate a list with room for `cap` elements. The header is stashed
/// across the element blob allocation.
pub fn new(heap: &mut Heap, cap: u16) -> Result<Ref, OutOfMemory> {
    let addr = heap.alloc(HEADER_SIZE)?;
    if cap == 0 {
        return Ok(Ref::new(addr));
    }
    heap.stash(Value::list(Ref::new(addr)));
    let data = match heap.alloc(cap as u32 * VALUE_SIZE) {
        Ok(data) => data,
        Err(e) => {
            heap.fetch();
            return Err(e);
        }
    };
    let list = heap.fetch().as_ref();
    let addr = list.offset();
    heap.write_ref(addr + DATA, Ref::new(data));
    let mut b = bits(heap, addr);
    b.set_cap(cap);
    set_bits(heap, addr, b);
    Ok(list)
}

pub fn len(heap: &Heap, addr: u32) -> u16 {
    bits(heap, addr).len()
}

pub fn capacity(heap: &Heap, addr: u32) -> u16 {
    bits(heap, addr).cap()
}

pub fn get(heap: &Heap, addr: u32, index: u16) -> Value {
    assert!(index < len(heap, addr), "list index out of range");
    let data = heap.read_ref(addr + DATA).offset();
    heap.read_value(data + index as u32 * VALUE_SIZE)
}

pub fn set(heap: &mut Heap, addr: u32, index: u16, value: Value) {
    assert!(index < len(heap, addr), "list index out of range");
    let data = heap.read_ref(addr + DATA).offset();
    heap.write_value(data + index as u32 * VALUE_SIZE, value);
}

/// Append a value, doubling the element blob when it is full. Both the list
/// and the value are stashed across the allocation; the caller must continue
/// with the returned reference, which accounts for any moves.
pub fn push(heap: &mut Heap, list: Ref, value: Value) -> Result<Ref, OutOfMemory> {
    let mut list = list;
    let mut value = value;
    let b = bits(heap, list.offset());
    if b.len() == b.cap() {
        heap.stash(value);
        heap.stash(Value::list(list));
        let new_cap = (b.cap() * 2).max(4);
        let new_data = match heap.alloc(new_cap as u32 * VALUE_SIZE) {
            Ok(data) => data,
            Err(e) => {
                heap.fetch();
                heap.fetch();
                return Err(e);
            }
        };
        list = heap.fetch().as_ref();
        value = heap.fetch();
        let addr = list.offset();
        if let Some(old) = heap.read_ref(addr + DATA).get() {
            heap.copy_within(old, new_data, b.cap() as u32 * VALUE_SIZE);
        }
        heap.write_ref(addr + DATA, Ref::new(new_data));
        let mut grown = bits(heap, addr);
        grown.set_cap(new_cap);
        set_bits(heap, addr, grown);
    }

    let addr = list.offset();
    let mut b = bits(heap, addr);
    let data = heap.read_ref(addr + DATA).offset();
    heap.write_value(data + b.len() as u32 * VALUE_SIZE, value);
    b.set_len(b.len() + 1);
    set_bits(heap, addr, b);
    Ok(list)
}
