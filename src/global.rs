//! Optional process-wide heap. The pool, bitmap, window and stash are all
//! owned by [`Heap`] and most embedders should thread one through their
//! runtime; this module serves the ones that want the classic single-runtime
//! model instead.

use parking_lot::{const_mutex, Mutex};

use crate::heap::{Heap, HeapOptions};

static HEAP: Mutex<Option<Heap>> = const_mutex(None);

/// Create the global heap. Panics when called twice.
pub fn init(options: HeapOptions) {
    let mut slot = HEAP.lock();
    assert!(slot.is_none(), "global heap already initialized");
    *slot = Some(Heap::new(options));
}

/// Run `f` against the global heap.
pub fn with<R>(f: impl FnOnce(&mut Heap) -> R) -> R {
    let mut slot = HEAP.lock();
    f(slot.as_mut().expect("global heap is not initialized"))
}

#[cfg(test)]
pub(crate) fn reset() {
    *HEAP.lock() = None;
}
