//! # Ember
//!
//! Ember is a precise, moving, compacting garbage collector for tiny language
//! runtimes implemented in Rust. The whole heap is one contiguous byte pool;
//! objects are carved out of it by a bump allocator and periodically slid back
//! toward offset zero so that the live set stays densely packed. The design
//! targets very small heaps (one to a few dozen kilobytes): there are no
//! per-object headers, no semispace copy, and no unbounded mark stack.
//!
//! # Features
//! - Bump allocation with granule alignment and zero-filled memory
//! - Precise marking through per-kind type descriptors ([`api::ObjectType`])
//! - Bounded side state: relocation runs over a fixed-size chunk window and
//!   simply takes more passes when the window overflows
//! - Incremental sweeps that skip the long-lived bottom of the pool, with a
//!   periodic full compaction
//! - Stash registers for rooting values across an allocation that may collect
//! - A ready-made object zoo ([`alloc`]) with lists, strings, functions,
//!   bytecode blocks, frames and an interned name chain
//!
//! Heap references are pool offsets, never raw pointers, so relocation cannot
//! invalidate anything the client is allowed to hold; anything that must
//! survive an allocation goes through the root table or the stash.

pub mod alloc;
pub mod api;
pub mod bitmap;
pub mod compact;
pub mod global;
pub mod heap;
pub mod pool;
pub mod statistics;
pub mod utils;

pub use api::{Kind, ObjectType, Ref, Value};
pub use compact::CollectKind;
pub use heap::{Heap, HeapOptions, OutOfMemory, RootHook, RootId, RootVisitor};

#[cfg(test)]
mod tests;
