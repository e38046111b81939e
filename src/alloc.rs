//! The object zoo: the heap-resident kinds a tiny language runtime needs,
//! each with its [`crate::api::ObjectType`] descriptor. Constructors follow
//! the stash discipline so that a collection in the middle of building an
//! object cannot lose its parts.

pub mod code;
pub mod compile;
pub mod frame;
pub mod func;
pub mod list;
pub mod name;
pub mod string;
