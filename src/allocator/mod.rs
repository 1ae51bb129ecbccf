//! Frame allocators backing job payloads.

pub mod arena;
