//! Batched, prioritized and deduplicated resource loading, with a handler that loads whole scene
//! graphs into a [`hecs::World`].

pub mod entity;
pub mod io;
pub mod resources;
