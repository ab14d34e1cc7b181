//! Module registry: the authoritative catalog of module descriptors, seeded
//! from a build-time manifest. Read everywhere, mutated only by the
//! reconciliation engine through [`ModuleRegistry::update_status`].

pub mod manifest;
mod registry;

pub use registry::ModuleRegistry;
