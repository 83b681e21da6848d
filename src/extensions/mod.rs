//! Extension resolution
//!
//! Entities forward calls for selectors they do not implement natively to the
//! [`CoreExtensionRegistry`]. A miss is reported as an unsupported operation,
//! never as a crash.

pub mod registry;
pub mod selector;

pub use registry::{CoreExtensionRegistry, Extension, ExtensionMetadata};
pub use selector::Selector;
