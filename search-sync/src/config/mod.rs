//! Startup configuration: environment settings, the descriptor file and
//! dependency wiring.

mod dependencies;
mod descriptors;
mod settings;

pub use dependencies::Dependencies;
pub use descriptors::DescriptorFile;
pub use settings::{IndexBackend, Settings};
