pub mod cache;
pub mod catalog;
pub mod fallback;
pub mod memory;
pub mod provider;

pub use cache::*;
pub use catalog::*;
pub use fallback::*;
pub use memory::MemoryExecutor;
pub use provider::*;
