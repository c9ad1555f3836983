mod ratio;
mod session;

pub mod engine;
pub mod response;

pub use engine::Engine;
pub use ratio::compose_ratio;
pub use response::{render_tsv, BookListing, FieldDescription, Response};
