pub mod data_uri;
pub mod error;
pub mod events;
pub mod media;
pub mod models;
pub mod request;
pub mod runs;

pub use error::{ErrorKind, GenerationError};
