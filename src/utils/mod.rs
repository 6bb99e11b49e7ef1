pub mod error;

pub use error::LtError;
