// Status API modules
pub mod api;
pub mod types;

#[cfg(test)]
mod tests;

pub use api::*;
pub use types::*;
