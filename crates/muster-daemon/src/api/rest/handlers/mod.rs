//! API request handlers

mod apps;
mod peer;
mod status;

pub use apps::*;
pub use peer::*;
pub use status::*;
