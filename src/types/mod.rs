mod dimension;
mod error;
mod plan;
mod status;
mod tenant;
mod usage;

pub use dimension::*;
pub use error::*;
pub use plan::*;
pub use status::*;
pub use tenant::*;
pub use usage::*;
