//! Tenant isolation: partition naming and ownership filtering.

mod partition;

pub use partition::{Partition, filter_owned, resolve};
