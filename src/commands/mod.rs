//! CLI command implementations.

mod add;
mod config;
mod context;
mod docs;
mod image;
mod init;
mod plan;
mod query;
mod quota;

pub use add::AddCmd;
pub use config::ConfigCmd;
pub use docs::DocsCmd;
pub use image::ImageCmd;
pub use init::InitCmd;
pub use plan::PlanCmd;
pub use query::QueryCmd;
pub use quota::QuotaCmd;
