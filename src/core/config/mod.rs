pub mod data;
pub mod defaults;
pub mod io;

pub use data::{Config, McpServerConfig, ProviderConfig};
pub use io::ConfigError;
