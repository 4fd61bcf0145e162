//! KDL configuration parsing for the wheelwright build master.

pub mod error;
pub mod master;

pub use error::{ConfigError, ConfigResult};
pub use master::{
    ArchitectSettings, DEFAULT_BUILD_QUEUE, MasterConfig, ReactorSettings, load_master_config,
    parse_master_config,
};
