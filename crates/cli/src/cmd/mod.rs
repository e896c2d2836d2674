mod build;
mod clean;
mod targets;
mod vars;

pub use build::cmd_build;
pub use clean::{cmd_clean, cmd_distclean};
pub use targets::cmd_targets;
pub use vars::cmd_vars;
