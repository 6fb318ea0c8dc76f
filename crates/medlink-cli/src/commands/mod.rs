//! Command implementations for the CLI.

mod decode;
mod paired;
mod reconnect;
mod scan;
mod watch;

pub use decode::cmd_decode;
pub use paired::{cmd_auto_connect, cmd_forget, cmd_paired};
pub use reconnect::cmd_reconnect;
pub use scan::cmd_scan;
pub use watch::{WatchArgs, cmd_watch};
