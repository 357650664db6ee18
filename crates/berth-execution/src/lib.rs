pub mod logging;
pub mod supervisor;

pub use logging::init_logging;
pub use supervisor::{Supervisor, wait_for_shutdown_signal};
