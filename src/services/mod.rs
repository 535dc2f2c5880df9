pub mod change_detector;
pub mod monitor;
pub mod notifier;
pub mod resolver;

pub use change_detector::{detect_changes, DetectOptions};
pub use monitor::{run_poll_loop, CycleReport, Monitor, UserOutcome};
pub use notifier::{send_events, EventNotifier, Notifier};
pub use resolver::{ProfileResolver, WalletResolver};
