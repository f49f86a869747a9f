pub mod executor;
pub mod gate;
pub mod models;
pub mod network;
pub mod notifications;
pub mod orchestrator;
pub mod progress;
pub mod scheduler;
pub mod selector;
pub mod status_log;

pub use executor::MirrorExecutor;
pub use gate::{LinkQualityGate, is_private_address};
pub use models::{JobOutcome, MirrorJob, MissingTool, RunOutcome};
pub use network::{
    MeteredConnection, MeteredState, NetworkProbe, ProbeOutcome, SpeedMeasurement, SpeedTester,
};
pub use notifications::{
    MAX_DETAIL_BYTES, Notification, NotificationChannel, NotificationKind, Notifier,
    TRUNCATED_MARKER, bounded_detail,
};
pub use orchestrator::Orchestrator;
pub use progress::{ProgressEvent, format_count, status_line};
pub use scheduler::RunScheduler;
pub use selector::ServerSelector;
pub use status_log::{STATUS_SEPARATOR, StatusLog, read_status};
