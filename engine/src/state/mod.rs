mod metrics;
mod mode;
mod run_state;
mod status;

pub use metrics::Metrics;
pub use mode::Mode;
pub use run_state::RunState;
pub use status::Status;
