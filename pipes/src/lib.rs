//! Ready made pipes.
//!
//! Default priorities, lower fires first:
//!
//! | point          | pipes                                                              |
//! |----------------|--------------------------------------------------------------------|
//! | `on_init`      | dataset handler 0, model handler 0, optimizers 10                  |
//! | `before_epoch` | dataset handler 0, model handler 0, metrics 0, weight averaging 10 |
//! | `before_batch` | optimizers 0                                                       |
//! | `compute_step` | model handler 0, loss handler 10, optimizers 20                    |
//! | `after_batch`  | metrics 0, weight averaging 10, progress 100                       |
//! | `after_epoch`  | weight averaging -10, metrics 0, scheduler 50, logger 100, progress 100 |
//! | `on_checkpoint`| checkpointer 0                                                     |

mod checkpointer;
mod compute_metrics;
mod dataset_handler;
mod logger;
mod loss_handler;
mod model_handler;
mod optimizers;
mod progress;
mod scheduler;
mod sink;
mod weight_averaging;

pub use checkpointer::Checkpointer;
pub use compute_metrics::ComputeMetrics;
pub use dataset_handler::DatasetHandler;
pub use logger::Logger;
pub use loss_handler::LossHandler;
pub use model_handler::ModelHandler;
pub use optimizers::OneStepOptimizers;
pub use progress::ProgressLog;
pub use scheduler::ReduceLrOnPlateau;
pub use sink::{JsonLinesSink, Record, TelemetrySink};
pub use weight_averaging::WeightAveraging;
