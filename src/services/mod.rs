pub mod chunk_planner;
pub mod notifier;
pub mod prompt;
pub mod scorer;

pub use chunk_planner::{estimate_time, plan_chunks, ChunkPlan};
pub use notifier::{FailureReport, Notifier, ResultStats};
pub use prompt::build_scoring_prompt;
pub use scorer::{RetryPolicy, Scorer};
