pub mod job;
pub mod score;

pub use job::{new_job_id, Chunk, Job, JobPhase};
pub use score::{ScoreResult, ScoringMode, MAX_SCORE, MIN_SCORE};
