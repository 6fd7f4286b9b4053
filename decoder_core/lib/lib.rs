//! Per-step decoding core for a batched LM runtime: top-k/top-p sampling,
//! full-vocabulary scoring, stop-token latching, and prefix reconciliation
//! against a session's processed-token history.

pub mod error;
pub mod prefix;
pub mod sampling;
pub mod scoring;
pub mod stop;

pub use error::{DecodeError, Result};
pub use prefix::remove_matching_tokens;
pub use sampling::{
    softmax, top_k_token_ids, top_k_top_p_sampling, BatchedSampler, SamplingArgs,
};
pub use scoring::compute_log_likelihood;
pub use stop::{update_stop_latches, StopTracker};
