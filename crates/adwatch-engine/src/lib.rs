//! Run orchestration, ad reconciliation, media storage and scoring.

pub mod controller;
pub mod error;
pub mod media;
pub mod memory;
pub mod reconciler;
pub mod retry;
pub mod scoring;
pub mod store;

pub use controller::{CompetitorReport, CompetitorSelector, RunController, RunSettings};
pub use error::EngineError;
pub use media::{extension_for, AdMedia, BatchResult, MediaError, MediaOutcome, MediaStore};
pub use memory::MemoryStore;
pub use reconciler::{reconcile, ReconcileOutcome};
pub use retry::{Backoff, DelayRange, Pause, RetryPolicy, TokioPause};
pub use scoring::{
    calculate_winner_score, find_scaling_clusters, media_fingerprint, score_all_ads,
    text_similarity, ScoringStats, DEFAULT_SIMILARITY_THRESHOLD, TOP_PERFORMER_SCORE,
    WINNER_SCORE,
};
pub use store::{AdStore, PgStore};
