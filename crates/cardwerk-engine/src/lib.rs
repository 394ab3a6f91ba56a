// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cardwerk-engine: turns SourceData snapshots into published artifact sets.
//
// The orchestrator owns the caching and concurrency contract; the pipeline
// does the CPU work; the sweeper and maintenance jobs serve operators.

pub mod fetch;
pub mod fingerprint;
pub mod maintenance;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod sweeper;

pub use fetch::PhotoFetcher;
pub use maintenance::{BatchSummary, regenerate_below, reprocess_photos};
pub use orchestrator::{
    ArtifactPublisher, GenerateOptions, GenerationEngine, GenerationFailure, GenerationOutcome,
};
pub use pipeline::{Pipeline, RenderedArtifacts};
pub use retry::{RetryDecision, RetryPolicy, should_retry};
pub use sweeper::Sweeper;
