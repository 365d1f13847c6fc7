//! Transfer Pipeline (C5, §4.1): event ingestion, the per-direction
//! worker pool, and the retry policy they share.

pub mod ingestion;
pub mod retry;
pub mod worker;
