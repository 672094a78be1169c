use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A page was merged before the pages preceding it.
    #[error("Page {got} merged out of sequence (expected page {expected})")]
    OutOfSequence { expected: u32, got: u32 },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
