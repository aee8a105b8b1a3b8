pub mod book;
pub mod prediction;
pub mod qa;

pub use book::{BookMetadata, BookRecord, Split};
pub use prediction::PredictionRecord;
pub use qa::QaPair;
