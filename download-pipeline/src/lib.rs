#![allow(clippy::missing_docs_in_private_items)]

pub mod cleaner;
pub mod fetcher;
pub mod joiner;
pub mod pipeline;
pub mod urls;
pub mod writer;

pub use pipeline::{DownloadPipeline, PipelineOptions, PipelineSummary};
