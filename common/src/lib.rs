#![allow(clippy::missing_docs_in_private_items)]

pub mod error;
pub mod models;
pub mod utils;
