//! DealHunt ingestion library.
//!
//! Harvests deal posts from subreddits, parses them into structured deal
//! records and stores them with a price history, driven either by an
//! in-process timer or a durable job queue.

#![allow(clippy::needless_raw_string_hashes)]

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod ingest;
pub mod og_extractor;
pub mod parser;
pub mod reddit;
pub mod scheduler;
