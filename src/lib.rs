//! Filewatch: Replicated Directory Listings
//!
//! Node agents watch a directory tree and stream existence changes to a
//! storage service, which keeps one namespace per node. An aggregator serves
//! the combined listing over HTTP and keeps answering from its last good pull
//! while storage is unreachable.

pub mod aggregator;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod rpc;
pub mod service;
pub mod store;
pub mod tooling;
pub mod tree;
pub mod types;
pub mod watch;
