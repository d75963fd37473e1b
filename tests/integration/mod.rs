//! Integration tests for the node -> storage -> aggregator pipeline

mod aggregator_fallback;
mod cli_contracts;
mod pipeline;
mod reconnect;
mod support;
