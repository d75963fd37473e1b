//! Node <-> storage RPC: wire codec, caller and service.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::StorageClient;
pub use protocol::{split_update, Request, Response, MAX_FRAME};
pub use server::StorageService;
