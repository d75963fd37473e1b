pub mod environment;
pub mod file;
