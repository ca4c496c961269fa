pub mod app;
pub mod domain;
pub mod infra;
pub mod runtime;
pub mod vfs;
