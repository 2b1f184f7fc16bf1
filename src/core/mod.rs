pub mod app;
pub mod archive;
pub mod cache;
pub mod catalog;
pub mod compat;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod http;
pub mod install;
pub mod launch;
pub mod paths;
pub mod progress;
pub mod scan;
