#![forbid(unsafe_code)]

pub mod api;
pub mod checkpoint;
pub mod cli;
pub mod collect;
pub mod config;
pub mod discovery;
pub mod emit;
pub mod enrich;
pub mod error;
pub mod formats;
pub mod images;
pub mod logging;
pub mod pipeline;
pub mod session;
pub mod transcode;
pub mod webp;
