//! IPC module for controlling the daemon over a Unix socket

mod protocol;
mod server;

pub use server::{Context, Server};
