//! Daemon process relaying CLI requests to the page host.

pub mod client;
pub mod paths;
pub mod rpc;
pub mod server;
pub mod wire;

pub use client::DaemonClient;
pub use server::DaemonServer;
