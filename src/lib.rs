//! sortbench: a TCP sort-offload service built three ways.
//!
//! A client sends an array of 32-bit integers in a length-prefixed frame
//! and receives the sorted array back together with two server-side
//! measurements: total processing time and pure sort time. The service is
//! implemented with three deliberately different concurrency
//! architectures behind one wire protocol, so they can be benchmarked
//! against each other:
//!
//! - [`SimpleServer`]: one thread per connection
//! - [`PooledServer`]: per-connection readers plus a fixed worker pool
//! - [`MultiplexedServer`]: readiness-multiplexed event threads plus a
//!   worker pool

pub mod client;
pub mod config;
pub mod error;
pub mod pool;
pub mod server;
pub mod sort;
pub mod wire;

pub use client::Client;
pub use error::Error;
pub use server::{MultiplexedServer, PooledServer, SimpleServer};
