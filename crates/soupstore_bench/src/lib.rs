//! Shared setup for SoupStore benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
