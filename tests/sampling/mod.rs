//! End-to-end sampling through the public API.

mod config;
mod elf;
mod timeout;
