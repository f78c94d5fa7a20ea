//! Backblaze B2 backend

pub mod backend;
pub mod client;
pub mod errors;
pub mod types;

pub use backend::B2Backend;
pub use client::B2Client;
