//! OneDrive for Business backend (Microsoft Graph)

pub mod backend;
pub mod client;
pub mod errors;
pub mod types;

pub use backend::OneDriveBackend;
pub use client::OneDriveClient;
