//! # tls-identity-cli
//!
//! Command-line front end for [`tls_identity`].
//!
//! - `certgen ensure`: reuse or regenerate `server.crt` / `server.key`
//! - `certgen inspect`: report what is on disk without touching it
//! - `certgen config`: show the effective configuration and its path

pub mod cli;
pub mod config;
pub mod logging;
pub mod output;

pub use cli::run;
