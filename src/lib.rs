//! Retromirror Library
//!
//! Mirror per-emulator save and config trees off a handheld over FTP, then
//! push a timestamped copy of the local mirror to a backup host over SFTP.

pub mod archive;
pub mod classify;
pub mod cli;
pub mod config;
pub mod ftp_session;
pub mod logger;
pub mod mirror_down;
pub mod mirror_up;
pub mod normalize;
pub mod orchestrator;
pub mod session;
pub mod sftp_session;
pub mod stats;
