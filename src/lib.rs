// src/lib.rs

//! repod
//!
//! Manages pacman package repositories stored on the host, addressed as
//! `<repo>/<epoch>/<database>/<architecture>` under a repositories root.
//!
//! # Architecture
//!
//! - Addressing: [`locator::Locator`] resolves an address to a packages
//!   directory and the database name its index archive is named after
//! - Delegation: signing, indexing and querying run external tools
//!   (`gpg`, `repo-add`/`repo-remove`, `pacman`) with deadlines
//! - Isolation: queries run pacman against a throwaway DBPath and config
//! - Serialization: every packages directory has an advisory lock
//! - Transports: a CLI and a versioned HTTP API share [`repository::RepositoryFacade`]

pub mod config;
mod error;
pub mod locator;
pub mod lock;
pub mod packages;
pub mod process;
pub mod repository;
pub mod server;

pub use error::{Error, ErrorKind, Result};
