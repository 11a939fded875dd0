#[cfg(test)]
mod test;

pub mod config;
pub mod diff;
pub mod digest;
pub mod error;
pub mod filemode;
pub mod graph;
pub mod lock;
pub mod repo;
pub mod storable;
mod util;

pub use crate::digest::Digest;
pub use crate::error::{Error, Result};
pub use crate::repo::Repo;
