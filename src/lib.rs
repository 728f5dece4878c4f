// src/lib.rs

//! rapt: APT-style package management for RPM systems
//!
//! The core of the crate is a dependency resolution and transaction
//! ordering engine:
//!
//! - [`cache`]: the package cache, built from index files by [`index`]
//! - [`policy`]: candidate version selection
//! - [`depcache`]: the planned-state overlay (keep, install, delete)
//! - [`resolver`]: repairs broken planned states
//! - [`order`]: turns a plan into ordered install/configure/remove steps
//! - [`pm`]: fetches archives and runs `rpm`
//!
//! [`session::Session`] ties these together for one run.

pub mod cache;
pub mod config;
pub mod depcache;
pub mod diagnostics;
mod error;
pub mod index;
pub mod order;
pub mod pm;
pub mod policy;
pub mod resolver;
pub mod session;
pub mod version;

pub use cache::{PackageCache, PkgId, VerId};
pub use config::Config;
pub use depcache::{DepCache, Mode, Stats};
pub use diagnostics::Diagnostics;
pub use error::{Error, Result};
pub use policy::Policy;
pub use session::Session;
