//! # varsity-shared
//!
//! Vocabulary types shared by every layer of the Varsity portal: roles,
//! audiences, categories, the authenticated [`Actor`], stored-file references,
//! paging, and the portal-wide error taxonomy.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{PortalError, Result};
pub use types::*;
