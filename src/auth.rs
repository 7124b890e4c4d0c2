//! Token models, session identifiers, and the [`TokenProvider`] contract.

pub mod id;
pub mod provider;
pub mod record;
pub mod secret;

pub use id::*;
pub use provider::*;
pub use record::*;
pub use secret::*;
