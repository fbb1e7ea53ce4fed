//! changeapp provisioning library
//!
//! Declares the collections the transaction service needs and drives the
//! bootstrap of user, databases, and indexes against MongoDB.

pub mod bootstrap;
pub mod modules;

pub use bootstrap::Bootstrap;
