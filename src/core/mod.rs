// Core modules: record model, connection lifecycle, record access, backends, errors.
pub mod connection;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod normalize;
pub mod policy;
pub mod profile;
pub mod record;
pub mod store;
