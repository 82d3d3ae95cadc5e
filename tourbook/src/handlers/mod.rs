//! HTTP handler building blocks: the success envelope, request extractors
//! and the generic CRUD handler factory

pub mod envelope;
pub mod extract;
pub mod factory;

pub use envelope::{no_content, Envelope};
pub use extract::{JsonBody, Params};
pub use factory::{ResourceHandlers, ID_PARAM};
