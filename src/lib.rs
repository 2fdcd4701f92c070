pub mod domain;
pub mod error;
pub mod identity;
pub mod links;
pub mod pipeline;
pub mod resolve;
pub mod store;
pub mod template;
pub mod value;
