pub mod config;
pub mod error;
pub mod importer;
pub mod model;
pub mod page;
pub mod parser;
pub mod reconcile;
pub mod redmine;
pub mod session;
pub mod submit;
pub mod summary;

pub use error::ImportError;
