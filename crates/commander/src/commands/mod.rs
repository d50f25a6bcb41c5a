//! Anfragen der Clients: Typen, Parser und Ausfuehrung

pub mod executor;
pub mod parser;
pub mod types;

pub use executor::RequestExecutor;
pub use parser::parse_request;
pub use types::Request;
