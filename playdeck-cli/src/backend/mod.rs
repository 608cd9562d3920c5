pub mod http;

pub use http::{HttpBackend, HttpLogSource};
