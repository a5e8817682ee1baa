//! Wire primitives: the byte-level request parser and response serializer.

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::{Request, Scheme};
pub use response::Response;
