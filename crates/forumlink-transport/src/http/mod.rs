//! HTTP request building, response parsing and the `reqwest` transport

pub mod client;
pub mod request;
pub mod response;

pub use client::{HttpTransport, Transport, fetch_json};
pub use request::{
    API_KEY, API_USERNAME, AcceptHeader, BodySerializer, PreparedRequest, RequestBody,
    RequestOptions, USER_API_CLIENT_ID, USER_API_KEY, resolve_url,
};
pub use response::{Response, ResponseBody, UNREADABLE_BODY, parse_retry_after};
