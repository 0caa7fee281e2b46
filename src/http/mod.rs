//! HTTP/1.1 wire codec.
//!
//! Stateless translation between raw bytes and structured requests and
//! responses. The server core feeds it whatever bytes a worker has read and
//! hands it finished responses to serialize.
//!
//! - **`parser`**: Decodes one request (request line, query parameters, headers, cookies, form line)
//! - **`request`**: HTTP request representation and accessors
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Splits a response into header and body blocks for one vectored write
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Request cycle on one connection
//!
//! ```text
//!        ┌─────────────┐
//!        │    Armed    │ ← Registered for read interest on its poller
//!        └──────┬──────┘
//!               │ Read-ready: interest cancelled, handed to a worker
//!               ▼
//!        ┌──────────────────┐
//!        │     Parsing      │ ← parser::parse_request over buffered bytes
//!        └──────┬───────────┘
//!               │ Request complete
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← writer::ResponseWriter (vectored)
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Armed (same poller)
//!               └─ Close → Closed
//! ```
//!
//! # Example
//!
//! ```
//! use connector::http::parser::parse_request;
//!
//! let (request, consumed) = parse_request(b"GET /s?a=1&a=2 HTTP/1.1\r\n\r\n").unwrap();
//! assert_eq!(request.parameter_values("a").unwrap(), ["1", "2"]);
//! assert_eq!(consumed, 27);
//! ```

pub mod request;
pub mod response;
pub mod parser;
pub mod writer;
pub mod mime;
