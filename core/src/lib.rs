//! Guarded forwarder for the API explorer.
//!
//! # Overview
//! Takes a caller-described HTTP request, checks its destination against an
//! SSRF policy, performs the call under a timeout and a response-size
//! ceiling, and returns a sanitized envelope or a typed error.
//!
//! # Design
//! - `RequestSpec` is plain data decoded from the caller's JSON.
//! - `DestinationPolicy` is the seam between "may we go there" and "go
//!   there"; `SsrfValidator` is the production policy.
//! - `Executor` owns all network I/O and every resource bound.
//! - `envelope::build` is a pure transform from `RawResponse` to
//!   `ResponseEnvelope`.
//! - `ForwardError` is closed and maps one-to-one onto HTTP statuses.

pub mod envelope;
pub mod error;
pub mod executor;
pub mod forwarder;
pub mod http;
pub mod policy;

pub use envelope::{ErrorEnvelope, ResponseData, ResponseEnvelope};
pub use error::ForwardError;
pub use executor::{Executor, ExecutorConfig, RawResponse};
pub use forwarder::Forwarder;
pub use http::{HttpMethod, RequestSpec};
pub use policy::{
    Destination, DestinationPolicy, DestinationVerdict, Resolver, SsrfValidator, SystemResolver,
};
