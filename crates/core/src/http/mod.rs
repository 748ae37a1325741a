//! Request/response public surface (spec.md §3, §4.5): the `IRequest` /
//! `IResponse` types an application actually holds, built from the typed
//! [`http::Method`]/[`http::StatusCode`] plus this crate's own
//! [`fields::Fields`] header map (pseudo-headers live outside it, see
//! [`crate::pseudo_header`]).

pub mod body;
pub mod fields;
pub mod request;
pub mod response;

pub use body::{Body, BodyProviderFn};
pub use fields::{FieldName, FieldValue, Fields};
pub use request::Request;
pub use response::{PushChild, Response};
