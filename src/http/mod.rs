//! HTTP execution module
//!
//! Request and response records, the single-call executor and the
//! redirect resolver built on top of it.

mod client;
mod redirect;
mod request;
mod response;

pub use client::{Execute, HttpExecutor};
pub use redirect::{next_request, resolve_location, RedirectChain, RedirectHop, RedirectResolver};
pub use request::{HeaderList, MultipartField, PartValue, PreparedRequest, RequestBody, RequestBuilder};
pub use response::{disposition_file_name, HttpResponse, ResponseBody};
