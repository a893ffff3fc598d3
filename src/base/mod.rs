//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): resolution error codes, mirroring Chromium's
//!   `net_error_list.h` where an equivalent exists
//! - [`context`]: `io::Result` extensions that attach server context
//! - [`blocking`]: drives async work to completion for synchronous callers

pub mod blocking;
pub mod context;
pub mod neterror;
