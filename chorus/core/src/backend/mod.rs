//! Backend Integration
//!
//! Access to the summarize backend through a common trait interface.
//!
//! # Available Backends
//!
//! - **HTTP**: the chorus REST backend (default)
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use chorus_core::backend::{ChatBackend, HttpBackend, StaticCredentials, SummarizeRequest};
//!
//! let backend = HttpBackend::from_settings(&settings, Arc::new(StaticCredentials::anonymous()))?;
//! let request = SummarizeRequest::new("Hello!", vec!["gemini".into(), "deepseek".into()]);
//! let bytes = backend.summarize(&request).await?;
//! ```

mod http;
mod traits;

pub use http::HttpBackend;
pub use traits::{
    ByteStream, ChatBackend, CredentialProvider, StaticCredentials, SummarizeRequest,
};
