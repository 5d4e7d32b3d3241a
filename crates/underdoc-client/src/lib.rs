//! Async client for the UnderDoc document extraction service.
//!
//! ```no_run
//! use underdoc_client::Client;
//! use underdoc_core::DocumentInput;
//!
//! # async fn run() -> underdoc_core::Result<()> {
//! let client = Client::from_env()?;
//! let document = DocumentInput::from_path("receipt.jpg").await?;
//! let result = client.extract(&document).await?;
//! println!("{:?}", result.field("expense"));
//! # Ok(())
//! # }
//! ```

mod backoff;
mod batch;
mod client;
mod envelope;
mod fetch;
mod http;
mod parser;
mod poller;
#[cfg(feature = "s3")]
mod s3;
mod submit;

#[cfg(test)]
mod testing;

pub use backoff::{parse_retry_after, Backoff};
pub use batch::{BatchInput, BatchItem, BatchMode};
pub use client::Client;
pub use fetch::fetch_document;
pub use http::{HttpTransport, API_KEY_HEADER};
pub use parser::{parse_date, parse_number, ResultParser};
pub use poller::{status_path, CompletionWaiter};
#[cfg(feature = "s3")]
pub use s3::{object_url, parse_s3_url, S3Source};
pub use submit::{Submission, Submitter, IDEMPOTENCY_KEY_HEADER, SUBMIT_PATH};
