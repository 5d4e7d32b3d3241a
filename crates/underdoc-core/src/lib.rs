pub mod config;
pub mod document;
pub mod error;
pub mod job;
pub mod result;
pub mod schema;
pub mod transport;

pub use config::{ClientConfig, Credential, PollPolicy, RetryPolicy};
pub use document::{paths_matching, DocumentInput, ImageFormat};
pub use error::{ErrorKind, Result, UnderdocError};
pub use job::{Job, JobId, JobStatus};
pub use result::{ExtractionResult, FieldValue};
pub use schema::{ExtractionSchema, FieldSpec, FieldType};
pub use transport::{Method, RawResponse, Transport, TransportRequest};
