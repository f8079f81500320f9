use thiserror::Error;

/// Error kinds the pipeline produces or tolerates.
///
/// Conditions that simply mean "forward the original query untouched" —
/// an unparsable query, no lower time bound, an unknown schema or RP —
/// aren't represented here at all: `pipeline.rs` signals them with plain
/// `Option`/`let-else` returns of `Ok(None)`, since no call site ever
/// needs more than "didn't apply" for those cases.
#[derive(Debug, Error)]
pub enum CleanfluxError {
    #[error("backend request failed transiently after retries: {0}")]
    BackendTransient(String),

    #[error("backend rejected the request ({status}): {body}")]
    BackendClient { status: u16, body: String },

    #[error("backend server error ({status})")]
    BackendServer { status: u16 },

    #[error("could not decode backend response: {0}")]
    BackendDecode(String),

    #[error("internal rewrite failure, forwarding original query: {0}")]
    InternalRewriteFailure(String),
}

pub type Result<T> = std::result::Result<T, CleanfluxError>;
