use thiserror::Error;

pub type SignatureResult<T> = Result<T, SignatureError>;

/// Failures raised while generating, encoding or decoding a signature.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Buffer too short, magic mismatch, or size field disagreeing with the buffer.
    #[error("invalid signature header: {0}")]
    InvalidHeader(String),

    #[error("signature checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("unsupported sample rate: {0}")]
    UnsupportedSampleRate(u32),

    #[error("invalid signature uri: {0}")]
    InvalidUri(String),

    /// A band record or peak record could not be parsed or written.
    #[error("malformed signature payload: {0}")]
    MalformedPayload(String),

    /// Peak interpolation produced a non-positive curvature.
    #[error("peak curvature is not positive at frame {fft_pass_number}, bin {bin}")]
    ArithmeticInvariantViolation { fft_pass_number: u32, bin: usize },
}

impl From<std::io::Error> for SignatureError {
    fn from(err: std::io::Error) -> Self {
        SignatureError::MalformedPayload(err.to_string())
    }
}
