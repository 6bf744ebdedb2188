//! Audio signatures: peak extraction from PCM and the binary wire format.
//!
//! The generator turns 16-bit mono PCM into time-stamped spectral peaks;
//! the codec packs those peaks into a checksummed binary blob (optionally
//! wrapped in a base64 `data:` URI) that a recognition service can match.

pub mod codec;
mod crc;
pub mod error;
pub mod generator;
pub mod model;
mod ring_buffer;

pub use generator::{GeneratorConfig, SignatureGenerator};
pub use model::{FrequencyBand, FrequencyPeak, SampleRate, Signature};
