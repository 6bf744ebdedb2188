//! Binary wire format for signatures.
//!
//! Layout, little-endian throughout:
//!
//! ```text
//! 0   u32 magic1 (0xCAFE2580)
//! 4   u32 crc32 of bytes[8..]
//! 8   u32 size_minus_header
//! 12  u32 magic2 (0x94119C00)
//! 16  u32[3] reserved
//! 28  u32 sample_rate_id
//! 32  u32[2] reserved
//! 40  u32 number_samples + floor(sample_rate * 0.24)
//! 44  u32 magic3 ((15 << 19) + 0x40000)
//! 48  u32 0x40000000, u32 size_minus_header
//! 56  band records: u32 0x60030040 + band, u32 len, peaks, zero padding to 4 bytes
//! ```

use base64::Engine;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

use super::crc::crc32;
use super::error::{SignatureError, SignatureResult};
use super::model::{FrequencyBand, FrequencyPeak, SampleRate, Signature};

pub const HEADER_SIZE: usize = 48;
pub const URI_PREFIX: &str = "data:audio/vnd.shazam.sig;base64,";

const MAGIC1: u32 = 0xCAFE_2580;
const MAGIC2: u32 = 0x9411_9C00;
const MAGIC3: u32 = (15 << 19) + 0x40000;
const CONTENTS_TAG: u32 = 0x4000_0000;
const BAND_TAG_BASE: u32 = 0x6003_0040;
const CRC_OFFSET: usize = 4;
const CHECKSUMMED_FROM: usize = 8;

/// Peak record marker: the next four bytes are an absolute FFT pass number.
const ABSOLUTE_PASS_MARKER: u8 = 0xFF;

/// The 48-byte header, read and written field by field.
#[derive(Clone, Debug, PartialEq, Eq)]
struct RawHeader {
    magic1: u32,
    crc32: u32,
    size_minus_header: u32,
    magic2: u32,
    sample_rate_id: u32,
    samples_plus_scaled_rate: u32,
    magic3: u32,
}

impl RawHeader {
    fn read(bytes: &[u8]) -> SignatureResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(SignatureError::InvalidHeader(format!(
                "buffer is {} bytes, header needs {}",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        let field = |offset: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&bytes[offset..offset + 4]);
            u32::from_le_bytes(raw)
        };
        Ok(Self {
            magic1: field(0),
            crc32: field(4),
            size_minus_header: field(8),
            magic2: field(12),
            sample_rate_id: field(28),
            samples_plus_scaled_rate: field(40),
            magic3: field(44),
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        let fields: [u32; 12] = [
            self.magic1,
            self.crc32,
            self.size_minus_header,
            self.magic2,
            0,
            0,
            0,
            self.sample_rate_id,
            0,
            0,
            self.samples_plus_scaled_rate,
            self.magic3,
        ];
        for value in fields {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Serialize a signature into the binary wire format.
pub fn encode(signature: &Signature) -> SignatureResult<Vec<u8>> {
    let sample_rate = signature.sample_rate();

    let mut contents: Vec<u8> = Vec::new();
    for (band, peaks) in signature.peaks_by_band() {
        let payload = encode_peaks(peaks)?;
        contents.write_u32::<LittleEndian>(BAND_TAG_BASE + band.index())?;
        contents.write_u32::<LittleEndian>(payload.len() as u32)?;
        contents.extend_from_slice(&payload);
        contents.resize(contents.len() + padding_for(payload.len()), 0);
    }

    let size_minus_header = (contents.len() + 8) as u32;
    let samples_plus_scaled_rate = signature
        .number_samples()
        .checked_add(sample_rate.sample_count_offset())
        .ok_or_else(|| {
            SignatureError::MalformedPayload(format!(
                "sample count {} does not fit the header",
                signature.number_samples()
            ))
        })?;

    let header = RawHeader {
        magic1: MAGIC1,
        crc32: 0,
        size_minus_header,
        magic2: MAGIC2,
        sample_rate_id: sample_rate.wire_id(),
        samples_plus_scaled_rate,
        magic3: MAGIC3,
    };

    let mut out = Vec::with_capacity(HEADER_SIZE + 8 + contents.len());
    header.write(&mut out);
    out.write_u32::<LittleEndian>(CONTENTS_TAG)?;
    out.write_u32::<LittleEndian>(size_minus_header)?;
    out.extend_from_slice(&contents);

    let checksum = crc32(&out[CHECKSUMMED_FROM..]);
    out[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());

    Ok(out)
}

fn encode_peaks(peaks: &[FrequencyPeak]) -> SignatureResult<Vec<u8>> {
    let mut out = Vec::with_capacity(peaks.len() * 5);
    let mut fft_pass_number = 0u32;

    for peak in peaks {
        let delta = peak.fft_pass_number.checked_sub(fft_pass_number).ok_or_else(|| {
            SignatureError::MalformedPayload(format!(
                "peak at pass {} follows pass {}",
                peak.fft_pass_number, fft_pass_number
            ))
        })?;

        if delta >= ABSOLUTE_PASS_MARKER as u32 {
            out.write_u8(ABSOLUTE_PASS_MARKER)?;
            out.write_u32::<LittleEndian>(peak.fft_pass_number)?;
            fft_pass_number = peak.fft_pass_number;
        }

        out.write_u8((peak.fft_pass_number - fft_pass_number) as u8)?;
        out.write_u16::<LittleEndian>(peak.peak_magnitude)?;
        out.write_u16::<LittleEndian>(peak.corrected_peak_frequency_bin)?;
        fft_pass_number = peak.fft_pass_number;
    }

    Ok(out)
}

/// Parse a binary signature, validating header, checksum and sample rate.
pub fn decode(bytes: &[u8]) -> SignatureResult<Signature> {
    let header = RawHeader::read(bytes)?;

    if header.magic1 != MAGIC1 || header.magic2 != MAGIC2 {
        return Err(SignatureError::InvalidHeader(format!(
            "bad magic {:#010x}/{:#010x}",
            header.magic1, header.magic2
        )));
    }
    if header.size_minus_header as usize != bytes.len() - HEADER_SIZE {
        return Err(SignatureError::InvalidHeader(format!(
            "size field says {} bytes after header, buffer has {}",
            header.size_minus_header,
            bytes.len() - HEADER_SIZE
        )));
    }

    let computed = crc32(&bytes[CHECKSUMMED_FROM..]);
    if computed != header.crc32 {
        return Err(SignatureError::ChecksumMismatch {
            stored: header.crc32,
            computed,
        });
    }

    let sample_rate = SampleRate::from_wire_id(header.sample_rate_id)?;
    if header.magic3 != MAGIC3 {
        log::debug!("unexpected trailing header magic {:#010x}", header.magic3);
    }

    let number_samples = header
        .samples_plus_scaled_rate
        .checked_sub(sample_rate.sample_count_offset())
        .ok_or_else(|| {
            SignatureError::InvalidHeader(format!(
                "sample field {} is below the rate offset {}",
                header.samples_plus_scaled_rate,
                sample_rate.sample_count_offset()
            ))
        })?;

    let mut signature = Signature::with_samples(sample_rate, number_samples);

    let mut cursor = Cursor::new(&bytes[HEADER_SIZE..]);
    for _ in 0..2 {
        cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| truncated("contents header"))?;
    }

    while (cursor.position() as usize) < cursor.get_ref().len() {
        let tag = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| truncated("band tag"))?;
        let len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| truncated("band length"))? as usize;

        let band = tag
            .checked_sub(BAND_TAG_BASE)
            .and_then(FrequencyBand::from_index)
            .ok_or_else(|| SignatureError::MalformedPayload(format!("unknown band tag {:#010x}", tag)))?;

        let mut payload = vec![0u8; len];
        cursor
            .read_exact(&mut payload)
            .map_err(|_| truncated("band payload"))?;
        let padded = (cursor.position() as usize + padding_for(len)).min(cursor.get_ref().len());
        cursor.set_position(padded as u64);

        for peak in decode_peaks(&payload, sample_rate)? {
            signature.push_peak(band, peak);
        }
    }

    Ok(signature)
}

fn decode_peaks(payload: &[u8], sample_rate: SampleRate) -> SignatureResult<Vec<FrequencyPeak>> {
    let mut peaks = Vec::with_capacity(payload.len() / 5);
    let mut cursor = Cursor::new(payload);
    let mut fft_pass_number = 0u32;

    while (cursor.position() as usize) < payload.len() {
        let offset = cursor.read_u8().map_err(|_| truncated("peak offset"))?;
        if offset == ABSOLUTE_PASS_MARKER {
            fft_pass_number = cursor
                .read_u32::<LittleEndian>()
                .map_err(|_| truncated("absolute pass number"))?;
            continue;
        }

        fft_pass_number = fft_pass_number.checked_add(offset as u32).ok_or_else(|| {
            SignatureError::MalformedPayload("pass number overflow".to_string())
        })?;
        let peak_magnitude = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| truncated("peak magnitude"))?;
        let corrected_peak_frequency_bin = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| truncated("peak frequency bin"))?;

        peaks.push(FrequencyPeak {
            fft_pass_number,
            peak_magnitude,
            corrected_peak_frequency_bin,
            sample_rate,
        });
    }

    Ok(peaks)
}

/// Encode as a `data:` URI carrying base64 of the binary form.
pub fn encode_to_uri(signature: &Signature) -> SignatureResult<String> {
    let bytes = encode(signature)?;
    Ok(format!(
        "{}{}",
        URI_PREFIX,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}

pub fn decode_from_uri(uri: &str) -> SignatureResult<Signature> {
    let body = uri
        .trim()
        .strip_prefix(URI_PREFIX)
        .ok_or_else(|| SignatureError::InvalidUri(format!("missing prefix {}", URI_PREFIX)))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| SignatureError::InvalidUri(e.to_string()))?;
    decode(&bytes)
}

fn padding_for(len: usize) -> usize {
    (4 - len % 4) % 4
}

fn truncated(what: &str) -> SignatureError {
    SignatureError::MalformedPayload(format!("truncated {}", what))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(fft_pass_number: u32, peak_magnitude: u16, bin: u16) -> FrequencyPeak {
        FrequencyPeak {
            fft_pass_number,
            peak_magnitude,
            corrected_peak_frequency_bin: bin,
            sample_rate: SampleRate::Hz16000,
        }
    }

    fn sample_signature() -> Signature {
        let mut sig = Signature::with_samples(SampleRate::Hz16000, 49_664);
        sig.push_peak(FrequencyBand::Hz3500To5500, peak(0, 9000, 40_000));
        sig.push_peak(FrequencyBand::Hz250To520, peak(2, 7012, 3_000));
        sig.push_peak(FrequencyBand::Hz250To520, peak(2, 7100, 3_100));
        sig.push_peak(FrequencyBand::Hz250To520, peak(254, 6500, 3_050));
        // Gap of exactly 255 forces an absolute marker.
        sig.push_peak(FrequencyBand::Hz250To520, peak(509, 6400, 2_900));
        sig.push_peak(FrequencyBand::Hz520To1450, peak(300, 8000, 9_000));
        sig.push_peak(FrequencyBand::Hz520To1450, peak(1_000_000, 8100, 9_100));
        sig
    }

    #[test]
    fn round_trip_preserves_everything() {
        let sig = sample_signature();
        let bytes = encode(&sig).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn round_trip_every_sample_rate() {
        for hz in [8000, 11025, 16000, 32000, 44100, 48000] {
            let rate = SampleRate::from_hz(hz).unwrap();
            let mut sig = Signature::with_samples(rate, 12_345);
            sig.push_peak(
                FrequencyBand::Hz1450To3500,
                FrequencyPeak {
                    fft_pass_number: 7,
                    peak_magnitude: 1,
                    corrected_peak_frequency_bin: 2,
                    sample_rate: rate,
                },
            );
            let back = decode(&encode(&sig).unwrap()).unwrap();
            assert_eq!(back.sample_rate(), rate);
            assert_eq!(back.number_samples(), 12_345);
            assert_eq!(back, sig);
        }
    }

    #[test]
    fn empty_signature_layout() {
        let sig = Signature::with_samples(SampleRate::Hz16000, 64_000);
        let bytes = encode(&sig).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 8);
        assert_eq!(&bytes[0..4], &MAGIC1.to_le_bytes());
        assert_eq!(&bytes[8..12], &8u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &MAGIC2.to_le_bytes());
        assert_eq!(&bytes[28..32], &(3u32 << 27).to_le_bytes());
        assert_eq!(&bytes[40..44], &(64_000u32 + 3_840).to_le_bytes());
        assert_eq!(&bytes[44..48], &0x007C_0000u32.to_le_bytes());
        assert_eq!(&bytes[48..52], &CONTENTS_TAG.to_le_bytes());
        assert_eq!(&bytes[52..56], &8u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &crc32(&bytes[8..]).to_le_bytes());

        let back = decode(&bytes).unwrap();
        assert_eq!(back.peak_count(), 0);
        assert_eq!(back.number_samples(), 64_000);
    }

    #[test]
    fn band_payload_is_padded() {
        let mut sig = Signature::new(SampleRate::Hz16000);
        sig.push_peak(FrequencyBand::Hz520To1450, peak(1, 2, 3));
        let bytes = encode(&sig).unwrap();
        // tag + len + 5 bytes of peak + 3 bytes of padding
        assert_eq!(bytes.len(), HEADER_SIZE + 8 + 8 + 8);
        assert_eq!(&bytes[56..60], &(BAND_TAG_BASE + 1).to_le_bytes());
        assert_eq!(&bytes[60..64], &5u32.to_le_bytes());
        assert_eq!(&bytes[64..69], &[1, 2, 0, 3, 0]);
        assert_eq!(&bytes[69..72], &[0, 0, 0]);
    }

    #[test]
    fn large_gap_uses_absolute_marker() {
        let payload = encode_peaks(&[peak(10, 1, 1), peak(400, 2, 2)]).unwrap();
        assert_eq!(payload[0], 10);
        assert_eq!(payload[5], ABSOLUTE_PASS_MARKER);
        assert_eq!(&payload[6..10], &400u32.to_le_bytes());
        assert_eq!(payload[10], 0);
        assert_eq!(payload.len(), 15);
    }

    #[test]
    fn out_of_order_peaks_are_rejected() {
        let mut sig = Signature::new(SampleRate::Hz16000);
        sig.push_peak(FrequencyBand::Hz520To1450, peak(10, 1, 1));
        sig.push_peak(FrequencyBand::Hz520To1450, peak(9, 1, 1));
        assert!(matches!(encode(&sig), Err(SignatureError::MalformedPayload(_))));
    }

    #[test]
    fn any_flipped_bit_fails_checksum() {
        let bytes = encode(&sample_signature()).unwrap();
        // Size and magic2 are covered by the checksum but validated before it.
        for index in (CHECKSUMMED_FROM..bytes.len()).filter(|i| !(8..16).contains(i)) {
            for bit in 0..8 {
                let mut corrupted = bytes.clone();
                corrupted[index] ^= 1 << bit;
                assert!(
                    matches!(decode(&corrupted), Err(SignatureError::ChecksumMismatch { .. })),
                    "byte {} bit {} was not detected",
                    index,
                    bit
                );
            }
        }
    }

    #[test]
    fn bad_magic_is_rejected_before_checksum() {
        let bytes = encode(&sample_signature()).unwrap();

        let mut bad1 = bytes.clone();
        bad1[0] ^= 0x01;
        assert!(matches!(decode(&bad1), Err(SignatureError::InvalidHeader(_))));

        // Magic2 sits inside the checksummed range, header check must still win.
        let mut bad2 = bytes.clone();
        bad2[13] ^= 0x40;
        assert!(matches!(decode(&bad2), Err(SignatureError::InvalidHeader(_))));
    }

    #[test]
    fn short_or_resized_buffers_are_rejected() {
        assert!(matches!(decode(&[0u8; 47]), Err(SignatureError::InvalidHeader(_))));

        let mut bytes = encode(&sample_signature()).unwrap();
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(SignatureError::InvalidHeader(_))));
    }

    #[test]
    fn unknown_sample_rate_id() {
        let mut bytes = encode(&Signature::new(SampleRate::Hz16000)).unwrap();
        bytes[28..32].copy_from_slice(&(9u32 << 27).to_le_bytes());
        let checksum = crc32(&bytes[8..]);
        bytes[4..8].copy_from_slice(&checksum.to_le_bytes());
        assert!(matches!(decode(&bytes), Err(SignatureError::UnsupportedSampleRate(_))));
    }

    #[test]
    fn unknown_band_tag_is_malformed() {
        let mut sig = Signature::new(SampleRate::Hz16000);
        sig.push_peak(FrequencyBand::Hz250To520, peak(1, 2, 3));
        let mut bytes = encode(&sig).unwrap();
        bytes[56..60].copy_from_slice(&(BAND_TAG_BASE + 7).to_le_bytes());
        let checksum = crc32(&bytes[8..]);
        bytes[4..8].copy_from_slice(&checksum.to_le_bytes());
        assert!(matches!(decode(&bytes), Err(SignatureError::MalformedPayload(_))));
    }

    #[test]
    fn uri_round_trip() {
        let sig = sample_signature();
        let uri = encode_to_uri(&sig).unwrap();
        assert!(uri.starts_with(URI_PREFIX));
        assert_eq!(decode_from_uri(&uri).unwrap(), sig);
    }

    #[test]
    fn uri_without_prefix_is_rejected() {
        let uri = encode_to_uri(&sample_signature()).unwrap();
        let body = &uri[URI_PREFIX.len()..];
        assert!(matches!(decode_from_uri(body), Err(SignatureError::InvalidUri(_))));
        assert!(matches!(
            decode_from_uri("data:audio/vnd.shazam.sig;base64,!!!"),
            Err(SignatureError::InvalidUri(_))
        ));
    }
}
