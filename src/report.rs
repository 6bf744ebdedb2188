use serde::Serialize;

use crate::signature::{FrequencyBand, FrequencyPeak, SampleRate, Signature};

/// JSON view of a signature with the derived peak values filled in.
#[derive(Debug, Serialize)]
pub struct SignatureReport {
    pub sample_rate_hz: SampleRate,
    pub number_samples: u32,
    pub duration_seconds: f32,
    pub peak_count: usize,
    pub bands: Vec<BandReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BandReport {
    pub band: FrequencyBand,
    pub peaks: Vec<PeakReport>,
}

#[derive(Debug, Serialize)]
pub struct PeakReport {
    pub fft_pass_number: u32,
    pub peak_magnitude: u16,
    pub corrected_peak_frequency_bin: u16,
    pub frequency_hz: f32,
    pub seconds: f32,
    pub amplitude_pcm: f32,
}

impl From<&FrequencyPeak> for PeakReport {
    fn from(peak: &FrequencyPeak) -> Self {
        Self {
            fft_pass_number: peak.fft_pass_number,
            peak_magnitude: peak.peak_magnitude,
            corrected_peak_frequency_bin: peak.corrected_peak_frequency_bin,
            frequency_hz: peak.frequency_hz(),
            seconds: peak.seconds(),
            amplitude_pcm: peak.amplitude_pcm(),
        }
    }
}

impl SignatureReport {
    pub fn new(signature: &Signature, uri: Option<String>) -> Self {
        let bands = signature
            .peaks_by_band()
            .iter()
            .map(|(&band, peaks)| BandReport {
                band,
                peaks: peaks.iter().map(PeakReport::from).collect(),
            })
            .collect();

        Self {
            sample_rate_hz: signature.sample_rate(),
            number_samples: signature.number_samples(),
            duration_seconds: signature.duration_seconds(),
            peak_count: signature.peak_count(),
            bands,
            uri,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_derived_values() {
        let mut signature = Signature::with_samples(SampleRate::Hz16000, 32_000);
        signature.push_peak(
            FrequencyBand::Hz520To1450,
            FrequencyPeak {
                fft_pass_number: 250,
                peak_magnitude: 6144,
                corrected_peak_frequency_bin: 8192,
                sample_rate: SampleRate::Hz16000,
            },
        );

        let json = serde_json::to_value(SignatureReport::new(&signature, None)).unwrap();
        assert_eq!(json["sample_rate_hz"], 16000);
        assert_eq!(json["number_samples"], 32000);
        assert_eq!(json["peak_count"], 1);
        assert!(json.get("uri").is_none());

        let band = &json["bands"][0];
        assert_eq!(band["band"], "520-1450");
        assert_eq!(band["peaks"][0]["frequency_hz"], 1000.0);
        assert_eq!(band["peaks"][0]["seconds"], 2.0);
    }
}
