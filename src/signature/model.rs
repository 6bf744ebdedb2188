use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use super::error::{SignatureError, SignatureResult};

/// The sample rates the wire format can describe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleRate {
    Hz8000,
    Hz11025,
    Hz16000,
    Hz32000,
    Hz44100,
    Hz48000,
}

impl SampleRate {
    const ALL: [SampleRate; 6] = [
        SampleRate::Hz8000,
        SampleRate::Hz11025,
        SampleRate::Hz16000,
        SampleRate::Hz32000,
        SampleRate::Hz44100,
        SampleRate::Hz48000,
    ];

    pub fn hz(self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz11025 => 11025,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz32000 => 32000,
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
        }
    }

    pub fn from_hz(hz: u32) -> SignatureResult<Self> {
        Self::ALL
            .into_iter()
            .find(|rate| rate.hz() == hz)
            .ok_or(SignatureError::UnsupportedSampleRate(hz))
    }

    /// Header field value: the 1-based table index shifted into the top bits.
    pub fn wire_id(self) -> u32 {
        let index = match self {
            SampleRate::Hz8000 => 1,
            SampleRate::Hz11025 => 2,
            SampleRate::Hz16000 => 3,
            SampleRate::Hz32000 => 4,
            SampleRate::Hz44100 => 5,
            SampleRate::Hz48000 => 6,
        };
        index << 27
    }

    pub fn from_wire_id(id: u32) -> SignatureResult<Self> {
        Self::ALL
            .into_iter()
            .find(|rate| rate.wire_id() == id)
            .ok_or(SignatureError::UnsupportedSampleRate(id))
    }

    /// `floor(hz * 0.24)`, added to the sample count in the header.
    pub fn sample_count_offset(self) -> u32 {
        self.hz() * 6 / 25
    }
}

impl Serialize for SampleRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.hz())
    }
}

/// Frequency ranges peaks are bucketed into. Anything outside them is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrequencyBand {
    Hz250To520,
    Hz520To1450,
    Hz1450To3500,
    Hz3500To5500,
}

impl FrequencyBand {
    pub const ALL: [FrequencyBand; 4] = [
        FrequencyBand::Hz250To520,
        FrequencyBand::Hz520To1450,
        FrequencyBand::Hz1450To3500,
        FrequencyBand::Hz3500To5500,
    ];

    /// Position of the band in the wire tag sequence.
    pub fn index(self) -> u32 {
        match self {
            FrequencyBand::Hz250To520 => 0,
            FrequencyBand::Hz520To1450 => 1,
            FrequencyBand::Hz1450To3500 => 2,
            FrequencyBand::Hz3500To5500 => 3,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|band| band.index() == index)
    }

    /// Band of a peak at `hz`: (250, 520), [520, 1450), [1450, 3500), [3500, 5500].
    pub fn classify(hz: f32) -> Option<Self> {
        if hz <= 250.0 || hz > 5500.0 {
            None
        } else if hz < 520.0 {
            Some(FrequencyBand::Hz250To520)
        } else if hz < 1450.0 {
            Some(FrequencyBand::Hz520To1450)
        } else if hz < 3500.0 {
            Some(FrequencyBand::Hz1450To3500)
        } else {
            Some(FrequencyBand::Hz3500To5500)
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FrequencyBand::Hz250To520 => "250-520",
            FrequencyBand::Hz520To1450 => "520-1450",
            FrequencyBand::Hz1450To3500 => "1450-3500",
            FrequencyBand::Hz3500To5500 => "3500-5500",
        }
    }
}

impl Serialize for FrequencyBand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// One spectral peak as it travels on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrequencyPeak {
    /// Index of the FFT pass the peak was observed in.
    pub fft_pass_number: u32,
    /// Log-scaled magnitude code.
    pub peak_magnitude: u16,
    /// Bin index times 64, plus the sub-bin interpolation.
    pub corrected_peak_frequency_bin: u16,
    pub sample_rate: SampleRate,
}

impl FrequencyPeak {
    pub fn frequency_hz(&self) -> f32 {
        self.corrected_peak_frequency_bin as f32 * (self.sample_rate.hz() as f32 / 2.0 / 1024.0 / 64.0)
    }

    /// Approximate amplitude in 16-bit PCM units.
    pub fn amplitude_pcm(&self) -> f32 {
        ((((self.peak_magnitude as f32 - 6144.0) / 1477.3).exp() * (1 << 17) as f32 / 2.0).sqrt())
            / 1024.0
    }

    pub fn seconds(&self) -> f32 {
        self.fft_pass_number as f32 * 128.0 / self.sample_rate.hz() as f32
    }
}

/// Peaks collected from one stretch of audio, grouped by band.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    sample_rate: SampleRate,
    number_samples: u32,
    peaks_by_band: BTreeMap<FrequencyBand, Vec<FrequencyPeak>>,
}

impl Signature {
    pub fn new(sample_rate: SampleRate) -> Self {
        Self {
            sample_rate,
            number_samples: 0,
            peaks_by_band: BTreeMap::new(),
        }
    }

    pub fn with_samples(sample_rate: SampleRate, number_samples: u32) -> Self {
        Self {
            number_samples,
            ..Self::new(sample_rate)
        }
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    pub fn number_samples(&self) -> u32 {
        self.number_samples
    }

    pub fn add_samples(&mut self, count: u32) {
        self.number_samples += count;
    }

    /// Bands in ascending order, each with peaks in detection order.
    pub fn peaks_by_band(&self) -> &BTreeMap<FrequencyBand, Vec<FrequencyPeak>> {
        &self.peaks_by_band
    }

    pub fn push_peak(&mut self, band: FrequencyBand, peak: FrequencyPeak) {
        self.peaks_by_band.entry(band).or_default().push(peak);
    }

    pub fn peak_count(&self) -> usize {
        self.peaks_by_band.values().map(Vec::len).sum()
    }

    pub fn duration_seconds(&self) -> f32 {
        self.number_samples as f32 / self.sample_rate.hz() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(fft_pass_number: u32, bin: u16) -> FrequencyPeak {
        FrequencyPeak {
            fft_pass_number,
            peak_magnitude: 6144,
            corrected_peak_frequency_bin: bin,
            sample_rate: SampleRate::Hz16000,
        }
    }

    #[test]
    fn sample_rate_ids() {
        assert_eq!(SampleRate::Hz8000.wire_id(), 1 << 27);
        assert_eq!(SampleRate::Hz16000.wire_id(), 3 << 27);
        assert_eq!(SampleRate::Hz48000.wire_id(), 6 << 27);
        assert_eq!(SampleRate::from_wire_id(5 << 27).unwrap(), SampleRate::Hz44100);
        assert!(matches!(
            SampleRate::from_wire_id(7 << 27),
            Err(SignatureError::UnsupportedSampleRate(_))
        ));
        assert!(SampleRate::from_hz(22050).is_err());
    }

    #[test]
    fn sample_count_offsets_are_floored() {
        assert_eq!(SampleRate::Hz8000.sample_count_offset(), 1920);
        assert_eq!(SampleRate::Hz11025.sample_count_offset(), 2646);
        assert_eq!(SampleRate::Hz16000.sample_count_offset(), 3840);
        assert_eq!(SampleRate::Hz44100.sample_count_offset(), 10584);
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(FrequencyBand::classify(249.9), None);
        assert_eq!(FrequencyBand::classify(250.0), None);
        assert_eq!(FrequencyBand::classify(250.5), Some(FrequencyBand::Hz250To520));
        assert_eq!(FrequencyBand::classify(520.0), Some(FrequencyBand::Hz520To1450));
        assert_eq!(FrequencyBand::classify(1450.0), Some(FrequencyBand::Hz1450To3500));
        assert_eq!(FrequencyBand::classify(3500.0), Some(FrequencyBand::Hz3500To5500));
        assert_eq!(FrequencyBand::classify(5500.0), Some(FrequencyBand::Hz3500To5500));
        assert_eq!(FrequencyBand::classify(5500.01), None);
    }

    #[test]
    fn band_indices_follow_ordering() {
        for (i, band) in FrequencyBand::ALL.iter().enumerate() {
            assert_eq!(band.index(), i as u32);
            assert_eq!(FrequencyBand::from_index(i as u32), Some(*band));
        }
        assert_eq!(FrequencyBand::from_index(4), None);
    }

    #[test]
    fn derived_peak_values() {
        // 1024 bins * 64 cover half the sample rate.
        let p = peak(125, 64 * 512);
        assert!((p.frequency_hz() - 4000.0).abs() < 1e-3);
        assert!((p.seconds() - 1.0).abs() < 1e-6);
        let expected = (((1u32 << 17) as f32) / 2.0).sqrt() / 1024.0;
        assert!((p.amplitude_pcm() - expected).abs() < 1e-4);
    }

    #[test]
    fn peaks_keep_insertion_order_per_band() {
        let mut sig = Signature::new(SampleRate::Hz16000);
        sig.push_peak(FrequencyBand::Hz520To1450, peak(3, 5000));
        sig.push_peak(FrequencyBand::Hz250To520, peak(4, 2000));
        sig.push_peak(FrequencyBand::Hz520To1450, peak(9, 5100));
        sig.add_samples(16000);

        assert_eq!(sig.peak_count(), 3);
        assert!((sig.duration_seconds() - 1.0).abs() < 1e-6);
        let bands: Vec<_> = sig.peaks_by_band().keys().copied().collect();
        assert_eq!(bands, vec![FrequencyBand::Hz250To520, FrequencyBand::Hz520To1450]);
        let passes: Vec<u32> = sig.peaks_by_band()[&FrequencyBand::Hz520To1450]
            .iter()
            .map(|p| p.fft_pass_number)
            .collect();
        assert_eq!(passes, vec![3, 9]);
    }
}
