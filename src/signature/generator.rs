use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::error::{SignatureError, SignatureResult};
use super::model::{FrequencyBand, FrequencyPeak, SampleRate, Signature};
use super::ring_buffer::RingBuffer;

/// Samples consumed per FFT pass.
pub const STEP_SIZE: usize = 128;
const FFT_SIZE: usize = 2048;
const SPECTRUM_BINS: usize = FFT_SIZE / 2 + 1;
const HISTORY_FRAMES: usize = 256;

/// Spread frames needed before recognition can look back far enough.
const RECOGNITION_DELAY: usize = 46;
const RAW_FRAME_OFFSET: isize = -46;
const SPREAD_FRAME_OFFSET: isize = -49;

/// Earlier spread frames that absorb each new spread frame, in the order a
/// running max is carried through them.
const TIME_SPREAD_OFFSETS: [isize; 3] = [-1, -3, -6];

/// Bin offsets, within the spread frame, a peak must dominate.
const NEIGHBOR_BIN_OFFSETS: [isize; 7] = [-10, -7, -4, -3, 1, 4, 7];

/// Spread frames, relative to the ring position, a peak must dominate:
/// -53 and -45, then 165..=200 and 214..=249 in steps of 7.
const HISTORY_FRAME_OFFSETS: [isize; 14] = [
    -53, -45, 165, 172, 179, 186, 193, 200, 214, 221, 228, 235, 242, 249,
];

const FIRST_PEAK_BIN: usize = 10;
const LAST_PEAK_BIN: usize = 1014;

const MIN_PEAK_POWER: f32 = 1.0 / 64.0;
const MIN_BIN_POWER: f32 = 1e-10;
const POWER_SCALE: f32 = (1 << 17) as f32;

#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub sample_rate: SampleRate,
    /// Audio duration after which a signature is complete.
    pub max_time_seconds: f32,
    /// Peak count after which a signature is complete.
    pub max_peaks: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz16000,
            max_time_seconds: 3.1,
            max_peaks: 255,
        }
    }
}

/// Windowed power spectrum of the most recent `FFT_SIZE` samples.
struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    fn new() -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            fft,
            window: hann_window(FFT_SIZE),
            buffer: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            scratch,
        }
    }

    fn power_spectrum(&mut self, samples: &RingBuffer<i16>) -> Vec<f32> {
        for ((slot, &sample), &w) in self
            .buffer
            .iter_mut()
            .zip(samples.chronological())
            .zip(self.window.iter())
        {
            *slot = Complex::new(sample as f32 * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        self.buffer[..SPECTRUM_BINS]
            .iter()
            .map(|c| (c.norm_sqr() / POWER_SCALE).max(MIN_BIN_POWER))
            .collect()
    }
}

/// Hann window of `size` points, taken from a `size + 2` point window with
/// both zero endpoints removed.
fn hann_window(size: usize) -> Vec<f32> {
    let span = (size + 1) as f64;
    (1..=size)
        .map(|i| (0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / span).cos()) as f32)
        .collect()
}

/// Per-signature state: sample window, spectrum history and the peaks so far.
struct Pipeline {
    samples: RingBuffer<i16>,
    fft_outputs: RingBuffer<Vec<f32>>,
    spread_outputs: RingBuffer<Vec<f32>>,
    signature: Signature,
}

impl Pipeline {
    fn new(sample_rate: SampleRate) -> Self {
        Self {
            samples: RingBuffer::new(FFT_SIZE, 0),
            fft_outputs: RingBuffer::new(HISTORY_FRAMES, vec![0.0; SPECTRUM_BINS]),
            spread_outputs: RingBuffer::new(HISTORY_FRAMES, vec![0.0; SPECTRUM_BINS]),
            signature: Signature::new(sample_rate),
        }
    }

    fn process_step(&mut self, step: &[i16], analyzer: &mut SpectrumAnalyzer) -> SignatureResult<()> {
        for &sample in step {
            self.samples.append(sample);
        }
        let spectrum = analyzer.power_spectrum(&self.samples);
        self.fft_outputs.append(spectrum);

        self.spread_peaks();
        if self.spread_outputs.num_written() >= RECOGNITION_DELAY {
            self.recognize_peaks()?;
        }

        self.signature.add_samples(step.len() as u32);
        Ok(())
    }

    fn spread_peaks(&mut self) {
        let mut spread = self.fft_outputs.latest(1).clone();

        for bin in 0..SPECTRUM_BINS - 2 {
            spread[bin] = spread[bin].max(spread[bin + 1]).max(spread[bin + 2]);
        }

        let mut running = spread.clone();
        for &offset in &TIME_SPREAD_OFFSETS {
            let former = self.spread_outputs.slot_mut(offset);
            for (old, max_value) in former.iter_mut().zip(running.iter_mut()) {
                *max_value = max_value.max(*old);
                *old = *max_value;
            }
        }

        self.spread_outputs.append(spread);
    }

    fn recognize_peaks(&mut self) -> SignatureResult<()> {
        let raw = self.fft_outputs.slot(RAW_FRAME_OFFSET);
        let spread = self.spread_outputs.slot(SPREAD_FRAME_OFFSET);
        let fft_pass_number = (self.spread_outputs.num_written() - RECOGNITION_DELAY) as u32;
        let sample_rate = self.signature.sample_rate();

        for bin in FIRST_PEAK_BIN..=LAST_PEAK_BIN {
            let power = raw[bin];
            if power < MIN_PEAK_POWER || power < spread[bin - 1] {
                continue;
            }

            let max_neighbor = NEIGHBOR_BIN_OFFSETS
                .iter()
                .map(|&offset| spread[(bin as isize + offset) as usize])
                .fold(0.0f32, f32::max);
            if power <= max_neighbor {
                continue;
            }

            let max_history = HISTORY_FRAME_OFFSETS
                .iter()
                .map(|&offset| self.spread_outputs.slot(offset)[bin - 1])
                .fold(max_neighbor, f32::max);
            if power <= max_history {
                continue;
            }

            let (peak_magnitude, corrected_bin) =
                interpolate_peak(bin, raw[bin - 1], power, raw[bin + 1]).ok_or(
                    SignatureError::ArithmeticInvariantViolation { fft_pass_number, bin },
                )?;

            let peak = FrequencyPeak {
                fft_pass_number,
                peak_magnitude,
                corrected_peak_frequency_bin: corrected_bin,
                sample_rate,
            };
            let frequency_hz = peak.frequency_hz();
            let Some(band) = FrequencyBand::classify(frequency_hz) else {
                continue;
            };

            log::trace!(
                "peak at pass {}: {:.1} Hz, magnitude {}",
                fft_pass_number,
                frequency_hz,
                peak_magnitude
            );
            self.signature.push_peak(band, peak);
        }

        Ok(())
    }
}

/// Log-magnitude code of a power value.
fn magnitude_code(power: f32) -> f32 {
    power.max(MIN_PEAK_POWER).ln() * 1477.3 + 6144.0
}

/// Magnitude code and sub-bin corrected bin (in 1/64 bins) of a peak, from
/// parabolic interpolation over its neighbours. `None` when the curvature is
/// not positive.
fn interpolate_peak(bin: usize, before: f32, peak: f32, after: f32) -> Option<(u16, u16)> {
    let peak_magnitude = magnitude_code(peak);
    let before = magnitude_code(before);
    let after = magnitude_code(after);

    let variation1 = peak_magnitude * 2.0 - before - after;
    if variation1 <= 0.0 {
        return None;
    }
    let variation2 = (after - before) * 32.0 / variation1;
    let corrected_bin = bin as i32 * 64 + variation2 as i32;

    Some((peak_magnitude as u16, corrected_bin as u16))
}

/// Turns a stream of PCM samples into signatures.
///
/// Samples pushed with [`feed_input`](Self::feed_input) are queued. Each call
/// to [`get_next_signature`](Self::get_next_signature) drains them in steps
/// of [`STEP_SIZE`] until the signature hits its time or peak budget or the
/// queue runs dry, hands the signature over, and starts over with a fresh
/// pipeline.
pub struct SignatureGenerator {
    config: GeneratorConfig,
    pending: Vec<i16>,
    processed: usize,
    analyzer: SpectrumAnalyzer,
    pipeline: Pipeline,
}

impl SignatureGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let pipeline = Pipeline::new(config.sample_rate);
        Self {
            config,
            pending: Vec::new(),
            processed: 0,
            analyzer: SpectrumAnalyzer::new(),
            pipeline,
        }
    }

    pub fn feed_input(&mut self, samples: &[i16]) {
        self.pending.extend_from_slice(samples);
    }

    /// Samples queued but not yet consumed.
    pub fn pending_samples(&self) -> usize {
        self.pending.len() - self.processed
    }

    /// The next signature, or `None` when fewer than [`STEP_SIZE`] samples
    /// are queued. Every returned signature covers at least one step, even
    /// when the peak budget is zero. On error the partial signature is
    /// discarded.
    pub fn get_next_signature(&mut self) -> SignatureResult<Option<Signature>> {
        if self.pending_samples() < STEP_SIZE {
            return Ok(None);
        }

        // Budgets are checked after each step.
        loop {
            let start = self.processed;
            let step = &self.pending[start..start + STEP_SIZE];
            let result = self.pipeline.process_step(step, &mut self.analyzer);
            self.processed += STEP_SIZE;

            if let Err(err) = result {
                log::warn!("discarding partial signature: {}", err);
                self.reset();
                return Err(err);
            }
            if self.pending_samples() < STEP_SIZE || self.is_full() {
                break;
            }
        }

        let fresh = Pipeline::new(self.config.sample_rate);
        let signature = std::mem::replace(&mut self.pipeline, fresh).signature;
        self.compact();

        log::debug!(
            "signature complete: {} samples ({:.2}s), {} peaks, {} samples left",
            signature.number_samples(),
            signature.duration_seconds(),
            signature.peak_count(),
            self.pending_samples()
        );

        Ok(Some(signature))
    }

    fn is_full(&self) -> bool {
        let signature = &self.pipeline.signature;
        signature.duration_seconds() >= self.config.max_time_seconds
            || signature.peak_count() >= self.config.max_peaks
    }

    fn reset(&mut self) {
        self.pipeline = Pipeline::new(self.config.sample_rate);
        self.compact();
    }

    fn compact(&mut self) {
        self.pending.drain(..self.processed);
        self.processed = 0;
    }
}

impl Default for SignatureGenerator {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}
