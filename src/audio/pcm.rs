use anyhow::{Context, Result};

/// Resample mono f32 audio to `to_rate` with rubato and quantise to 16-bit PCM.
pub fn to_pcm16(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<i16>> {
    let resampled = if from_rate == to_rate || samples.is_empty() {
        samples.to_vec()
    } else {
        log::debug!("Resampling {}Hz -> {}Hz", from_rate, to_rate);
        resample(samples, from_rate, to_rate)?
    };

    Ok(resampled.iter().map(|&s| quantize(s)).collect())
}

/// Input frames handed to the resampler per call.
const CHUNK_FRAMES: usize = 1024;

fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        2.0, // max relative ratio
        params,
        CHUNK_FRAMES,
        1, // mono
    )
    .context("Failed to create resampler")?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(delay + expected + CHUNK_FRAMES);

    let mut chunks = samples.chunks_exact(CHUNK_FRAMES);
    for chunk in &mut chunks {
        let out = resampler
            .process(&[chunk][..], None)
            .context("Resampling failed")?;
        output.extend_from_slice(&out[0]);
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let out = resampler
            .process_partial(Some(&[tail][..]), None)
            .context("Resampling failed")?;
        output.extend_from_slice(&out[0]);
    }

    // Flush the filter delay so the end of the input comes through
    while output.len() < delay + expected {
        let out = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .context("Resampling flush failed")?;
        if out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&out[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}
