use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::audio;
use crate::cli::OutputFormat;
use crate::report::SignatureReport;
use crate::signature::codec::{self, URI_PREFIX};
use crate::signature::{GeneratorConfig, Signature, SignatureGenerator};

/// Seconds decoded past the time budget when only the first signature is wanted.
const DECODE_MARGIN_SECONDS: f32 = 1.0;

pub struct SignSettings {
    pub generator: GeneratorConfig,
    pub all: bool,
    pub format: OutputFormat,
    pub output_dir: Option<PathBuf>,
}

pub struct FileSignatures {
    pub path: PathBuf,
    pub signatures: Vec<Signature>,
}

pub fn run_sign(inputs: &[PathBuf], settings: &SignSettings) -> Result<()> {
    if let Some(ref dir) = settings.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    let results: Vec<Result<FileSignatures>> = inputs
        .par_iter()
        .map(|path| {
            let result = sign_file(path, settings);
            pb.inc(1);
            result
        })
        .collect();

    pb.finish_and_clear();

    for result in results {
        let file = result?;
        if file.signatures.is_empty() {
            log::warn!("{}: too short to sign", file.path.display());
            continue;
        }
        for (index, signature) in file.signatures.iter().enumerate() {
            match settings.output_dir {
                Some(ref dir) => {
                    let out = write_signature_file(dir, &file.path, index, signature)?;
                    log::info!("Wrote {}", out.display());
                }
                None => println!("{}", render(signature, settings.format)?),
            }
        }
    }

    Ok(())
}

pub fn sign_file(path: &Path, settings: &SignSettings) -> Result<FileSignatures> {
    let limit = (!settings.all)
        .then(|| settings.generator.max_time_seconds + DECODE_MARGIN_SECONDS);
    let audio = audio::decode::decode_audio(path, limit)?;
    let pcm = audio::pcm::to_pcm16(
        &audio.samples,
        audio.sample_rate,
        settings.generator.sample_rate.hz(),
    )?;

    let signatures = sign_pcm(&pcm, &settings.generator, settings.all)
        .with_context(|| format!("Failed to sign {}", path.display()))?;
    log::info!("{}: {} signature(s)", path.display(), signatures.len());

    Ok(FileSignatures {
        path: path.to_path_buf(),
        signatures,
    })
}

/// Run PCM through a fresh generator, collecting the first or every signature.
pub fn sign_pcm(pcm: &[i16], config: &GeneratorConfig, all: bool) -> Result<Vec<Signature>> {
    let mut generator = SignatureGenerator::new(config.clone());
    generator.feed_input(pcm);

    let mut signatures = Vec::new();
    while let Some(signature) = generator.get_next_signature()? {
        signatures.push(signature);
        if !all {
            break;
        }
    }
    Ok(signatures)
}

pub fn render(signature: &Signature, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Uri => codec::encode_to_uri(signature)?,
        OutputFormat::Hex => codec::encode(signature)?
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect(),
        OutputFormat::Json => {
            let uri = codec::encode_to_uri(signature)?;
            serde_json::to_string_pretty(&SignatureReport::new(signature, Some(uri)))?
        }
    })
}

fn write_signature_file(dir: &Path, input: &Path, index: usize, signature: &Signature) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("signature");
    let path = dir.join(format!("{}.{}.sig", stem, index));
    std::fs::write(&path, codec::encode(signature)?)
        .with_context(|| format!("Failed to write signature: {}", path.display()))?;
    Ok(path)
}

pub fn run_inspect(input: &str) -> Result<()> {
    let signature = read_signature(input)?;
    let report = SignatureReport::new(&signature, None);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Accepts a data URI directly, or a path to a file holding one or the raw bytes.
pub fn read_signature(input: &str) -> Result<Signature> {
    if input.trim_start().starts_with(URI_PREFIX) {
        return Ok(codec::decode_from_uri(input)?);
    }

    let path = Path::new(input);
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read signature file: {}", path.display()))?;

    let signature = match std::str::from_utf8(&bytes) {
        Ok(text) if text.trim_start().starts_with(URI_PREFIX) => codec::decode_from_uri(text),
        _ => codec::decode(&bytes),
    }
    .with_context(|| format!("Failed to decode signature: {}", path.display()))?;

    Ok(signature)
}
