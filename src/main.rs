mod audio;
mod cli;
mod commands;
mod config;
mod report;
mod signature;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command, OutputFormat, SignArgs};
use commands::SignSettings;
use signature::{GeneratorConfig, SampleRate};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Config values apply only where the CLI is still at its default
    if let Some(path) = config::find_config(cli.config.as_deref()) {
        if let Some(cfg) = config::load_config(&path) {
            log::info!("Loaded config from {}", path.display());
            if let Command::Sign(ref mut args) = cli.command {
                merge_config(args, &cfg);
            }
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    match cli.command {
        Command::Sign(args) => {
            let settings = sign_settings(&args)?;
            log::info!(
                "Signing {} file(s) at {}Hz, budget {:.1}s / {} peaks",
                args.inputs.len(),
                settings.generator.sample_rate.hz(),
                settings.generator.max_time_seconds,
                settings.generator.max_peaks
            );
            commands::run_sign(&args.inputs, &settings)
        }
        Command::Inspect(args) => commands::run_inspect(&args.signature),
    }
}

fn merge_config(args: &mut SignArgs, cfg: &config::Config) {
    if args.sample_rate == config::default_sample_rate() {
        args.sample_rate = cfg.generator.sample_rate;
    }
    if args.max_time == config::default_max_time_seconds() {
        args.max_time = cfg.generator.max_time_seconds;
    }
    if args.max_peaks == config::default_max_peaks() {
        args.max_peaks = cfg.generator.max_peaks;
    }
    if args.format == OutputFormat::Uri {
        args.format = cfg.output.format;
    }
}

fn sign_settings(args: &SignArgs) -> Result<SignSettings> {
    if !(args.max_time > 0.0) {
        anyhow::bail!("--max-time must be positive, got {}", args.max_time);
    }
    Ok(SignSettings {
        generator: GeneratorConfig {
            sample_rate: SampleRate::from_hz(args.sample_rate)?,
            max_time_seconds: args.max_time,
            max_peaks: args.max_peaks,
        },
        all: args.all,
        format: args.format,
        output_dir: args.output_dir.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> SignArgs {
        let mut argv = vec!["sigprint", "sign", "clip.wav"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Sign(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn config_fills_defaults_only() {
        let cfg: config::Config = toml::from_str(
            "[generator]\nmax_peaks = 80\nsample_rate = 8000\n[output]\nformat = \"hex\"\n",
        )
        .unwrap();

        let mut defaults = args(&[]);
        merge_config(&mut defaults, &cfg);
        assert_eq!(defaults.max_peaks, 80);
        assert_eq!(defaults.sample_rate, 8000);
        assert_eq!(defaults.format, OutputFormat::Hex);

        let mut explicit = args(&["--max-peaks", "10", "--format", "json"]);
        merge_config(&mut explicit, &cfg);
        assert_eq!(explicit.max_peaks, 10);
        assert_eq!(explicit.format, OutputFormat::Json);
    }

    #[test]
    fn unsupported_rate_is_rejected() {
        assert!(sign_settings(&args(&["--sample-rate", "22050"])).is_err());
        assert!(sign_settings(&args(&["--max-time", "0"])).is_err());
        let settings = sign_settings(&args(&["--all"])).unwrap();
        assert!(settings.all);
        assert_eq!(settings.generator.sample_rate, SampleRate::Hz16000);
    }
}
