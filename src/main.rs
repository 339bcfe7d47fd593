mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cli::Cli;
use sectionist::audio::decode::{is_supported, SUPPORTED_FORMATS};
use sectionist::config::{self, Config};
use sectionist::{analyze_with_config, AnalysisConfig, AnalysisResult};

/// Per-file JSON envelope: `analysis` on success, `error` otherwise.
#[derive(Debug, Serialize)]
struct FileReport {
    success: bool,
    file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.formats {
        println!("{}", SUPPORTED_FORMATS.join(", "));
        return Ok(ExitCode::SUCCESS);
    }
    if cli.files.is_empty() {
        anyhow::bail!("At least one input audio file is required");
    }

    // Load config: explicit --config path, or auto-detect sectionist.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("sectionist.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("sectionist").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("sectionist").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });
    let file_config = match config_path {
        Some(ref path) => match config::load_config(path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };

    let pretty = file_config.output.pretty && !cli.compact;
    let analysis = merge_cli(&cli, file_config.analysis);
    analysis.validate().context("Invalid analysis settings")?;

    let pb = if cli.files.len() > 1 {
        let pb = ProgressBar::new(cli.files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files {msg}")
                .context("Invalid progress template")?
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut reports = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        if let Some(ref pb) = pb {
            pb.set_message(file_name(path));
        }
        reports.push(analyze_file(path, &analysis));
        if let Some(ref pb) = pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = pb {
        pb.finish_with_message("Analysis complete");
    }

    let json = if reports.len() == 1 {
        to_json(&reports[0], pretty)?
    } else {
        to_json(&reports, pretty)?
    };

    match cli.output {
        Some(ref out) => {
            std::fs::write(out, json + "\n")
                .with_context(|| format!("Failed to write {}", out.display()))?;
            log::info!("Wrote report to {}", out.display());
        }
        None => println!("{}", json),
    }

    let failures = reports.iter().filter(|r| !r.success).count();
    if failures > 0 {
        log::error!("{} of {} files failed", failures, reports.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Command-line flags win over config-file values.
fn merge_cli(cli: &Cli, mut analysis: AnalysisConfig) -> AnalysisConfig {
    if let Some(min_segment) = cli.min_segment {
        analysis.min_segment_length = min_segment;
    }
    if let Some(strategy) = cli.strategy {
        analysis.strategy = strategy;
    }
    if cli.no_post_process {
        analysis.post_process = false;
    }
    analysis
}

fn analyze_file(path: &Path, config: &AnalysisConfig) -> FileReport {
    let file_name = file_name(path);
    let outcome = if is_supported(path) {
        analyze_with_config(path, config).map_err(|err| err.to_string())
    } else {
        Err(format!(
            "Unsupported file format. Supported formats: {}",
            SUPPORTED_FORMATS.join(", ")
        ))
    };

    match outcome {
        Ok(analysis) => FileReport {
            success: true,
            file_name,
            analysis: Some(analysis),
            error: None,
        },
        Err(error) => {
            log::error!("{}: {}", path.display(), error);
            FileReport {
                success: false,
                file_name,
                analysis: None,
                error: Some(error),
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    json.context("Failed to serialize report")
}
