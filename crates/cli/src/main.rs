mod cli;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipforge_core::{
    config::load_config_from_env, install::DownloadEvent, install_managed, load_config,
    validate_config, Config, DownloadState, FfmpegTranscoder, HttpSource, StreamType, Tool,
    ToolResolver, TranscodeCommand, TranscodeJob, Transcoder,
};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?
        }
        None => load_config_from_env().context("Failed to load config from environment")?,
    };
    validate_config(&config).context("Configuration validation failed")?;

    let resolver = Arc::new(ToolResolver::new(config.tools.clone()));

    match cli.command {
        Commands::Resolve { tool } => {
            let tools = match tool {
                Some(tool) => vec![tool],
                None => Tool::ALL.to_vec(),
            };
            for tool in tools {
                match resolver.resolve(tool).await {
                    Ok(record) => println!(
                        "{:<8} {:<12} {:<8} {}",
                        tool,
                        record.version,
                        record.source,
                        record.path.display()
                    ),
                    Err(e) => println!("{:<8} unavailable: {}", tool, e),
                }
            }
        }
        Commands::Versions { tool } => {
            for version in resolver.list_managed_versions(tool).await? {
                println!("{}", version);
            }
        }
        Commands::Install {
            tool,
            version,
            url,
            sha256,
        } => install(&config, resolver, tool, &version, url, sha256).await?,
        Commands::Probe { file, json } => {
            let transcoder = FfmpegTranscoder::new(resolver, config.transcoder.clone())
                .with_runner_config(config.runner.clone());
            let info = transcoder
                .probe(&file)
                .await
                .with_context(|| format!("Failed to probe {:?}", file))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Format:   {}", info.format);
                println!("Duration: {:.2}s", info.duration_secs);
                println!("Size:     {} bytes", info.size_bytes);
                if let Some(codec) = &info.video_codec {
                    println!(
                        "Video:    {} {}x{}",
                        codec,
                        info.video_width.unwrap_or(0),
                        info.video_height.unwrap_or(0)
                    );
                }
                if let Some(codec) = &info.audio_codec {
                    println!(
                        "Audio:    {} {} ch",
                        codec,
                        info.audio_channels.unwrap_or(0)
                    );
                }
            }
        }
        Commands::Transcode {
            input,
            output,
            video_codec,
            audio_codec,
            video_bitrate,
            audio_bitrate,
            preset,
            no_video,
            no_audio,
            overwrite,
        } => {
            if input.is_empty() {
                bail!("At least one --input is required");
            }

            let mut command = TranscodeCommand::new();
            if overwrite {
                command = command.overwrite();
            }
            for path in input {
                command = command.input(path);
            }
            if let Some(codec) = video_codec {
                command = command.codec(StreamType::Video, codec);
            }
            if let Some(codec) = audio_codec {
                command = command.codec(StreamType::Audio, codec);
            }
            if let Some(rate) = video_bitrate {
                command = command.bitrate(StreamType::Video, rate);
            }
            if let Some(rate) = audio_bitrate {
                command = command.bitrate(StreamType::Audio, rate);
            }
            if let Some(tier) = preset {
                command = command.preset(tier);
            }
            if no_video {
                command = command.skip(StreamType::Video);
            }
            if no_audio {
                command = command.skip(StreamType::Audio);
            }
            command = command.output(output);

            transcode(&config, resolver, command).await?;
        }
        Commands::Validate => {
            println!("Configuration is valid");
        }
    }

    Ok(())
}

async fn install(
    config: &Config,
    resolver: Arc<ToolResolver>,
    tool: Tool,
    version: &str,
    url: String,
    sha256: Option<String>,
) -> Result<()> {
    let mut download = config.download.clone();
    if let Some(hash) = sha256 {
        download = download.with_sha256(hash);
    }
    let source = HttpSource::new(url, Duration::from_secs(download.timeout_secs))?;

    let handle = install_managed(resolver, tool, version, Arc::new(source), download).await?;
    let mut events = handle.subscribe();

    // Ctrl-C cancels the download and leaves no partial install.
    let canceller = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling download");
            canceller.cancel().await;
        }
    });

    let printer = tokio::spawn(async move {
        let mut last = -1i64;
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match event {
                DownloadEvent::Progress { phase, fraction } => {
                    let percent = (fraction * 100.0) as i64;
                    if percent != last {
                        last = percent;
                        eprint!("\r{:?}: {:>3}%", phase, percent);
                        let _ = std::io::stderr().flush();
                    }
                }
                DownloadEvent::StateChanged { to, .. } if to.is_terminal() => break,
                _ => {}
            }
        }
    });

    // The job may finish before the printer sees its last event.
    let status = handle.wait().await;
    printer.abort();
    eprintln!();

    match status.state {
        DownloadState::Done => {
            info!("Installed {} {}", tool, version);
            Ok(())
        }
        DownloadState::Canceled => bail!("Install of {} {} was cancelled", tool, version),
        _ => bail!(
            "Install of {} {} failed: {}",
            tool,
            version,
            status.error.unwrap_or_default()
        ),
    }
}

async fn transcode(
    config: &Config,
    resolver: Arc<ToolResolver>,
    command: TranscodeCommand,
) -> Result<()> {
    let transcoder = FfmpegTranscoder::new(resolver, config.transcoder.clone())
        .with_runner_config(config.runner.clone());
    transcoder.validate().await?;

    let token = CancellationToken::new();
    let job = TranscodeJob::new("cli", command).with_cancel_token(token.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping transcode");
            token.cancel();
        }
    });

    let (tx, mut rx) = mpsc::channel::<clipforge_core::transcoder::TranscodeProgress>(32);
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match update.percent() {
                Some(percent) => eprint!("\r{:>5.1}%", percent),
                None => eprint!("\r{:>8.1}s", update.sample.elapsed.as_secs_f64()),
            }
            let _ = std::io::stderr().flush();
        }
        eprintln!();
    });

    let result = transcoder.transcode_with_progress(job, tx).await;
    let _ = printer.await;
    let result = result.context("Transcode failed")?;
    if !result.finished {
        warn!("ffmpeg exited without reporting the end of its progress");
    }

    info!(
        "Wrote {} ({} bytes) in {} ms",
        result.output_path.display(),
        result.output_size_bytes,
        result.duration_ms
    );
    Ok(())
}
