use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipscribe::engine::{self, ProgressCallback};
use clipscribe::output::ConsoleReporter;
use clipscribe::transcode::transcode;
use clipscribe::utils::{self, format_duration, format_file_size};
use clipscribe::{Cli, Commands, Config, ConversionPipeline, HttpTransport, PipelineListener, SelectedMedia};

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose { "clipscribe=debug" } else { "clipscribe=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = Config::load().await?;
    engine::configure_global(config.engine_resources());

    match cli.command {
        Commands::Run { file, prompt, api_url } => {
            let config = config.with_api_url(api_url)?;
            let media = SelectedMedia::from_path(&file).await?;

            let reporter = Arc::new(ConsoleReporter::new(cli.quiet));
            let transport = HttpTransport::new(&config.api.base_url);
            let mut pipeline =
                ConversionPipeline::new(engine::global_loader(), transport, reporter.clone());

            tracing::info!(run_id = %pipeline.run_id(), "Processing {}", file.display());

            let started = std::time::Instant::now();
            pipeline.select_file(media)?;

            match pipeline.submit(prompt).await {
                Ok(Some(video_id)) => {
                    println!(
                        "{} {} ({})",
                        style("Uploaded video:").green().bold(),
                        video_id,
                        format_duration(started.elapsed().as_secs_f64())
                    );
                }
                Ok(None) => anyhow::bail!("No video selected"),
                Err(e) => {
                    reporter.abandon(format!("Failed while {}", pipeline.stage()));
                    return Err(e).context("Pipeline failed");
                }
            }
        }
        Commands::Transcode { file, output } => {
            let media = SelectedMedia::from_path(&file).await?;
            let handle = engine::acquire_engine()
                .await
                .context("Failed to load media engine")?;

            let reporter = Arc::new(ConsoleReporter::new(cli.quiet));
            reporter.on_stage(clipscribe::PipelineStage::Converting);
            let progress_reporter = Arc::clone(&reporter);
            let on_progress: ProgressCallback =
                Arc::new(move |fraction| progress_reporter.on_progress(fraction));

            let audio = transcode(&handle, &media, on_progress)
                .await
                .context("Failed to convert audio")?;

            fs_err::write(&output, audio.bytes())?;
            reporter.abandon(format!("Converted {}", file.display()));
            println!(
                "Audio saved to: {} ({})",
                output.display(),
                format_file_size(audio.len() as u64)
            );
        }
        Commands::Config { show, init } => {
            if init {
                let path = config.save().await?;
                println!("Configuration written to: {}", path.display());
            }
            if show || !init {
                config.display();
            }
        }
        Commands::Check => {
            let missing = utils::check_dependencies(&config.engine_resources()).await;
            if missing.is_empty() {
                println!("{}", style("Media engine is available").green());
            } else {
                eprintln!("Missing engine components:");
                for dep in &missing {
                    eprintln!("   • {}", dep);
                }
                anyhow::bail!("{} engine component(s) unavailable", missing.len());
            }
        }
    }

    Ok(())
}
