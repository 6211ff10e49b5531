use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use audio_relay::cli::{Cli, Commands};
use audio_relay::config::Config;
use audio_relay::{server, utils};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_cli(&cli)?;
    init_tracing(&config);

    match cli.command() {
        Commands::Serve => {
            config.display();
            server::run(config).await?;
        }
        Commands::Setup => setup(&config).await?,
    }

    Ok(())
}

/// RUST_LOG wins; otherwise info, or debug when debug is on.
/// Production deployments log JSON lines.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter().into());

    let (plain, structured) = if config.is_production() {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(structured)
        .init();
}

async fn setup(config: &Config) -> Result<()> {
    println!("{}", style("Audio Relay setup").bold());

    for dir in [&config.downloads.dir, &config.server.public_dir] {
        fs_err::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        println!("  {} {}", style("✓").green(), dir.display());
    }

    match Config::default_config_path() {
        Ok(path) if !path.exists() => {
            config.save(&path)?;
            println!("  {} wrote {}", style("✓").green(), path.display());
        }
        Ok(path) => println!("  {} using {}", style("•").dim(), path.display()),
        Err(e) => println!("  {} {}", style("!").yellow(), e),
    }

    println!();
    let mut missing = 0;
    for tool in utils::check_dependencies(&config.downloads.yt_dlp_path).await {
        if tool.available {
            println!("  {} {}", style("✓").green(), tool.name);
        } else {
            missing += 1;
            println!(
                "  {} {} ({})",
                style("✗").red(),
                style(tool.name).bold(),
                tool.purpose
            );
        }
    }

    if missing > 0 {
        println!();
        println!(
            "{}",
            style("Install the missing tools before serving downloads.").yellow()
        );
    } else {
        println!();
        println!("{}", style("Ready. Run `audio-relay serve`.").green());
    }

    Ok(())
}
