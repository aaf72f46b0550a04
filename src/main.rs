use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use webbundle::cli::{Cli, Commands, build_command, serve_command};
use webbundle::error::Result;
use webbundle::logging;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Cli::parse();

    let log_file = match logging::create_log_file(args.log_dir.as_deref()) {
        Ok((file, path)) => {
            eprintln!("Log file created: {}", path.display());
            Some(file)
        }
        Err(e) => {
            eprintln!("Log file disabled: {e}");
            None
        }
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_level(true)
                .with_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                ),
        )
        .with(log_file.map(|file| {
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_level(true)
                .with_filter(EnvFilter::new("debug"))
        }))
        .init();

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> Result<()> {
    match args.cmd {
        Commands::Build {
            config,
            mode,
            out_dir,
            watch,
            no_watch,
            report,
        } => {
            build_command(config, mode, out_dir, watch, no_watch, report).await?;
        }
        Commands::Serve {
            config,
            mode,
            out_dir,
            port,
            no_watch,
        } => {
            serve_command(config, mode, out_dir, port, no_watch).await?;
        }
    }
    Ok(())
}
