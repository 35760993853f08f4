use clap::Parser;
use sealed_json::cli::Cli;
use sealed_json::commands;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let name = cli.command.name();

    if let Err(e) = commands::run(cli.command) {
        tracing::error!(error = %e, "{name} failed");
        eprintln!("sealedctl {name}: {e}");
        std::process::exit(1);
    }
}
