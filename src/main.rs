use clap::Parser;
use std::process::ExitCode;
use tracealign::cli::{resolve_config, Cli, OutputFormat};
use tracealign::error::AlignError;
use tracealign::{pipeline, render, report};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = Cli::parse();

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(err) => {
            // Subscriber is not up yet for configuration errors
            eprintln!("tracealign: {}", err);
            return ExitCode::from(2);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&args, &config) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{}", err);
            ExitCode::from(2)
        }
    }
}

fn run(args: &Cli, config: &tracealign::config::AlignConfig) -> Result<ExitCode, AlignError> {
    let output = pipeline::run(config)?;

    let rendered = match args.output {
        OutputFormat::Human => render::render_human(&output.report)?,
        OutputFormat::Json => render::render_json(&output.report)?,
    };
    println!("{}", rendered);

    if let Some(path) = &args.report_file {
        let json = render::render_json(&output.report)?;
        std::fs::write(path, json).map_err(|e| AlignError::io(path, e))?;
    }

    Ok(ExitCode::from(report::exit_code(&output.report) as u8))
}
