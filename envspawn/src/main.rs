use clap::Parser;
use envspawn::cli::Cli;
use envspawn::log::init_tracing;
use miette::Result;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level());

    let code = envspawn::run(&cli)?;
    std::process::exit(code);
}
