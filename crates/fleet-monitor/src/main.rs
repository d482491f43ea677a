use clap::Parser;
use fleet_monitor::Cli;

fn main() {
    let cli = Cli::parse();
    match cli_common::run_cli_main(&cli.log, || cli.run()) {}
}
