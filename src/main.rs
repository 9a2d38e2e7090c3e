use clap::Parser;
use rebalancer::cli::{install_interrupt_handler, run, Cli};
use rebalancer::domain::cancel::CancelToken;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel);
    run(cli, &cancel)
}
