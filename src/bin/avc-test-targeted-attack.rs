use clap::Parser;
use submission_validator::{
    cli::TargetedAttackCli,
    configuration::ValidatorConfig,
    forwarder::{forward, ATTACK_COMMAND},
    logger::init_logger,
};
use tracing::Level;

fn main() -> anyhow::Result<()> {
    let cli = TargetedAttackCli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    if let Err(e) = init_logger(ValidatorConfig::from_env().log(), level) {
        eprintln!("could not initialize logs: {e:#}");
    }

    let status = forward(ATTACK_COMMAND, &cli.submission)?;
    std::process::exit(status.code().unwrap_or(1));
}
