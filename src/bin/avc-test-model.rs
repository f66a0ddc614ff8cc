use clap::Parser;
use submission_validator::{cli::ModelTestCli, logger::init_logger, prelude::*};
use tracing::Level;

const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

fn main() {
    let cli = ModelTestCli::parse();

    let env_config = ValidatorConfig::from_env();
    let config = env_config
        .clone()
        .with_gpu(cli.submission.gpu)
        .with_no_cache(cli.submission.no_cache)
        .with_verbose(env_config.verbose() && !cli.quiet)
        .with_log(env_config.log() || cli.log);

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    if let Err(e) = init_logger(config.log(), level) {
        eprintln!("{RED}could not initialize logs: {e:#}{RESET}");
    }

    if let Err(e) = run(&cli, config) {
        eprintln!("{RED}Validation failed: {e:#}{RESET}");
        std::process::exit(e.exit_code());
    }
}

fn run(cli: &ModelTestCli, config: ValidatorConfig) -> ValidationResult<Accuracy> {
    let samples = SampleSet::load(&cli.samples)?;
    let validator = Validator::new(
        DockerCli::from_config(&config),
        HttpProbe::from_config(&config)?,
        HttpConnector::from_config(&config)?,
        config,
    );
    validator.validate(&cli.submission.directory, &samples)
}
