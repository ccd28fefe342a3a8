use clap::Parser;
use keiro::cli::{run_cli, Cli};
use keiro::config::KeiroConfig;
use keiro::logging::init_logging_with_config;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = KeiroConfig::load(cli.config.as_deref())?;

    let _logging = init_logging_with_config(&config.logging)?;
    may::config().set_stack_size(config.pool.stack_size);

    run_cli(cli, config)
}
