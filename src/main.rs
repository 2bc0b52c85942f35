use clap::Parser;
use expectation_server::{
    ABANDONED_SESSION_GRACE, CliArgs, LoggingConfig, ServerConfig, build_runtime, init_logging,
    run_server, shutdown_runtime, shutdown_telemetry,
};

fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();
    let runtime = build_runtime()?;

    let (result, _guard) = runtime.block_on(async {
        let guard = init_logging(LoggingConfig::from_env())?;
        let config = ServerConfig::from_args(cli)?;
        config.validate()?;

        let result = run_server(config).await;
        shutdown_telemetry();
        anyhow::Ok((result, guard))
    })?;

    // sessions still blocked after a forced drain must not keep the process alive
    shutdown_runtime(runtime, ABANDONED_SESSION_GRACE);
    result
}
