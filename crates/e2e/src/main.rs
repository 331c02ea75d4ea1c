use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use plusminus_e2e::config::DEFAULT_CONFIG_FILE;
use plusminus_e2e::{RunResult, SmokeConfig, SmokeRunner};

/// Headless-browser smoke test for the PlusMinus page
#[derive(Parser, Debug)]
#[command(name = "plusminus-smoke")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Repository root holding the page
    #[arg(long, env = "PLUSMINUS_ROOT", default_value = ".")]
    root: PathBuf,

    /// YAML config file (default: <root>/smoke.yaml, if present)
    #[arg(long, env = "PLUSMINUS_SMOKE_CONFIG")]
    config: Option<PathBuf>,

    /// Chromium binary
    #[arg(long, env = "CHROME_PATH")]
    browser: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| args.root.join(DEFAULT_CONFIG_FILE));
    let mut config = match SmokeConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("SMOKE TEST FAILED\n - {}: {}", config_path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(browser) = args.browser {
        config.browser.binary = Some(browser);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("SMOKE TEST FAILED\n - cannot start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runner = SmokeRunner::new(args.root, config);
    let result = runtime.block_on(async {
        tokio::select! {
            result = runner.run() => result,
            _ = tokio::signal::ctrl_c() => {
                // Dropping the run future releases the browser and server.
                error!("Interrupted");
                let mut result = RunResult::default();
                result.push("Interrupted");
                result
            }
        }
    });

    if result.is_success() {
        info!("All checks passed");
        println!("{}", result.report());
        ExitCode::SUCCESS
    } else {
        eprintln!("{}", result.report());
        ExitCode::FAILURE
    }
}
