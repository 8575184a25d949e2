use clap::Parser;
use std::path::PathBuf;

use webmend::config;
use webmend::runner::run_test;
use webmend::suite::run_suite;

/// webmend - self-healing replay runner for recorded browser tests
#[derive(Parser, Debug)]
#[command(
    name = "webmend",
    about = "Replay recorded browser tests, repairing broken selectors with a generative model",
    after_help = "ENVIRONMENT VARIABLES:\n\
        WEBMEND_GEMINI_API_KEY           API key for selector recovery (GEMINI_API_KEY also accepted)\n\
        WEBMEND_ORACLE_MODEL             Recovery model name (default: gemini-2.5-flash)\n\
        WEBMEND_ORACLE_ENDPOINT          Full recovery endpoint URL override\n\
        WEBMEND_ORACLE_TIMEOUT           Recovery request timeout in seconds (default: 60)\n\
        WEBMEND_ORACLE_CONNECT_TIMEOUT   Recovery connection timeout in seconds (default: 10)\n\
        WEBMEND_DOM_LIMIT                Max DOM characters sent for recovery (default: 8000)\n\
        WEBMEND_STEP_TIMEOUT_MS          Per-step action timeout in ms (default: 5000)\n\
        WEBMEND_SETTLE_DELAY_MS          Delay after each step in ms (default: 250)\n\
        WEBMEND_HEADLESS                 Run the browser headless (default: true)"
)]
struct Args {
    /// Test definition file (.json) or a directory of definitions
    path: PathBuf,

    /// Show the browser window instead of running headless
    #[arg(long)]
    headed: bool,

    /// Print results as JSON after the run
    #[arg(long)]
    json: bool,

    /// Per-step action timeout in milliseconds
    #[arg(long, value_name = "MS")]
    step_timeout: Option<u64>,

    /// Delay after each successful step in milliseconds
    #[arg(long, value_name = "MS")]
    settle_delay: Option<u64>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut settings = config::get().runner.clone();
    if args.headed {
        settings.headless = false;
    }
    if let Some(ms) = args.step_timeout {
        settings.step_timeout_ms = ms;
    }
    if let Some(ms) = args.settle_delay {
        settings.settle_delay_ms = ms;
    }

    let exit_code = if args.path.is_dir() {
        match run_suite(&args.path, &settings).await {
            Ok(report) => {
                if args.json {
                    match serde_json::to_string_pretty(&report) {
                        Ok(json) => println!("{}", json),
                        Err(e) => eprintln!("Warning: could not encode report: {}", e),
                    }
                }
                report.exit_code()
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        }
    } else {
        match run_test(&args.path, &settings).await {
            Ok(result) => {
                if args.json {
                    match serde_json::to_string_pretty(&result) {
                        Ok(json) => println!("{}", json),
                        Err(e) => eprintln!("Warning: could not encode result: {}", e),
                    }
                }
                if result.passed { 0 } else { 1 }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        }
    };

    std::process::exit(exit_code);
}
