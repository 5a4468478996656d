mod case;
mod cli;
mod engine;
mod fixture_io;
mod invariants;
mod routing_case;

use cli::{CliError, CliOptions, EvalMode};
use engine::run_eval;
use shared::config::load_dotenv;

#[tokio::main]
async fn main() {
    let options = match CliOptions::parse(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(CliError::HelpRequested) => {
            print_usage();
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    if options.mode == EvalMode::Live
        && let Err(err) = load_dotenv()
    {
        eprintln!("{err}");
        std::process::exit(2);
    }

    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .compact()
        .with_writer(std::io::stderr)
        .init();

    match run_eval(&options).await {
        Ok(summary) => {
            summary.print();
            if summary.has_failures() {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("failed to run guardrail eval harness: {err}");
            std::process::exit(2);
        }
    }
}

fn print_usage() {
    eprintln!(
        "Usage: cargo run -p guard-eval -- [--mode mocked|live] [--case <id>]\n\
         \n\
         Modes:\n\
         - mocked (default): scripted gateway replies, exact delegated-call checks\n\
         - live: OpenRouter smoke run over fixtures marked include_in_live_smoke\n\
         \n\
         Options:\n\
         - --case <id>  Run a single fixture\n\
         - --help       Show this help text"
    );
}
