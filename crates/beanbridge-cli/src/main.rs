//! `beanbridge` command-line driver

mod inspect;
mod simulate;

use beanbridge_invoker::TransactionPolicy;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use simulate::{retry_config, run_simulation, SimulationConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("beanbridge")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Invoker chains for legacy bean calls")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log output format"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("info")
                .help("Default log filter when RUST_LOG is unset"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run a flaky bean through retry, logging and transaction layers")
                .arg(
                    Arg::new("calls")
                        .long("calls")
                        .default_value("1")
                        .value_parser(value_parser!(u32))
                        .help("Number of chain invocations"),
                )
                .arg(
                    Arg::new("failures")
                        .long("failures")
                        .default_value("2")
                        .value_parser(value_parser!(u32))
                        .help("Transient failures before the bean recovers"),
                )
                .arg(
                    Arg::new("retries")
                        .long("retries")
                        .default_value("3")
                        .value_parser(value_parser!(u32))
                        .help("Retries after the first attempt"),
                )
                .arg(
                    Arg::new("base-delay-ms")
                        .long("base-delay-ms")
                        .default_value("100")
                        .value_parser(value_parser!(u64))
                        .help("Backoff delay after the first failure"),
                )
                .arg(
                    Arg::new("policy")
                        .long("policy")
                        .default_value("commit_on_success")
                        .value_parser(|s: &str| s.parse::<TransactionPolicy>())
                        .help("commit_on_success | always_commit | always_rollback"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Load a factory configuration and summarize it")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to a .toml or .properties file"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn init_tracing(matches: &ArgMatches) {
    let level = matches
        .get_one::<String>("log-level")
        .map_or("info", String::as_str);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if matches.get_one::<String>("log-format").map(String::as_str) == Some("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(matches: &ArgMatches) -> anyhow::Result<i32> {
    match matches.subcommand() {
        Some(("simulate", args)) => {
            let config = SimulationConfig {
                calls: args.get_one::<u32>("calls").copied().unwrap_or(1),
                failures: args.get_one::<u32>("failures").copied().unwrap_or(2),
                retry: retry_config(
                    args.get_one::<u32>("retries").copied().unwrap_or(3),
                    args.get_one::<u64>("base-delay-ms").copied().unwrap_or(100),
                ),
                policy: args
                    .get_one::<TransactionPolicy>("policy")
                    .copied()
                    .unwrap_or_default(),
            };

            let report = run_simulation(config).await?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.generate_text());
            }
            Ok(if report.passed() { 0 } else { 1 })
        }
        Some(("config", args)) => {
            let Some(path) = args.get_one::<PathBuf>("path") else {
                anyhow::bail!("missing configuration path");
            };
            match inspect::describe_config(path, args.get_flag("json")) {
                Ok(text) => {
                    println!("{}", text.trim_end());
                    Ok(0)
                }
                Err(err) => {
                    eprintln!("error: {err:#}");
                    Ok(inspect::exit_code(&err))
                }
            }
        }
        _ => Ok(2),
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_tracing(&matches);

    let code = match run(&matches).await {
        Ok(code) => code,
        Err(err) => {
            let detail = format!("{err:#}");
            tracing::error!(error = %detail, "command failed");
            1
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn simulate_args_parse() {
        let matches = cli()
            .try_get_matches_from([
                "beanbridge",
                "--log-format",
                "json",
                "simulate",
                "--retries",
                "5",
                "--policy",
                "never",
            ])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "simulate");
        assert_eq!(args.get_one::<u32>("retries"), Some(&5));
        assert_eq!(
            args.get_one::<TransactionPolicy>("policy"),
            Some(&TransactionPolicy::AlwaysRollback)
        );
    }

    #[test]
    fn bad_policy_rejected() {
        assert!(cli()
            .try_get_matches_from(["beanbridge", "simulate", "--policy", "sometimes"])
            .is_err());
    }
}
