// This file is part of Aakit.
//
// Aakit is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Aakit is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Aakit.
// If not, see https://www.gnu.org/licenses/.

use ::tracing::level_filters::LevelFilter;
use clap::{builder::PossibleValuesParser, Args, Parser, Subcommand};

mod chain_spec;
mod demo;
mod op;
mod paymaster;
mod tracing;

/// Main entry point for the CLI
///
/// Parses the CLI arguments, resolves the chain spec and runs the subcommand.
pub fn run() -> anyhow::Result<()> {
    let opt = Cli::parse();
    let _guard = tracing::configure_logging(&opt.logs, opt.command.default_log_level())?;
    tracing::debug!("Parsed CLI options: {:#?}", opt);

    let cs = chain_spec::resolve_chain_spec(&opt.common.network, &opt.common.chain_spec)?;
    tracing::debug!("Chain spec: {:#?}", cs);

    match opt.command {
        Command::Hash(args) => op::hash(args, &cs)?,
        Command::Estimate(args) => op::estimate(args, &cs)?,
        Command::Sign(args) => op::sign(args, &cs)?,
        Command::Paymaster(args) => paymaster::run(args, &cs)?,
        Command::Demo(args) => demo::run(args, cs)?,
    }

    Ok(())
}

/// CLI commands
#[derive(Debug, Subcommand)]
enum Command {
    /// Hash command
    ///
    /// Prints the inner and the domain separated hash of a user operation
    #[command(name = "hash")]
    Hash(op::OpArgs),

    /// Estimate command
    ///
    /// Suggests fees and fills in the gas limits of a user operation
    #[command(name = "estimate")]
    Estimate(op::EstimateArgs),

    /// Sign command
    ///
    /// Fills in the owner signature of a user operation
    #[command(name = "sign")]
    Sign(op::SignArgs),

    /// Paymaster commands
    ///
    /// Encodes and decodes sponsor authorizations
    #[command(name = "paymaster")]
    Paymaster(paymaster::PaymasterCliArgs),

    /// Demo command
    ///
    /// Runs a token transfer through a wallet on a local development network
    #[command(name = "demo")]
    Demo(demo::DemoArgs),
}

impl Command {
    /// Level logged at when `RUST_LOG` is unset. Commands printing JSON to
    /// stdout stay quiet, the demo narrates.
    fn default_log_level(&self) -> LevelFilter {
        match self {
            Command::Demo(_) => LevelFilter::INFO,
            Command::Hash(_) | Command::Estimate(_) | Command::Sign(_) | Command::Paymaster(_) => {
                LevelFilter::WARN
            }
        }
    }
}

/// CLI common options
#[derive(Debug, Args)]
#[command(next_help_heading = "Common")]
pub struct CommonArgs {
    /// Network flag
    #[arg(
        long = "network",
        name = "network",
        env = "NETWORK",
        value_parser = PossibleValuesParser::new(chain_spec::HARDCODED_CHAIN_SPECS),
        global = true)
    ]
    network: Option<String>,

    /// Chain spec file path
    #[arg(
        long = "chain_spec",
        name = "chain_spec",
        env = "CHAIN_SPEC",
        default_value = None,
        global = true
    )]
    chain_spec: Option<String>,
}

/// CLI options for logging
#[derive(Debug, Args)]
#[command(next_help_heading = "Logging")]
pub struct LogsArgs {
    /// Log file
    ///
    /// If not provided, logs will be written to stderr
    #[arg(
        long = "log.file",
        name = "log.file",
        env = "LOG_FILE",
        default_value = None,
        global = true
    )]
    file: Option<String>,

    /// Log JSON
    ///
    /// If set, logs will be written in JSON format
    #[arg(
        long = "log.json",
        name = "log.json",
        env = "LOG_JSON",
        required = false,
        num_args = 0,
        global = true
    )]
    json: bool,
}

/// CLI options
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[clap(subcommand)]
    command: Command,

    #[clap(flatten)]
    common: CommonArgs,

    #[clap(flatten)]
    logs: LogsArgs,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_demo() {
        let cli = Cli::try_parse_from([
            "aakit",
            "demo",
            "--wallet_version",
            "v6",
            "--sponsored",
            "--network",
            "dev",
        ])
        .unwrap();
        assert_eq!(cli.common.network.as_deref(), Some("dev"));
        assert!(matches!(cli.command, Command::Demo(_)));
    }

    #[test]
    fn test_parse_estimate() {
        let cli = Cli::try_parse_from([
            "aakit",
            "estimate",
            "--op",
            "op.json",
            "--priority_fee",
            "2000000000",
            "--wallet_version",
            "v2",
        ])
        .unwrap();
        let Command::Estimate(args) = &cli.command else {
            panic!("expected estimate, got {:?}", cli.command);
        };
        assert_eq!(args.priority_fee, Some(2_000_000_000));
        assert_eq!(args.wallet_version, Some(aakit_sim::WalletVersion::V2));
        assert_eq!(cli.command.default_log_level(), LevelFilter::WARN);
    }

    #[test]
    fn test_demo_logs_at_info() {
        let cli = Cli::try_parse_from(["aakit", "demo"]).unwrap();
        assert_eq!(cli.command.default_log_level(), LevelFilter::INFO);
    }

    #[test]
    fn test_unknown_network_is_rejected() {
        assert!(Cli::try_parse_from(["aakit", "demo", "--network", "nope"]).is_err());
    }
}
