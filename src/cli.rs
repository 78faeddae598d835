// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Two subcommands:
// - serve: run the HTTP control API
// - check: probe a handful of URLs right now and print the results
//
// The probe settings (concurrency, timeout, redirects, user agent) are global
// flags, so they work with either subcommand. Every flag can also come from
// an environment variable, which is how the service is usually configured.
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use crate::batch::{SchedulerConfig, DEFAULT_CONCURRENCY};
use crate::checker::{ProbeConfig, DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};

#[derive(Parser, Debug)]
#[command(
    name = "badger",
    version,
    about = "Probe batches of URLs for reachability",
    long_about = "badger checks URLs with lightweight HEAD requests, follows redirects, \
                  and classifies every failure. Run it as a service with `serve`, or \
                  check a few URLs from the terminal with `check`."
)]
pub struct Cli {
    #[command(flatten)]
    pub probe: ProbeArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by both subcommands
#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Maximum number of probes in flight at once, across all batches
    #[arg(long, global = true, env = "BADGER_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Per-probe timeout in seconds, redirects included
    #[arg(long, global = true, env = "BADGER_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Redirect hops to follow before reporting RESPONSE_ERROR
    #[arg(long, global = true, env = "BADGER_MAX_REDIRECTS", default_value_t = DEFAULT_MAX_REDIRECTS)]
    pub max_redirects: usize,

    /// User-Agent header sent with every probe
    #[arg(long, global = true, env = "BADGER_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

impl ProbeArgs {
    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            max_redirects: self.max_redirects,
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency: self.concurrency,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP control API
    ///
    /// Example: badger serve --port 7777
    Serve {
        /// Address to bind
        #[arg(long, env = "BADGER_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(long, env = "BADGER_PORT", default_value_t = 7777)]
        port: u16,
    },

    /// Probe URLs once and print the results
    ///
    /// Example: badger check https://example.com https://example.com/missing
    Check {
        /// URLs to probe
        #[arg(required = true)]
        urls: Vec<String>,

        /// Output results in JSON format instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["badger", "serve"]).unwrap();

        assert_eq!(cli.probe.concurrency, 1000);
        assert_eq!(cli.probe.probe_config().timeout, Duration::from_secs(20));
        assert_eq!(cli.probe.probe_config().user_agent, DEFAULT_USER_AGENT);
        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host, "0.0.0.0");
                assert_eq!(port, 7777);
            }
            other => panic!("expected serve, got {:?}", other),
        }
    }

    #[test]
    fn test_check_with_global_flags() {
        let cli = Cli::try_parse_from([
            "badger",
            "check",
            "https://a.test",
            "https://b.test",
            "--json",
            "--concurrency",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.probe.scheduler_config().concurrency, 5);
        match cli.command {
            Commands::Check { urls, json } => {
                assert_eq!(urls.len(), 2);
                assert!(json);
            }
            other => panic!("expected check, got {:?}", other),
        }
    }

    #[test]
    fn test_check_needs_urls() {
        assert!(Cli::try_parse_from(["badger", "check"]).is_err());
    }
}
