//! `lr serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use lr_config::{CliSettings, Config};
use lr_server::{AGENT_PATH, DevServer, server_config_from_lr_config, shutdown_signal};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover lr.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to serve and watch (overrides config).
    #[arg(short, long)]
    root_dir: Option<PathBuf>,

    /// Host to bind the asset server to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the asset server to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind the notification server to (overrides config).
    #[arg(long)]
    reload_host: Option<String>,

    /// Port to bind the notification server to (overrides config).
    #[arg(long)]
    reload_port: Option<u16>,

    /// Quiet period in milliseconds before clients are notified (overrides config).
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable live reload (default: enabled).
    #[arg(long)]
    live_reload: Option<bool>,

    /// Disable live reload.
    #[arg(long, conflicts_with = "live_reload")]
    no_live_reload: bool,

    /// Poll the filesystem instead of using native notifications.
    #[arg(long)]
    poll: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = self.cli_settings();
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let server = DevServer::start(server_config_from_lr_config(&config)).await?;

        output.highlight(&format!("Serving http://{}", server.asset_addr()));
        output.info(&format!("Root directory: {}", server.root().display()));
        match (server.reload_addr(), server.watch_backend()) {
            (Some(addr), Some(backend)) => {
                output.info(&format!("Live reload: ws://{addr}/ws"));
                output.info(&format!(
                    "Debounce: {} ms, watching with {backend} backend",
                    config.live_reload.debounce_ms
                ));
                if config.live_reload.inject_agent {
                    output.info(&format!("Injecting {AGENT_PATH} into HTML pages"));
                } else {
                    output.info(&format!(
                        "Add <script src=\"{AGENT_PATH}\"></script> to your pages"
                    ));
                }
            }
            _ => output.info("Live reload: disabled"),
        }
        output.success("Press Ctrl-C to stop");

        shutdown_signal().await;
        server.shutdown().await;

        Ok(())
    }

    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            host: self.host.clone(),
            port: self.port,
            root_dir: self.root_dir.clone(),
            reload_host: self.reload_host.clone(),
            reload_port: self.reload_port,
            debounce_ms: self.debounce_ms,
            live_reload_enabled: self.resolve_live_reload_enabled(),
            force_poll: self.poll.then_some(true),
        }
    }

    /// Resolve `live_reload_enabled` from --live-reload/--no-live-reload flags.
    fn resolve_live_reload_enabled(&self) -> Option<bool> {
        self.no_live_reload.then_some(false).or(self.live_reload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ServeArgs,
    }

    fn parse(args: &[&str]) -> ServeArgs {
        TestCli::parse_from(std::iter::once("lr").chain(args.iter().copied())).args
    }

    #[test]
    fn test_no_flags_leave_config_untouched() {
        let settings = parse(&[]).cli_settings();

        assert_eq!(settings.host, None);
        assert_eq!(settings.port, None);
        assert_eq!(settings.live_reload_enabled, None);
        assert_eq!(settings.force_poll, None);
    }

    #[test]
    fn test_flags_map_to_settings() {
        let settings = parse(&[
            "--root-dir",
            "public",
            "--port",
            "3000",
            "--reload-port",
            "3001",
            "--debounce-ms",
            "250",
            "--poll",
        ])
        .cli_settings();

        assert_eq!(settings.root_dir, Some(PathBuf::from("public")));
        assert_eq!(settings.port, Some(3000));
        assert_eq!(settings.reload_port, Some(3001));
        assert_eq!(settings.debounce_ms, Some(250));
        assert_eq!(settings.force_poll, Some(true));
    }

    #[test]
    fn test_no_live_reload() {
        let args = parse(&["--no-live-reload"]);
        assert_eq!(args.resolve_live_reload_enabled(), Some(false));
    }

    #[test]
    fn test_live_reload_explicit() {
        let args = parse(&["--live-reload", "true"]);
        assert_eq!(args.resolve_live_reload_enabled(), Some(true));
    }

    #[test]
    fn test_verbose() {
        assert!(parse(&["-v"]).verbose);
    }
}
