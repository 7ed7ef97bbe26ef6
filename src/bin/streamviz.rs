//! streamviz - live view of streamed model events in a rotating log file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use streamviz::{debug, App, Config, PreviewMode};

#[derive(Parser, Debug)]
#[command(name = "streamviz")]
#[command(about = "Real-time terminal dashboard for streamed delta events", long_about = None)]
#[command(version)]
struct Cli {
    /// Log file to follow
    #[arg(long, short = 'f', value_name = "PATH")]
    file: Option<PathBuf>,

    /// Read the whole file before following (default: tail new writes only)
    #[arg(long)]
    from_start: bool,

    /// Maximum number of live streams
    #[arg(long, value_name = "N")]
    max_items: Option<usize>,

    /// Wrapped lines shown per stream
    #[arg(long, short = 'L', value_name = "N")]
    lines_per_item: Option<usize>,

    /// Wrapped lines shown for an expanded stream
    #[arg(long, value_name = "N")]
    lines_expanded: Option<usize>,

    /// Show synthesized summaries instead of raw text
    #[arg(long)]
    pretty_preview: bool,

    /// Summary style when pretty previews are on
    #[arg(long, value_name = "MODE", value_parser = ["summary", "hybrid"])]
    pretty_mode: Option<String>,

    /// Pretty-print JSON content in the detail view
    #[arg(long)]
    json_pretty: bool,

    /// Keep ANSI escape sequences in log lines
    #[arg(long)]
    keep_ansi: bool,

    /// Configuration file (default: <config dir>/streamviz/config.yaml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write diagnostic logs to a file (also STREAMVIZ_DEBUG=1)
    #[arg(long)]
    debug: bool,

    /// Diagnostic log file
    #[arg(long, value_name = "LOG_FILE")]
    debug_log: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default_path()
                .filter(|path| path.exists())
                .map(Config::load_or_default)
                .unwrap_or_default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        self.apply(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Applies flags that were given on the command line.
    fn apply(&self, config: &mut Config) {
        if let Some(file) = &self.file {
            config.log_path.clone_from(file);
        }
        if self.from_start {
            config.from_start = true;
        }
        if let Some(n) = self.max_items {
            config.max_items = n;
        }
        if let Some(n) = self.lines_per_item {
            config.lines_per_item = n;
        }
        if let Some(n) = self.lines_expanded {
            config.lines_expanded = n;
        }
        let mode = self.pretty_mode.as_deref().and_then(PreviewMode::parse);
        if self.pretty_preview {
            config.preview = mode.unwrap_or(PreviewMode::Hybrid);
        } else if let Some(mode) = mode.filter(|_| config.preview.is_pretty()) {
            config.preview = mode;
        }
        if self.json_pretty {
            config.json_pretty = true;
        }
        if self.keep_ansi {
            config.keep_ansi = true;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.debug || debug::env_enabled() {
        let path = cli
            .debug_log
            .clone()
            .unwrap_or_else(|| PathBuf::from(debug::DEFAULT_LOG_FILE));
        debug::init(&path)?;
    }

    let config = cli.load_config()?;
    tracing::info!(?config, "configuration resolved");
    let mut app = App::new(config);
    app.run().context("terminal session failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("streamviz").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = parse(&["-f", "/tmp/x.log", "--from-start", "--max-items", "9", "-L", "2"]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.log_path, PathBuf::from("/tmp/x.log"));
        assert!(config.from_start);
        assert_eq!(config.max_items, 9);
        assert_eq!(config.lines_per_item, 2);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let cli = parse(&[]);
        let mut config = Config {
            max_items: 3,
            json_pretty: true,
            ..Config::default()
        };
        cli.apply(&mut config);

        assert_eq!(config.max_items, 3);
        assert!(config.json_pretty);
        assert_eq!(config.preview, PreviewMode::Off);
    }

    #[test]
    fn test_pretty_flags() {
        let mut config = Config::default();
        parse(&["--pretty-preview"]).apply(&mut config);
        assert_eq!(config.preview, PreviewMode::Hybrid);

        parse(&["--pretty-mode", "summary"]).apply(&mut config);
        assert_eq!(config.preview, PreviewMode::Summary);

        let mut off = Config::default();
        parse(&["--pretty-mode", "summary"]).apply(&mut off);
        assert_eq!(off.preview, PreviewMode::Off);
    }

    #[test]
    fn test_rejects_unknown_pretty_mode() {
        assert!(Cli::try_parse_from(["streamviz", "--pretty-mode", "fancy"]).is_err());
    }
}
