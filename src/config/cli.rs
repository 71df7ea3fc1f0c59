use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::transform::LocationMode;

/// Command-line arguments for the xforms-server binary.
#[derive(Debug, Parser)]
#[command(
    name = "xforms-server",
    version,
    about = "Ajax response diffing and stylesheet execution for XForms documents"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "XFORMS_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Compare two control tree snapshots and print the Ajax response.
    Diff(DiffArgs),
    /// Compile a stylesheet through the cache and run it over a document.
    Transform(TransformArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct DiffArgs {
    #[command(flatten)]
    pub overrides: AjaxOverrides,

    /// JSON control tree the client currently shows. Omit for a new page.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub previous: Option<PathBuf>,

    /// JSON control tree after the request.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub current: PathBuf,

    /// Effective id of a control whose value the request changed. Repeatable.
    #[arg(long = "changed", value_name = "ID")]
    pub changed: Vec<String>,

    /// Prefixed id of a selection control whose items never change. Repeatable.
    #[arg(long = "static-itemset", value_name = "ID")]
    pub static_itemsets: Vec<String>,

    /// Treat the document as unchanged since the last request.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub clean: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct AjaxOverrides {
    /// Override test mode (describe every control as new).
    #[arg(long = "ajax-test-mode", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub test_mode: Option<bool>,

    /// Override the static readonly appearance.
    #[arg(
        long = "ajax-static-readonly-appearance",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub static_readonly_appearance: Option<bool>,

    /// Override inner-html updates of static fragments.
    #[arg(
        long = "ajax-inner-html-updates",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub inner_html_updates: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct TransformArgs {
    #[command(flatten)]
    pub overrides: TransformOverrides,

    /// Stylesheet to compile.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub stylesheet: PathBuf,

    /// Document to transform.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Named output to print after the primary one. Repeatable.
    #[arg(long = "output", value_name = "NAME")]
    pub outputs: Vec<String>,

    /// Engine attribute as NAME=BOOL. Repeatable.
    #[arg(long = "attribute", value_name = "NAME=BOOL", value_parser = parse_attribute)]
    pub attributes: Vec<(String, bool)>,

    /// Compile and run this many times; later runs reuse the cached stylesheet.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub repeat: u32,
}

#[derive(Debug, Args, Default, Clone)]
pub struct TransformOverrides {
    /// Override the engine used to compile stylesheets.
    #[arg(long = "transform-engine", value_name = "NAME")]
    pub engine: Option<String>,

    /// Override how output events are located (none|dumb|smart).
    #[arg(long = "transform-location-mode", value_name = "MODE")]
    pub location_mode: Option<LocationMode>,

    /// Override whether compiled stylesheets are cached.
    #[arg(
        long = "cache-enable-object-cache",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub enable_object_cache: Option<bool>,

    /// Override the object cache entry limit.
    #[arg(long = "cache-object-cache-limit", value_name = "COUNT")]
    pub object_cache_limit: Option<usize>,
}

fn parse_attribute(value: &str) -> Result<(String, bool), String> {
    let (name, flag) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=BOOL, got `{value}`"))?;
    let flag = match flag.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => true,
        "false" | "no" | "0" | "off" => false,
        other => return Err(format!("`{other}` is not a boolean")),
    };
    Ok((name.trim().to_string(), flag))
}
