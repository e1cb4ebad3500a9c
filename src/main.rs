use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use reflink::commands::{self, ResolveRequest};
use reflink::config::{Config, DEFAULT_CONFIG_FILE};
use reflink::diagnostics;
use reflink::types::DisplayOptions;

#[derive(Parser)]
#[command(name = "reflink", about = "Cross-reference link resolution for generated documentation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Log load progress (info level) unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every target source and refresh the persisted store
    Index,
    /// Render a page, replacing every link marker with markup
    Render {
        /// Page to rewrite
        page: PathBuf,
        /// Id of the document the page renders
        #[arg(long)]
        key: Option<String>,
        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Resolve one reference target and print its markup
    Resolve {
        /// Target id, e.g. T:System.String
        target: String,
        /// Literal marker contents
        #[arg(long)]
        contents: Option<String>,
        /// content, format, extension, or a code entity reference
        #[arg(long)]
        display_target: Option<String>,
        /// Id of the referencing document
        #[arg(long)]
        from: Option<String>,
        /// Hide method parameter lists
        #[arg(long)]
        no_parameters: bool,
        /// Hide template parameter lists
        #[arg(long)]
        no_templates: bool,
        /// Link members to their overload topic
        #[arg(long)]
        prefer_overload: bool,
        /// Prefix the namespace or declaring type
        #[arg(long)]
        show_container: bool,
    },
    /// Resolve a conceptual topic id, optionally with #anchor
    Topic {
        /// Topic GUID
        target: String,
        /// Marker text
        #[arg(long)]
        text: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = Config::load(&cli.config).and_then(|config| {
        return match cli.command {
            Commands::Index => commands::cmd_index(&config),
            Commands::Render { page, key, output } => {
                commands::cmd_render(&config, &page, key.as_deref(), output.as_deref())
            },
            Commands::Resolve {
                target,
                contents,
                display_target,
                from,
                no_parameters,
                no_templates,
                prefer_overload,
                show_container,
            } => {
                let mut options = DisplayOptions::empty();
                options.set(DisplayOptions::SHOW_CONTAINER, show_container);
                options.set(DisplayOptions::SHOW_PARAMETERS, !no_parameters);
                options.set(DisplayOptions::SHOW_TEMPLATES, !no_templates);
                commands::cmd_resolve(&config, ResolveRequest {
                    contents,
                    display_target,
                    from,
                    options,
                    prefer_overload,
                    target,
                })
            },
            Commands::Topic { target, text } => commands::cmd_topic(&config, &target, text.as_deref()),
        };
    });

    return match result {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(2)
        },
    };
}

/// Install the stderr subscriber: `RUST_LOG` wins, else warn (info with `-v`).
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
