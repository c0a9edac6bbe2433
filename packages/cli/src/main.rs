use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use ioexec_cli::Options;

/// ioexec - run a native program's IO actions
#[derive(Parser, Debug)]
#[command(name = "ioexec")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Annotate errors with the actions they passed through
    #[arg(long)]
    show_trace: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Directory holding bundled extensions
    #[arg(long, value_name = "DIR")]
    plugin_dir: Option<PathBuf>,

    /// Native module exporting `ioexec_main`
    program: PathBuf,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

/// Log to stderr, filtered by `IOEXEC_LOG` (default `warn`).
fn init_logging() {
    let filter = EnvFilter::try_from_env("IOEXEC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging();

    let options = Options {
        program: args.program,
        args: args.args,
        show_trace: args.show_trace,
        json: args.json,
        plugin_dir: args.plugin_dir,
    };

    match ioexec_cli::run(&options, std::env::args().collect()) {
        Ok(Some(output)) => println!("{}", output),
        Ok(None) => {}
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}
