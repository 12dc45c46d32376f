//! The `quill` binary: flag parsing, logging setup, and dispatch to the
//! interactive shell or to script files.

use anyhow::Context;
use clap::{ArgAction, Parser};
use quill_drv::{Config, Shell};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// The Quill interpreter
#[derive(Debug, Parser)]
#[command(name = "quill", version, about = "Interpreter for the Quill query language")]
struct Cli {
    /// Print the startup banner (--banner=false to suppress)
    #[arg(long, action = ArgAction::Set, num_args = 1)]
    banner: Option<bool>,

    /// Terminal kind; `dumb` disables prompts
    #[arg(long)]
    terminal: Option<String>,

    /// Echo each parsed statement before its result
    #[arg(long, action = ArgAction::SetTrue)]
    echo: bool,

    /// Take over stdin/stdout as a system terminal (--system=false to
    /// leave them alone)
    #[arg(long, action = ArgAction::Set, num_args = 1)]
    system: Option<bool>,

    /// Load a foreign-value provider by name
    #[arg(long)]
    foreign: Option<String>,

    /// Base directory for `use` and Datalog `.input`
    #[arg(long, env = "QUILL_DIRECTORY")]
    directory: Option<PathBuf>,

    /// Cap recursive `use` depth; negative means unbounded
    #[arg(long = "maxUseDepth", allow_negative_numbers = true)]
    max_use_depth: Option<i32>,

    /// Script files to run (`.ql` source, `.dl` Datalog); interactive
    /// when absent
    files: Vec<PathBuf>,
}

fn main() {
    let code = run();
    std::process::exit(code);
}

fn run() -> i32 {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let directory = cli.directory.clone().unwrap_or_else(|| PathBuf::from("."));
    let file_config = Config::load_file(&directory);
    // Defaults, then the config file, then explicit flags.
    let mut config = Config::default().with_file(&file_config);
    config.terminal_dumb = cli.terminal.as_deref() == Some("dumb");
    config.echo = cli.echo;
    config.foreign = cli.foreign.clone();
    config.directory = directory;
    if let Some(banner) = cli.banner {
        config.banner = banner;
    }
    if let Some(system) = cli.system {
        config.system = system;
    }
    if let Some(depth) = cli.max_use_depth {
        config.max_use_depth = depth;
    }

    let stdout = std::io::stdout();
    let mut output = stdout.lock();

    if cli.files.is_empty() {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        // Scripts piped through stdin behave like a dumb terminal.
        if !config.system {
            config.terminal_dumb = true;
        }
        let mut shell = Shell::new(config);
        return shell.run(&mut input, &mut output);
    }

    let mut shell = Shell::new(Config {
        terminal_dumb: true,
        banner: false,
        ..config
    });
    for file in &cli.files {
        match run_file(&mut shell, file, &mut output) {
            Ok(()) => {}
            Err(error) => {
                let _ = writeln!(output, "{:#}", error);
                return 1;
            }
        }
    }
    0
}

fn run_file(shell: &mut Shell, file: &PathBuf, output: &mut dyn Write) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let name = file.display().to_string();
    let is_datalog = file.extension().is_some_and(|ext| ext == "dl");
    if is_datalog {
        let file_id = shell.session.add_source(&name, &content);
        let outcome = shell
            .session
            .execute_datalog(&content, file_id)
            .map_err(|error| anyhow::anyhow!("{}: Error: {}", name, error))?;
        for binding in &outcome.printed {
            let _ = writeln!(
                output,
                "val {} = {} : {}",
                binding.name, binding.value, binding.ty
            );
        }
        Ok(())
    } else {
        let file_id = shell.session.add_source(&name, &content);
        shell
            .run_source(&content, file_id, output)
            .map_err(|_| anyhow::anyhow!("{}: aborted", name))
    }
}
