mod commands;

use std::path::PathBuf;

use clap::Parser;

/// Compiles and runs a small Python-like language.
#[derive(Debug, Parser)]
#[clap(name = "pymv", version)]
struct Args {
  /// Source file (any extension) or compiled bytecode file (`.pvm`).
  /// Omit when using `--interactive`.
  file: Option<PathBuf>,

  /// Trace each executed instruction and its stack to stderr.
  #[clap(long)]
  debug: bool,

  /// Print the compiled constants/symbols/instructions before running.
  #[clap(long = "show-bytecode")]
  show_bytecode: bool,

  /// Print per-opcode execution counts and elapsed time after running.
  #[clap(long)]
  performance: bool,

  /// Start a line-based read-compile-run loop instead of running a file.
  #[clap(long)]
  interactive: bool,

  /// Compile `file` to a `.pvm` container instead of running it.
  #[clap(long)]
  compile: bool,

  /// Destination for `--compile`; defaults to `file` with a `.pvm` extension.
  #[clap(long)]
  output: Option<PathBuf>,

  /// Print a compiled bytecode file's header fields instead of running it.
  #[clap(long)]
  info: bool,
}

fn main() -> anyhow::Result<()> {
  let args = Args::parse();

  let result = if args.interactive {
    commands::interactive()
  } else if args.info {
    let Some(file) = args.file else {
      anyhow::bail!("--info requires a bytecode file argument");
    };
    commands::info(&file)
  } else if args.compile {
    let Some(file) = args.file else {
      anyhow::bail!("--compile requires a source file argument");
    };
    commands::compile(&file, args.output.as_deref())
  } else {
    let Some(file) = args.file else {
      anyhow::bail!("expected a source or bytecode file (or --interactive)");
    };
    commands::run(&file, commands::RunOptions {
      debug: args.debug,
      show_bytecode: args.show_bytecode,
      performance: args.performance,
    })
  };

  if let Err(e) = result {
    eprintln!("{e:#}");
    std::process::exit(1);
  }

  Ok(())
}
