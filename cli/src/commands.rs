use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use pymv::bytecode::{self, Program};
use pymv::vm::Interpreter;

pub struct RunOptions {
  pub debug: bool,
  pub show_bytecode: bool,
  pub performance: bool,
}

fn is_bytecode_file(path: &Path) -> bool {
  path.extension().and_then(|e| e.to_str()) == Some("pvm")
}

fn load_program(path: &Path) -> Result<Program> {
  if is_bytecode_file(path) {
    let mut file = BufReader::new(File::open(path).with_context(|| format!("failed to open {}", path.display()))?);
    bytecode::load(&mut file).with_context(|| format!("failed to load bytecode from {}", path.display()))
  } else {
    let src = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    compile_source(&src, path)
  }
}

fn compile_source(src: &str, path: &Path) -> Result<Program> {
  pymv::compile(src).map_err(|e| {
    let name = path.display().to_string();
    anyhow::anyhow!("{}", e.report(diag::Source::file(name, src.to_string())))
  })
}

trait ReportableError {
  fn report(&self, source: diag::Source<'_>) -> String;
}

impl ReportableError for pymv::Error {
  fn report(&self, source: diag::Source<'_>) -> String {
    match self {
      pymv::Error::Syntax(e) => e.report(source),
      pymv::Error::CodeGen(e) => e.report(source),
      other => format!("{other}"),
    }
  }
}

pub fn run(path: &Path, opts: RunOptions) -> Result<()> {
  let program = load_program(path)?;

  if opts.show_bytecode {
    print!("{}", bytecode::disassemble(&program));
  }

  let mut interp = Interpreter::new(&program);
  interp.debug = opts.debug;
  let stdin = io::stdin();
  let mut stdin = stdin.lock();
  let mut stdout = io::stdout();
  let result = interp.run(&mut stdout, &mut stdin);

  if opts.performance {
    eprint!("{}", interp.stats.report());
  }

  if result.is_err() {
    bail!("program terminated with a runtime error");
  }
  Ok(())
}

pub fn compile(path: &Path, output: Option<&Path>) -> Result<()> {
  let src = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let program = compile_source(&src, path)?;

  let out_path = match output {
    Some(p) => p.to_path_buf(),
    None => path.with_extension("pvm"),
  };
  let mut file = File::create(&out_path).with_context(|| format!("failed to create {}", out_path.display()))?;
  bytecode::save(&program, &mut file)?;
  file.flush()?;
  println!("wrote {}", out_path.display());
  Ok(())
}

pub fn info(path: &Path) -> Result<()> {
  let mut bytes = Vec::new();
  File::open(path)
    .with_context(|| format!("failed to open {}", path.display()))?
    .read_to_end(&mut bytes)?;
  let info = bytecode::file_info(&mut bytes.as_slice()).with_context(|| format!("failed to read {}", path.display()))?;

  println!("file:          {}", path.display());
  println!("file size:     {} bytes", bytes.len());
  println!("version:       0x{:04x}", info.version);
  println!("header size:   {} bytes", info.header_size);
  println!("constants:     {}", info.const_count);
  println!("symbols:       {}", info.symbol_count);
  println!("code size:     {} bytes", info.code_size);
  Ok(())
}

/// A minimal read-compile-run loop: source is accumulated until a
/// blank line, then compiled and executed as a standalone program.
/// There is no variable state carried between chunks, since each
/// chunk is its own code-generation unit with its own slot table.
pub fn interactive() -> Result<()> {
  let stdin = io::stdin();
  let mut stdout = io::stdout();
  let mut buffer = String::new();
  let show_prompt = atty::is(atty::Stream::Stdin);

  loop {
    if show_prompt {
      if buffer.is_empty() {
        print!(">>> ");
      } else {
        print!("... ");
      }
      stdout.flush().ok();
    }

    let mut line = String::new();
    let n = stdin.lock().read_line(&mut line)?;
    if n == 0 {
      break;
    }

    if line.trim().is_empty() {
      if !buffer.is_empty() {
        run_chunk(&buffer);
        buffer.clear();
      }
      continue;
    }

    buffer.push_str(&line);
  }

  if !buffer.is_empty() {
    run_chunk(&buffer);
  }
  Ok(())
}

fn run_chunk(src: &str) {
  let program = match pymv::compile(src) {
    Ok(p) => p,
    Err(e) => {
      eprintln!("{}", e.report(diag::Source::string(src.to_string())));
      return;
    }
  };
  let mut interp = Interpreter::new(&program);
  let stdin = io::stdin();
  let mut stdin = stdin.lock();
  let mut stdout = io::stdout();
  if interp.run(&mut stdout, &mut stdin).is_err() {
    eprintln!("runtime error (see above)");
  }
}
