//! Command-line driver for the Grol VM: `compile` assembles `.asm` sources
//! into sibling `.vm` images, `run` executes images in sequence.

use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info, warn};

mod assembler;
mod bytecode;
mod vm;

use crate::bytecode::image;
use crate::vm::GVM;

#[derive(Parser)]
#[command(name = "grolvm")]
#[command(about = "Assembler and virtual machine for the Grol VM")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Assemble each .asm file into a sibling .vm image
  Compile { files: Vec<PathBuf> },

  /// Execute each image in sequence, stopping at the first non-zero exit
  Run { files: Vec<PathBuf> },
}

fn main() -> ExitCode {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  let cli = Cli::parse();

  let code = match cli.command {
    Command::Compile { files } => compile(&files),
    Command::Run { files } => run(&files),
  };
  // The OS truncates exit codes to a byte, so -1 reports as 255.
  ExitCode::from(code as u8)
}

fn compile(files: &[PathBuf]) -> i64 {
  for file in files {
    info!("compiling {}", file.display());
    if let Err(e) = compile_file(file) {
      error!("{}: {}", file.display(), e);
      return 1;
    }
  }
  0
}

fn compile_file(file: &Path) -> Result<(), Box<dyn Error>> {
  if file.extension().map_or(true, |extension| extension != "asm") {
    return Err(format!("invalid extension for {}, expected .asm", file.display()).into());
  }
  let source = std::fs::read_to_string(file)?;
  let code = assembler::assemble(&source)?;

  let output = file.with_extension("vm");
  info!("writing {} words to {}", code.len(), output.display());
  let mut writer = BufWriter::new(File::create(&output)?);
  image::write_image(&mut writer, &code)?;
  Ok(())
}

fn run(files: &[PathBuf]) -> i64 {
  for file in files {
    info!("running {}", file.display());
    let exit = match run_file(file) {
      Ok(code) => code,
      Err(e) => {
        error!("{}: {}", file.display(), e);
        return 1;
      }
    };
    if exit != 0 {
      warn!("non-zero exit of program {}: {}", file.display(), exit);
      return exit;
    }
  }
  0
}

fn run_file(file: &Path) -> Result<i64, Box<dyn Error>> {
  let mut reader = BufReader::new(File::open(file)?);
  let program = image::read_image(&mut reader)?;

  let mut machine = GVM::new(program);
  match machine.execute() {
    Ok(code) => Ok(code),
    Err(fault) => {
      error!("{}", fault);
      Ok(fault.exit_code())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  /// The full pipeline in memory: assemble, serialize to an image, load it
  /// back, and execute.
  fn compile_and_run(source: &str, input: &[u8]) -> (i64, Vec<u8>) {
    let code = assembler::assemble(source).expect("assembly failed");
    let mut bytes = Vec::new();
    image::write_image(&mut bytes, &code).unwrap();

    let program = image::read_image(&mut Cursor::new(bytes)).expect("load failed");
    let mut machine = GVM::new(program);
    let mut output = Vec::new();
    let exit = machine
      .execute_with(&mut &input[..], &mut output)
      .expect("vm fault");
    (exit, output)
  }

  #[test]
  fn compile_load_run_exit_code() {
    let (exit, _) = compile_and_run("sys exit 7", b"");
    assert_eq!(exit, 7);
  }

  #[test]
  fn compile_load_run_hello() {
    let source = "JumpR prog\nmsg: str8 \"Hi\"\nprog: sys write msg\nsys exit 0";
    let (exit, output) = compile_and_run(source, b"");
    assert_eq!(exit, 0);
    assert_eq!(output, b"Hi");
  }

  #[test]
  fn compile_load_run_echo() {
    let source = "LoadI 0\nPush 0\nLoadI 5\nsyss read 0\nLoadI 0\nsyss write 0\nsys exit 0";
    let (exit, output) = compile_and_run(source, b"hello");
    assert_eq!(exit, 0);
    assert_eq!(output, b"hello");
  }
}
