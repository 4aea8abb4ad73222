//! Command-line driver: compiles each input file into a `CompilationUnit`
//! sharing one `DataAllocator`, then links the whole run into an iNES ROM.
//! Argument handling and the per-file loop are grounded in the source's
//! `main.cpp`; the `clap`/`log`+`env_logger` wiring follows
//! `other_examples/cc747d7f_emmron-egaht__native-compiler-src-main.rs`.
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use nescc::codegen::DataAllocator;
use nescc::linker::{self, Mapper as LinkerMapper};
use nescc::unit::CompilationUnit;

#[derive(Parser)]
#[command(name = "nescc")]
#[command(about = "Compiles a small C-like language to an iNES NES ROM")]
struct Cli {
    /// Source files to compile, in link order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output ROM path.
    #[arg(short, long, default_value = "a.nes")]
    output: PathBuf,

    /// iNES mapper byte to write in the header.
    #[arg(long, value_enum, default_value_t = CliMapper::Original)]
    mapper: CliMapper,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMapper {
    /// Mapper 1, matching the original tool's (arguably incorrect) header byte.
    Original,
    /// Mapper 0 (NROM), the technically correct mapper for a single bank.
    Nrom,
}

impl From<CliMapper> for LinkerMapper {
    fn from(value: CliMapper) -> Self {
        match value {
            CliMapper::Original => LinkerMapper::Original,
            CliMapper::Nrom => LinkerMapper::Nrom,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut data_allocator = DataAllocator::new();
    let mut units = Vec::with_capacity(cli.inputs.len());

    for path in &cli.inputs {
        match CompilationUnit::compile(path, &mut data_allocator) {
            Ok(unit) => units.push(unit),
            Err(e) => {
                log::error!("{}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }

    let rom = match linker::link(&mut units, cli.mapper.into()) {
        Ok(rom) => rom,
        Err(e) => {
            log::error!("link failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = std::fs::write(&cli.output, &rom) {
        log::error!("writing '{}': {e}", cli.output.display());
        return ExitCode::FAILURE;
    }

    log::info!("wrote {} ({} bytes)", cli.output.display(), rom.len());
    ExitCode::SUCCESS
}
