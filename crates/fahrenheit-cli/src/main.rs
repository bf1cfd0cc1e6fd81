//! Fahrenheit JIT CLI

mod demos;

use clap::{Parser, Subcommand, ValueEnum};
use fahrenheit_codegen::{Backend, CompileOptions, CraneliftBackend};
use fahrenheit_error::Diagnostic;
use fahrenheit_ir::verify_module;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::info;

use demos::{Demo, DemoModule};

/// Code generation backend
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum BackendKind {
    /// Cranelift JIT (default)
    #[default]
    Cranelift,
    /// LLVM MCJIT
    #[cfg(feature = "llvm")]
    Llvm,
}

#[derive(Parser)]
#[command(name = "fahrenheit")]
#[command(author = "Guilherme Mendes")]
#[command(version = "0.1.0")]
#[command(about = "Fahrenheit run-time code generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Code generation backend
    #[arg(short, long, global = true, default_value = "cranelift")]
    backend: BackendKind,

    /// Optimization level
    #[arg(short = 'O', long, global = true, default_value_t = 0,
          value_parser = clap::value_parser!(u8).range(0..=3))]
    opt_level: u8,

    /// Log the backend IR (implies debug logging)
    #[arg(long, global = true)]
    dump_ir: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Builds, verifies, compiles and runs a demo
    Run {
        #[arg(value_enum)]
        demo: Demo,

        /// Integer arguments passed to the demo
        #[arg(allow_negative_numbers = true)]
        args: Vec<i32>,
    },

    /// Prints the IR of a demo
    Print {
        #[arg(value_enum)]
        demo: Demo,
    },

    /// Verifies the IR of a demo
    Verify {
        #[arg(value_enum)]
        demo: Demo,
    },
}

fn init_logging(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose || cli.dump_ir);

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(diagnostic) => {
            eprint!("{}", diagnostic.render(std::io::stderr().is_terminal()));
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> Result<(), Diagnostic> {
    match &cli.command {
        Commands::Print { demo } => {
            print!("{}", demo.build().module);
            Ok(())
        }

        Commands::Verify { demo } => {
            let built = demo.build();
            verify_module(&built.module).map_err(|err| Diagnostic::from(&err))?;
            println!("{}: ok", demo.name());
            Ok(())
        }

        Commands::Run { demo, args } => {
            let built = demo.build();
            verify_module(&built.module).map_err(|err| Diagnostic::from(&err))?;

            let options = CompileOptions::default()
                .with_opt_level(cli.opt_level)
                .with_dump_ir(cli.dump_ir);
            match cli.backend {
                BackendKind::Cranelift => {
                    run_with(CraneliftBackend::with_options(options), *demo, &built, args)
                }
                #[cfg(feature = "llvm")]
                BackendKind::Llvm => {
                    let context = fahrenheit_codegen::LlvmContext::create();
                    run_with(
                        fahrenheit_codegen::LlvmBackend::with_options(&context, options),
                        *demo,
                        &built,
                        args,
                    )
                }
            }
        }
    }
}

fn run_with<B: Backend>(backend: B, demo: Demo, built: &DemoModule, args: &[i32]) -> Result<(), Diagnostic> {
    info!(backend = backend.name(), demo = demo.name(), "compiling demo");
    let engine = backend
        .compile(&built.module)
        .map_err(|err| Diagnostic::from(&err))?;

    match demo.run(&engine, built, args) {
        Some(output) if output.is_empty() => Ok(()),
        Some(output) => {
            println!("{}", output);
            Ok(())
        }
        None => Err(Diagnostic::error(format!(
            "no entry point for demo `{}`",
            demo.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["fahrenheit", "run", "add", "5", "-O", "2"]).expect("parse");
        assert_eq!(cli.opt_level, 2);
        assert!(!cli.verbose);
        match cli.command {
            Commands::Run { demo, args } => {
                assert_eq!(demo, Demo::Add);
                assert_eq!(args, vec![5]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_negative_args() {
        let cli = Cli::try_parse_from(["fahrenheit", "run", "sum", "3", "-4"]).expect("parse");
        match cli.command {
            Commands::Run { args, .. } => assert_eq!(args, vec![3, -4]),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_opt_level_out_of_range() {
        assert!(Cli::try_parse_from(["fahrenheit", "print", "add", "-O", "4"]).is_err());
    }

    #[test]
    fn test_verify_and_run() {
        let cli = Cli::try_parse_from(["fahrenheit", "verify", "count"]).expect("parse");
        assert!(execute(&cli).is_ok());

        let cli = Cli::try_parse_from(["fahrenheit", "run", "add", "1"]).expect("parse");
        assert!(execute(&cli).is_ok());
    }
}
