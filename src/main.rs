//! # Ruminate
//!
//! Command-line front-end for the Modelica instantiation engine. The default
//! mode reads a file containing one top-level expression, evaluates it, and
//! prints the result as pretty JSON. With `--flatten` the file is treated as
//! a Modelica stored definition instead: the library is loaded, instantiated,
//! and printed as flat Modelica text.
//!
//! ## Usage
//! ```sh
//! ruminate expr.mos
//! ruminate --flatten model.mo
//! ```
//!
//! Exit code 0 on success; nonzero with a human-readable diagnostic on any
//! parse, resolution, or instantiation error.

use anyhow::{Context, Result};
use clap::Parser;
use log::debug;
use ruminate::Library;
use ruminate::errors::Error;
use ruminate::eval::{Environment, evaluate};
use ruminate::parser::parse_expression_text;
use std::{fs, time::Instant};

#[derive(Parser, Debug)]
#[command(version, about = "Ruminate Modelica instantiation engine", long_about = None)]
struct Args {
    /// Source file: one top-level expression, or a model with --flatten
    #[arg(name = "FILE")]
    file: String,

    /// Treat the input as a Modelica file, instantiate it, and print the
    /// flattened model
    #[arg(short, long, default_value_t = false)]
    flatten: bool,

    /// Verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn report(error: Error) -> anyhow::Error {
    let report = miette::Report::new(error);
    anyhow::anyhow!("{:?}", report)
}

fn main() -> Result<()> {
    env_logger::init();
    debug!("env logger started");
    let args = Args::parse();

    let input = fs::read_to_string(&args.file)
        .with_context(|| format!("Can't read file {}", args.file))?;
    let now = Instant::now();

    if args.flatten {
        let mut library = Library::from_source(&input).map_err(report)?;
        library.instantiate().map_err(report)?;
        if args.verbose {
            println!(
                "Instantiation took {} milliseconds.",
                now.elapsed().as_millis()
            );
        }
        print!("{}", library.print());
        return Ok(());
    }

    let expression = parse_expression_text(&input, &args.file).map_err(report)?;
    if args.verbose {
        println!("Parsing took {} milliseconds.", now.elapsed().as_millis());
        println!("AST:\n{:#?}", expression);
    }
    let value =
        evaluate(&expression, &Environment::new(args.file.as_str())).map_err(report)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
