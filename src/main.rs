use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result, anyhow, bail};
use log::{LevelFilter, info, warn};

use catscript::backend::find_backend;
use catscript::{bytecode, frontend, logger};

struct Options {
    backend: String,
    dump_bytecode: bool,
    verbose: bool,
    input_path: Option<String>,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut options = Options {
            backend: "interpreter".to_string(),
            dump_bytecode: false,
            verbose: false,
            input_path: None,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--backend" | "-b" => {
                    options.backend = args
                        .next()
                        .ok_or_else(|| anyhow!("Missing backend name after {arg}"))?;
                }
                "--dump-bytecode" => options.dump_bytecode = true,
                "--verbose" | "-v" => options.verbose = true,
                _ if arg.starts_with('-') => bail!("Unknown option '{arg}'"),
                _ => {
                    if options.input_path.is_some() {
                        bail!("Only one input file is supported");
                    }
                    options.input_path = Some(arg);
                }
            }
        }
        Ok(options)
    }

    fn log_level(&self) -> LevelFilter {
        if self.verbose {
            return LevelFilter::Debug;
        }
        match std::env::var("CATSCRIPT_LOG") {
            Ok(name) => logger::parse_level(&name).unwrap_or(LevelFilter::Warn),
            Err(_) => LevelFilter::Warn,
        }
    }
}

fn main() -> Result<()> {
    let options = Options::parse(std::env::args().skip(1))?;
    if let Err(error) = logger::init(options.log_level()) {
        eprintln!("Failed to initialize logger: {error}");
    }

    let source = if let Some(path) = &options.input_path {
        fs::read_to_string(path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let ast = frontend::load(&source)?;
    info!("program validated, {} nodes", ast.len());

    if options.dump_bytecode {
        let program = bytecode::compile(&ast)?;
        print!("{program}");
        return Ok(());
    }

    let backend = find_backend(&options.backend)
        .ok_or_else(|| anyhow!("Unknown backend '{}'", options.backend))?;
    let prepared = backend.prepare(&ast)?;
    let mut output = String::new();
    let result = prepared.run_into(&mut output);
    print!("{output}");
    result.inspect_err(|error| {
        warn!("{} backend failed: {error}", backend.name());
    })
}
