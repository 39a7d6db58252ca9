#[macro_use]
extern crate clap;

use clap::Arg;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use yabal::{Error, OutputFormat};

#[derive(Debug)]
enum IOErrorContext {
    ReadInput,
    WriteOutput,
}

#[derive(Debug)]
enum CliError {
    Yabal(yabal::Error),
    BadFormat(String),
    Io(std::io::Error, IOErrorContext, PathBuf),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Io(err, context, path) => writeln!(
                f,
                "{} file \"{}\" failed: {}",
                match context {
                    IOErrorContext::ReadInput => "Reading input",
                    IOErrorContext::WriteOutput => "Writing output",
                },
                path.display(),
                err
            ),
            CliError::BadFormat(msg) => writeln!(f, "{}", msg),
            CliError::Yabal(Error::Parse(err)) => {
                writeln!(f, "Parsing input failed:")?;
                write!(f, "{}", err)
            }
            CliError::Yabal(Error::Diagnostics(diagnostics)) => {
                for d in diagnostics {
                    writeln!(
                        f,
                        "{}:{}: {:?}: {}",
                        d.range.start_line, d.range.start_col, d.level, d.message
                    )?;
                }
                Ok(())
            }
        }
    }
}

fn main() {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("INPUT")
                .help("Sets the input file to compile")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("OUTPUT")
                .help("Sets the output file to write to"),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .takes_value(true)
                .value_name("FORMAT")
                .possible_values(&["asm", "asmc", "aexe", "hex"])
                .default_value("asm")
                .help("Sets the output encoding"),
        )
        .arg(
            Arg::with_name("source_map")
                .short("m")
                .long("source-map")
                .takes_value(true)
                .value_name("SOURCE_MAP")
                .help("Sets the file to write the line/address source map to"),
        )
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();
    let output = matches.value_of("output");
    let format = matches.value_of("format").unwrap();
    let map = matches.value_of("source_map");

    if let Err(err) = build(input, output, format, map) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn build(input: &str, output: Option<&str>, format: &str, map: Option<&str>) -> Result<(), CliError> {
    let input_path = Path::new(input);

    let format: OutputFormat = format
        .parse()
        .map_err(|err: String| CliError::BadFormat(err))?;

    let input_file = File::open(input_path)
        .map_err(|err| CliError::Io(err, IOErrorContext::ReadInput, input_path.to_owned()))?;
    let mut buf_reader = BufReader::new(input_file);
    let mut source = String::new();

    buf_reader
        .read_to_string(&mut source)
        .map_err(|err| CliError::Io(err, IOErrorContext::ReadInput, input_path.to_owned()))?;

    let compiled = yabal::compile(&source).map_err(CliError::Yabal)?;

    for d in compiled.diagnostics.entries() {
        eprintln!("{}:{}: {:?}: {}", d.range.start_line, d.range.start_col, d.level, d.message);
    }

    let output_path: PathBuf = output
        .map(PathBuf::from)
        .unwrap_or_else(|| input_path.with_extension(default_extension(format)));

    let rendered = compiled.render(format);
    std::fs::write(&output_path, rendered)
        .map_err(|err| CliError::Io(err, IOErrorContext::WriteOutput, output_path))?;

    if let Some(map_path_str) = map {
        let map_path = PathBuf::from(map_path_str);
        std::fs::write(&map_path, compiled.render_source_map())
            .map_err(|err| CliError::Io(err, IOErrorContext::WriteOutput, map_path))?;
    }

    Ok(())
}

fn default_extension(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Asm | OutputFormat::AsmC => "asm",
        OutputFormat::Aexe => "aexe",
        OutputFormat::Hex => "hex",
    }
}
