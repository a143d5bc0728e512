//! PBASIC Tokenizer CLI
//!
//! Command-line front end: compiles PBASIC source files to EEPROM images
//! and download packets.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use pbasic_tokenizer::{compile_into, CompileOptions, ModuleRec, TokenRef};
use std::path::PathBuf;
use std::process::ExitCode;

/// BASIC Stamp PBASIC compiler.
///
/// Compiles a PBASIC source file into the 2048-byte EEPROM image and the
/// 18-byte download packets a Stamp module expects.
#[derive(Parser, Debug)]
#[command(name = "pbasic-tokenize")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source file to compile
    file: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "human")]
    format: OutputFormat,

    /// Resolve editor directives only, skip compilation
    #[arg(short, long)]
    directives_only: bool,

    /// Accept but ignore the $STAMP directive
    #[arg(long)]
    ignore_stamp: bool,

    /// Write the raw EEPROM image to a file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the source-to-token cross reference
    #[arg(short = 'x', long)]
    xref: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable summary
    Human,
    /// JSON summary
    Json,
    /// Hex listing of used EEPROM blocks
    Listing,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("pbasic_tokenizer=debug")
            .init();
    }

    match run(&args) {
        Ok(succeeded) => {
            if succeeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let mut source = std::fs::read(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;

    tracing::debug!(bytes = source.len(), "source loaded");

    let options = CompileOptions {
        directives_only: args.directives_only,
        parse_stamp_directive: !args.ignore_stamp,
    };
    let mut rec = ModuleRec::new();
    let mut xref: Vec<TokenRef> = Vec::new();
    let _ = compile_into(&mut rec, &mut source, options, Some(&mut xref));

    match args.format {
        OutputFormat::Human => print_human(&rec, args),
        OutputFormat::Json => print_json(&rec, args)?,
        OutputFormat::Listing => print_listing(&rec),
    }

    if args.xref {
        for entry in &xref {
            println!("src {:5}  bit {:5}", entry.src_start, entry.tok_start);
        }
    }

    if let Some(path) = &args.output {
        if rec.succeeded {
            std::fs::write(path, rec.eeprom)
                .with_context(|| format!("writing {}", path.display()))?;
        }
    }

    Ok(rec.succeeded)
}

fn print_human(rec: &ModuleRec, args: &Args) {
    println!("File: {}", args.file.display());
    match (&rec.error, rec.succeeded) {
        (Some(error), _) => {
            println!("  Result:   FAILED");
            println!("  Error:    {error}");
            println!(
                "  At:       bytes {}..{}",
                rec.error_start,
                rec.error_start + rec.error_length
            );
            return;
        }
        (None, _) => println!("  Result:   OK"),
    }
    if let Some(module) = rec.target_module {
        println!("  Module:   {module}");
    }
    if let Some(port) = &rec.port {
        println!("  Port:     {port}");
    }
    println!(
        "  PBASIC:   {}.{}",
        rec.language_version / 100,
        rec.language_version % 100 / 10
    );
    for (name, _) in &rec.project_files {
        println!("  Project:  {name}");
    }
    if !args.directives_only {
        println!("  Packets:  {}", rec.packet_count);
        println!(
            "  Vars:     {} bits, {} nibs, {} bytes, {} words",
            rec.var_counts[0], rec.var_counts[1], rec.var_counts[2], rec.var_counts[3]
        );
        println!("  Debug:    {}", if rec.debug_flag { "yes" } else { "no" });
    }
}

fn print_json(rec: &ModuleRec, args: &Args) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct JsonOutput {
        file: String,
        succeeded: bool,
        error: Option<String>,
        error_start: usize,
        error_length: usize,
        target_module: Option<String>,
        port: Option<String>,
        language_version: u16,
        project_files: Vec<String>,
        packet_count: u8,
        var_counts: [u8; 4],
        debug: bool,
        packets: Vec<String>,
    }

    let output = JsonOutput {
        file: args.file.display().to_string(),
        succeeded: rec.succeeded,
        error: rec.error.clone(),
        error_start: rec.error_start,
        error_length: rec.error_length,
        target_module: rec.target_module.map(|m| m.to_string()),
        port: rec.port.clone(),
        language_version: rec.language_version,
        project_files: rec.project_files.iter().map(|(n, _)| n.clone()).collect(),
        packet_count: rec.packet_count,
        var_counts: rec.var_counts,
        debug: rec.debug_flag,
        packets: rec.packets().map(hex::encode).collect(),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_listing(rec: &ModuleRec) {
    if !rec.succeeded {
        if let Some(error) = &rec.error {
            println!("FAILED: {error}");
        }
        return;
    }
    for (block, chunk) in rec.eeprom.chunks(16).enumerate() {
        let flags = &rec.eeprom_flags[block * 16..block * 16 + 16];
        if flags.iter().all(|f| f & 0x07 == 0) {
            continue;
        }
        println!("{:04X}: {}", block * 16, hex::encode(chunk));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from(["pbasic-tokenize", "blink.bs2"]).unwrap();
        assert!(!args.directives_only);
        assert!(matches!(args.format, OutputFormat::Human));
    }

    #[test]
    fn test_format_option() {
        let args =
            Args::try_parse_from(["pbasic-tokenize", "-f", "json", "blink.bs2"]).unwrap();
        assert!(matches!(args.format, OutputFormat::Json));
    }

    #[test]
    fn test_run_compiles_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "' {{$STAMP BS2}}\n' {{$PBASIC 2.5}}\nHIGH 0\n").unwrap();
        let args = Args::try_parse_from([
            "pbasic-tokenize",
            file.path().to_str().unwrap(),
        ])
        .unwrap();
        assert!(run(&args).unwrap());
    }
}
