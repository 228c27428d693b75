//! pyzig CLI
//!
//! Translates a frontend AST dump into a Zig source file and optionally
//! hands it to `zig build-exe`.
//!
//! Usage:
//!   pyzig build input.ast.json -o program
//!   pyzig build input.ast.json --emit-zig
//!   pyzig build input.ast.json --stats

use std::env;
use std::fs;
use std::path::Path;
use std::process;
use std::process::Command;

use pyzig::compile_json;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command-line arguments
#[derive(Debug)]
struct Args {
    /// Input AST dump path
    input_file: Option<String>,
    /// Output binary path
    output_file: Option<String>,
    /// Stop after writing the Zig source
    emit_zig_only: bool,
    /// Show translation statistics
    show_stats: bool,
    show_help: bool,
    show_version: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut parsed = Args {
            input_file: None,
            output_file: None,
            emit_zig_only: false,
            show_stats: false,
            show_help: false,
            show_version: false,
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-h" | "--help" => parsed.show_help = true,
                "-v" | "--version" => parsed.show_version = true,
                "-o" | "--output" => {
                    i += 1;
                    if i < args.len() {
                        parsed.output_file = Some(args[i].clone());
                    }
                }
                "--emit-zig" => parsed.emit_zig_only = true,
                "--stats" => parsed.show_stats = true,
                "build" => {}
                arg if !arg.starts_with('-') => {
                    if parsed.input_file.is_none() {
                        parsed.input_file = Some(arg.to_string());
                    }
                }
                _ => {
                    eprintln!("Unknown option: {}", args[i]);
                }
            }
            i += 1;
        }

        parsed
    }
}

fn print_help() {
    println!(
        r#"pyzig v{}

USAGE:
    pyzig build <input.ast.json> [OPTIONS]

OPTIONS:
    -h, --help       Show this help message
    -v, --version    Show version information
    -o, --output     Output binary path (default: <input> stem)
    --emit-zig       Stop after writing the Zig source file
    --stats          Show translation statistics

INPUT:
    The input is a JSON dump of the Python AST, produced by the frontend
    helper around Python's `ast` module.

GENERATED CODE:
    The output is a Zig source file compiled with:

    zig build-exe <output>.zig
"#,
        VERSION
    );
}

fn main() {
    let args = Args::parse();

    if args.show_help {
        print_help();
        return;
    }
    if args.show_version {
        println!("pyzig v{}", VERSION);
        return;
    }

    let Some(input_file) = &args.input_file else {
        eprintln!("Error: no input file provided");
        eprintln!("Use --help for usage information");
        process::exit(1);
    };
    if !Path::new(input_file).exists() {
        eprintln!("Error: file '{}' not found", input_file);
        process::exit(1);
    }

    let source = match fs::read_to_string(input_file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading '{}': {}", input_file, e);
            process::exit(1);
        }
    };

    let output = match compile_json(&source) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Translation error: {}", e);
            process::exit(1);
        }
    };

    let stem = args.output_file.clone().unwrap_or_else(|| {
        Path::new(input_file)
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    });
    let zig_file = format!("{}.zig", stem);

    if let Err(e) = fs::write(&zig_file, &output.zig_code) {
        eprintln!("Error writing '{}': {}", zig_file, e);
        process::exit(1);
    }
    println!("Generated: {}", zig_file);

    if args.show_stats {
        println!();
        println!("Statistics:");
        println!("  Functions emitted: {}", output.stats.functions_emitted);
        println!("  Classes emitted: {}", output.stats.classes_emitted);
        println!("  Lambdas hoisted: {}", output.stats.lambdas_hoisted);
        println!(
            "  Closures synthesized: {}",
            output.stats.closures_synthesized
        );
        println!("  BigInt routes: {}", output.stats.bigint_routes);
        println!(
            "  Literals (comptime/runtime): {}/{}",
            output.stats.comptime_literals, output.stats.runtime_literals
        );
        println!("  Type inferences: {}", output.stats.type_inferences);
    }

    if !output.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &output.warnings {
            println!("  - {}", warning);
        }
    }

    if !args.emit_zig_only {
        // Fire and forget: the target compiler owns its own diagnostics.
        match Command::new("zig")
            .arg("build-exe")
            .arg(&zig_file)
            .arg(format!("-femit-bin={}", stem))
            .spawn()
        {
            Ok(_) => println!("Spawned: zig build-exe {}", zig_file),
            Err(e) => {
                eprintln!("Could not spawn the Zig compiler: {}", e);
                eprintln!("Compile manually with: zig build-exe {}", zig_file);
            }
        }
    }
}
