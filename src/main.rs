use ember_lang::{
    diagnostics,
    language::{
        errors::{SyntaxError, SyntaxErrors},
        lexer::lex,
        parser::parse_program,
    },
    runtime::{
        symbols::{ScopeId, SymbolTable},
        Interpreter,
    },
};
use std::env;
use std::fs;
use std::io::{self, BufWriter};
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: ember [run|check|tokens] <filename.ember>";

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() != 3 {
        eprintln!("{USAGE}");
        process::exit(1);
    }

    let command = args[1].as_str();
    let path = Path::new(&args[2]);

    if !matches!(command, "run" | "check" | "tokens") {
        eprintln!("Invalid command. {USAGE}");
        process::exit(1);
    }
    if path.extension().and_then(|ext| ext.to_str()) != Some("ember") {
        eprintln!("Invalid file extension. Only .ember files are allowed.");
        process::exit(1);
    }

    init_tracing();

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            diagnostics::report_io_error(path, &err);
            process::exit(1);
        }
    };

    let succeeded = match command {
        "run" => run(path, &source),
        "check" => check(path, &source),
        _ => tokens(path, &source),
    };
    if !succeeded {
        process::exit(1);
    }
}

/// `EMBER_LOG` takes an `EnvFilter` directive; defaults to `warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("EMBER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn plain_diagnostics() -> bool {
    env::var("EMBER_PLAIN_DIAGNOSTICS").is_ok_and(|value| value == "1")
}

fn load(path: &Path, source: &str) -> Option<SymbolTable> {
    let program = match parse_program(source) {
        Ok(program) => program,
        Err(errors) => {
            diagnostics::emit_syntax_errors(path, source, &errors);
            return None;
        }
    };
    match SymbolTable::from_program(&program) {
        Ok(symbols) => Some(symbols),
        Err(err) => {
            diagnostics::report_runtime_error(path, source, &err, plain_diagnostics());
            None
        }
    }
}

fn run(path: &Path, source: &str) -> bool {
    let Some(symbols) = load(path, source) else {
        return false;
    };
    let stdout = io::stdout();
    let mut interpreter = Interpreter::new(symbols, BufWriter::new(stdout.lock()));
    let result = interpreter
        .init_global_variables()
        .and_then(|_| interpreter.run());
    drop(interpreter);
    match result {
        Ok(_) => true,
        Err(err) => {
            diagnostics::report_runtime_error(path, source, &err, plain_diagnostics());
            false
        }
    }
}

fn check(path: &Path, source: &str) -> bool {
    let Some(symbols) = load(path, source) else {
        return false;
    };
    let scopes = symbols
        .depth_first()
        .into_iter()
        .filter(|id| *id != ScopeId::ROOT)
        .count();
    println!(
        "{}: ok ({} namespaces/classes, {} top-level functions)",
        path.display(),
        scopes,
        symbols.node(ScopeId::ROOT).functions.len()
    );
    true
}

fn tokens(path: &Path, source: &str) -> bool {
    match lex(source) {
        Ok(tokens) => {
            for token in tokens {
                println!("{:<10} {}", token.span.to_string(), token.kind);
            }
            true
        }
        Err(errors) => {
            let errors = SyntaxErrors::new(errors.into_iter().map(SyntaxError::from).collect());
            diagnostics::emit_syntax_errors(path, source, &errors);
            false
        }
    }
}
