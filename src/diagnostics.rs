use crate::{
    language::{
        errors::{SyntaxError, SyntaxErrors},
        span::Span,
    },
    runtime::error::RuntimeError,
};
use miette::{Diagnostic, LabeledSpan, NamedSource, Report, SourceCode, SourceSpan};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(ember::syntax))]
pub struct SyntaxDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
}

impl SyntaxDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: &SyntaxError) -> Self {
        Self {
            src,
            span: err.to_source_span(),
            help: err.help.clone(),
            message: err.message.clone(),
        }
    }
}

/// Owned snapshot of a [`RuntimeError`] together with the program text.
#[derive(Debug)]
pub struct RuntimeDiagnostic {
    src: NamedSource<String>,
    message: String,
    code: &'static str,
    help: Option<String>,
    labels: Vec<(String, Span)>,
}

impl RuntimeDiagnostic {
    pub fn new(name: &str, source: &str, error: &RuntimeError) -> Self {
        let mut labels = Vec::new();
        if let Some(span) = error.span() {
            let label = match error {
                RuntimeError::UndefinedFunction { .. } | RuntimeError::ArityMismatch { .. } => {
                    "called here"
                }
                RuntimeError::DuplicateDeclaration { .. } => "declared again here",
                RuntimeError::CircularReference { .. } => "read while it is being initialized",
                _ => "here",
            };
            labels.push((label.to_string(), span));
        }
        if let RuntimeError::CircularReference { declared, .. } = error {
            labels.push(("declared here".to_string(), *declared));
        }
        Self {
            src: NamedSource::new(name, source.to_string()),
            message: error.to_string(),
            code: error.code(),
            help: error.help(),
            labels,
        }
    }
}

impl fmt::Display for RuntimeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RuntimeDiagnostic {}

impl Diagnostic for RuntimeDiagnostic {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|help| Box::new(help) as Box<dyn fmt::Display + 'a>)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        if self.labels.is_empty() {
            return None;
        }
        Some(Box::new(self.labels.iter().map(|(label, span)| {
            LabeledSpan::new_with_span(Some(label.clone()), SourceSpan::from(*span))
        })))
    }
}

/// `message:`, the offending line, then carets under the faulting range.
pub fn render_caret(message: &str, source: &str, span: Span) -> String {
    let location = span.location(source);
    let width = location.end_column.saturating_sub(location.column).max(1);
    format!(
        "{message}:\n{}\n{}{}\n",
        span.line_text(source),
        " ".repeat(location.column),
        "^".repeat(width)
    )
}

pub fn render_runtime_error(name: &str, source: &str, error: &RuntimeError, plain: bool) -> String {
    if plain {
        return match error.span() {
            Some(span) => render_caret(&error.to_string(), source, span),
            None => format!("{error}\n"),
        };
    }
    format!("{:?}", Report::new(RuntimeDiagnostic::new(name, source, error)))
}

pub fn emit_syntax_errors(path: &Path, source: &str, errors: &SyntaxErrors) {
    let src = NamedSource::new(path.display().to_string(), source.to_string());
    for err in &errors.errors {
        let diagnostic = SyntaxDiagnostic::from_error(src.clone(), err);
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

pub fn report_runtime_error(path: &Path, source: &str, error: &RuntimeError, plain: bool) {
    eprint!(
        "{}",
        render_runtime_error(&path.display().to_string(), source, error, plain)
    );
}

pub fn report_io_error(path: &Path, error: &std::io::Error) {
    eprintln!("Failed to access {}: {}", path.display(), error);
}
