use miette::SourceSpan;
use std::fmt;

/// Byte range into the program text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn union(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }

    /// Zero-based line and column of `start`, plus the column where the span
    /// stops on that same line.
    pub fn location(&self, source: &str) -> Location {
        let start = self.start.min(source.len());
        let line_start = line_start(source, start);
        let line_end = line_end(source, start);
        let line = source[..line_start]
            .bytes()
            .filter(|byte| *byte == b'\n')
            .count();
        let column = source[line_start..start].chars().count();
        let stop = self.end.clamp(start, line_end);
        let end_column = column + source[start..stop].chars().count();
        Location {
            line,
            column,
            end_column,
        }
    }

    /// The full source line containing `start`, without its line terminator.
    pub fn line_text<'a>(&self, source: &'a str) -> &'a str {
        let start = self.start.min(source.len());
        &source[line_start(source, start)..line_end(source, start)]
    }
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        (span.start, span.len()).into()
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    pub end_column: usize,
}

fn line_start(source: &str, offset: usize) -> usize {
    source[..offset]
        .rfind(['\n', '\r'])
        .map(|idx| idx + 1)
        .unwrap_or(0)
}

fn line_end(source: &str, offset: usize) -> usize {
    source[offset..]
        .find(['\n', '\r'])
        .map(|idx| offset + idx)
        .unwrap_or(source.len())
}
