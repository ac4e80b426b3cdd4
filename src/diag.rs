//! Diagnostics reporting.
//!
//! Every stage of the pipeline reports problems through the [`ErrorReporter`]
//! capability.  Positions are byte offsets into the original source; the
//! console implementation converts them to 1-based line/column pairs and
//! prints a short source snippet with a caret underline.

/// Capability consumed by the scanner, parser and evaluator to surface
/// diagnostics without knowing how they are rendered.
pub trait ErrorReporter {
    fn error(&mut self, offset: usize, length: usize, location: &str, message: &str);
    fn runtime_error(&mut self, offset: usize, length: usize, location: &str, message: &str);
    fn warn(&mut self, offset: usize, length: usize, location: &str, message: &str);

    fn num_errors(&self) -> usize;
    fn num_warnings(&self) -> usize;
}

/// Reporter printing to standard output in
/// `location:line:column: message` format, followed by a snippet of roughly
/// ten characters of context on either side of the offending span.
#[derive(Debug)]
pub struct ConsoleReporter<'s> {
    source: &'s str,
    num_errors: usize,
    num_warnings: usize,
}

/// Context characters shown on each side of the offending span.
const SNIPPET_CONTEXT: usize = 10;

impl<'s> ConsoleReporter<'s> {
    pub fn new(source: &'s str) -> ConsoleReporter<'s> {
        ConsoleReporter {
            source,
            num_errors: 0,
            num_warnings: 0,
        }
    }

    fn line_and_column(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.source.len());
        let line = self.source[..offset].matches('\n').count() + 1;
        let line_start = self.source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = self.source[line_start..offset].chars().count() + 1;
        (line, column)
    }

    fn print_diagnostic(&self, offset: usize, length: usize, location: &str, message: &str) {
        let offset = offset.min(self.source.len());
        let (line, column) = self.line_and_column(offset);
        println!("{}:{}:{}: {}", location, line, column, message);

        // Window of SNIPPET_CONTEXT characters before and after the span,
        // clipped to the enclosing line.
        let line_start = self.source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = self.source[offset..]
            .find('\n')
            .map(|i| offset + i)
            .unwrap_or(self.source.len());

        let before: String = self.source[line_start..offset]
            .chars()
            .rev()
            .take(SNIPPET_CONTEXT)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let after: String = self.source[offset..line_end]
            .chars()
            .take(length + SNIPPET_CONTEXT)
            .collect();

        println!("{}{}", before, after);
        println!(
            "{}{}",
            " ".repeat(before.chars().count()),
            "^".repeat(length.max(1))
        );
    }
}

impl ErrorReporter for ConsoleReporter<'_> {
    fn error(&mut self, offset: usize, length: usize, location: &str, message: &str) {
        self.num_errors += 1;
        self.print_diagnostic(offset, length, location, message);
    }

    fn runtime_error(&mut self, offset: usize, length: usize, location: &str, message: &str) {
        self.num_errors += 1;
        self.print_diagnostic(offset, length, location, message);
    }

    fn warn(&mut self, offset: usize, length: usize, location: &str, message: &str) {
        self.num_warnings += 1;
        self.print_diagnostic(offset, length, location, message);
    }

    fn num_errors(&self) -> usize {
        self.num_errors
    }

    fn num_warnings(&self) -> usize {
        self.num_warnings
    }
}

/// Reporter recording diagnostics in memory, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct TestReporter {
    pub diagnostics: Vec<Diagnostic>,
    num_warnings: usize,
}

#[cfg(test)]
#[derive(Debug, PartialEq)]
pub(crate) struct Diagnostic {
    pub offset: usize,
    pub length: usize,
    pub location: String,
    pub message: String,
    pub is_runtime: bool,
}

#[cfg(test)]
impl TestReporter {
    pub fn new() -> TestReporter {
        TestReporter::default()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.diagnostics.iter().map(|d| d.message.as_str()).collect()
    }

    fn record(&mut self, offset: usize, length: usize, location: &str, message: &str, is_runtime: bool) {
        self.diagnostics.push(Diagnostic {
            offset,
            length,
            location: location.to_string(),
            message: message.to_string(),
            is_runtime,
        });
    }
}

#[cfg(test)]
impl ErrorReporter for TestReporter {
    fn error(&mut self, offset: usize, length: usize, location: &str, message: &str) {
        self.record(offset, length, location, message, false);
    }

    fn runtime_error(&mut self, offset: usize, length: usize, location: &str, message: &str) {
        self.record(offset, length, location, message, true);
    }

    fn warn(&mut self, offset: usize, length: usize, location: &str, message: &str) {
        self.num_warnings += 1;
        self.record(offset, length, location, message, false);
    }

    fn num_errors(&self) -> usize {
        self.diagnostics.len() - self.num_warnings
    }

    fn num_warnings(&self) -> usize {
        self.num_warnings
    }
}
