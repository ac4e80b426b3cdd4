//! Ties the pipeline together: scan, parse, evaluate.

use std::io::Write;

use crate::diag::{ConsoleReporter, ErrorReporter};
use crate::eval::Evaluator;
use crate::parser::Parser;
use crate::scanner::Scanner;

/// Runs source programs, writing their output to `output`.
///
/// # Example
///
/// ```
/// use kolox::interpreter::Interpreter;
///
/// let mut output = vec![];
/// Interpreter::new(&mut output).run("demo", "print(1 + 2)");
/// assert_eq!(String::from_utf8(output).unwrap(), "3\n");
/// ```
#[derive(Debug)]
pub struct Interpreter<'t, W: Write> {
    output: &'t mut W,
}

impl<'t, W: Write> Interpreter<'t, W> {
    pub fn new(output: &'t mut W) -> Interpreter<'t, W> {
        Interpreter { output }
    }

    /// Runs `source`, reporting diagnostics to standard output.  `location`
    /// names the source in diagnostics ("REPL" or a file path).
    pub fn run(&mut self, location: &str, source: &str) {
        let mut reporter = ConsoleReporter::new(source);
        self.run_with_reporter(location, source, &mut reporter);
    }

    pub fn run_with_reporter(
        &mut self,
        location: &str,
        source: &str,
        reporter: &mut dyn ErrorReporter,
    ) {
        let tokens = Scanner::new(location, source, reporter).scan_tokens();
        let statements = Parser::new(tokens, reporter).parse();
        // A program that failed to parse is not worth running.
        if reporter.num_errors() > 0 {
            return;
        }

        let mut evaluator = Evaluator::new(&mut *self.output);
        if let Err(error) = evaluator.interpret(&statements) {
            let token = &error.token;
            reporter.runtime_error(
                token.offset,
                token.length().max(1),
                &token.location,
                &error.kind.to_string(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::TestReporter;
    use pretty_assertions::assert_eq;

    fn run(input: &str) -> (String, TestReporter) {
        let mut reporter = TestReporter::new();
        let mut output = vec![];
        Interpreter::new(&mut output).run_with_reporter("test", input, &mut reporter);
        (String::from_utf8(output).unwrap(), reporter)
    }

    fn run_ok(input: &str) -> String {
        let (output, reporter) = run(input);
        assert!(
            reporter.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            reporter.diagnostics
        );
        output
    }

    #[test]
    fn arithmetic_pipeline() {
        assert_eq!(run_ok("print(1 + 2 * 3)"), "7\n");
    }

    #[test]
    fn range_and_loop() {
        let input = "\
var total = 0
for (n in 0..9) { total = total + n }
print(total)";
        assert_eq!(run_ok(input), "45\n");
    }

    #[test]
    fn map_filter_fold_pipeline() {
        let input = "\
var result = (1..10).map { it * it }.filter { it > 50 }.fold(fun(acc, x) { acc + x }, 0)
print(result)";
        assert_eq!(run_ok(input), "245\n");
    }

    #[test]
    fn string_processing() {
        let input = "\
var words = \"one,two,three\".split(\",\")
print(words.length + \" words, first is \" + words[0])";
        assert_eq!(run_ok(input), "3 words, first is one\n");
    }

    #[test]
    fn slicing() {
        assert_eq!(run_ok("print([10, 20, 30, 40][1:3])"), "[20, 30]\n");
        assert_eq!(run_ok("print([10, 20, 30, 40][:2])"), "[10, 20]\n");
        assert_eq!(run_ok("print([10, 20, 30, 40][1:])"), "[20, 30, 40]\n");
    }

    #[test]
    fn when_expression() {
        let input = "\
var b = \"foo\"
var q = when(b) {
    \"foo\" -> \"bar\"
    else -> \"default\"
}
print(q)";
        assert_eq!(run_ok(input), "bar\n");
    }

    #[test]
    fn elvis_and_safe_navigation() {
        assert_eq!(run_ok("print(nil?.length ?: \"none\")"), "none\n");
    }

    #[test]
    fn closures_and_higher_order_functions() {
        let input = "\
fun adder(n) {
    return fun(x) { x + n }
}
var add2 = adder(2)
print(add2(40))";
        assert_eq!(run_ok(input), "42\n");
    }

    #[test]
    fn statements_share_the_top_level_scope() {
        assert_eq!(run_ok("var a = 1\na = a + 1\nprint(a)"), "2\n");
    }

    #[test]
    fn syntax_error_suppresses_execution() {
        let (output, reporter) = run("print(1)\nvar = oops");
        assert_eq!(output, "");
        assert_eq!(reporter.num_errors(), 1);
    }

    #[test]
    fn runtime_error_is_reported_at_the_failing_token() {
        let (output, reporter) = run("print(1)\nprint(1 / 0)");
        // Output up to the failure is kept.
        assert_eq!(output, "1\n");
        assert_eq!(reporter.messages(), vec!["Division by zero"]);
        assert!(reporter.diagnostics[0].is_runtime);
    }

    #[test]
    fn runtime_error_halts_remaining_statements() {
        let (output, _) = run("ghost\nprint(2)");
        assert_eq!(output, "");
    }

    #[test]
    fn scan_error_suppresses_execution() {
        let (output, reporter) = run("print(1) ? 2");
        assert_eq!(output, "");
        assert!(reporter.num_errors() > 0);
    }
}
