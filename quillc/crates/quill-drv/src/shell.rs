//! The interactive shell.
//!
//! Reads statements terminated by `;` at end of line (multiline input
//! accumulates), runs each through the session, prints one
//! `val NAME = VALUE : TYPE` line per binding, and keeps going after
//! errors. The prompt is `- ` on a fresh statement and `= ` on a
//! continuation line; a dumb terminal suppresses prompts.
//!
//! `use "file"` runs a source file as a sub-shell against the same
//! session. Depth is capped by `maxUseDepth`; exceeding the cap, like
//! any unreadable file, surfaces as an `openIn failed` I/O error. An
//! uncaught runtime exception inside a `use`d file unwinds out of the
//! sub-shell, aborting the rest of the file, and the outer prompt
//! continues.
//!
//! `quit;` or end of input terminates.

use crate::config::Config;
use crate::session::{Session, SessionError, StatementOutcome};
use quill_par::ast::{ExprKind, Literal, Statement};
use quill_par::Parser;
use quill_util::{FileId, Level, Pos};
use std::io::{BufRead, Write};

/// The REPL driver
pub struct Shell {
    pub session: Session,
    use_depth: i32,
}

/// Why a statement sequence stopped early
enum Abort {
    /// An error was printed; the current input unit is abandoned
    Statement,
}

impl Shell {
    pub fn new(config: Config) -> Self {
        Self {
            session: Session::new(config),
            use_depth: 0,
        }
    }

    /// Interactive loop; returns the process exit code
    pub fn run(&mut self, input: &mut dyn BufRead, output: &mut dyn Write) -> i32 {
        if self.session.config.banner {
            let _ = writeln!(output, "quill version {}", env!("CARGO_PKG_VERSION"));
        }
        let mut buffer = String::new();
        loop {
            self.prompt(output, buffer.is_empty());
            let mut line = String::new();
            match input.read_line(&mut line) {
                Ok(0) => return 0, // EOF
                Ok(_) => {}
                Err(_) => return 1,
            }
            let trimmed = line.trim_end();
            if buffer.is_empty() && trimmed.trim() == "quit;" {
                return 0;
            }
            if buffer.is_empty() && trimmed.trim().is_empty() {
                continue;
            }
            buffer.push_str(&line);
            if !trimmed.trim_end().ends_with(';') {
                continue;
            }
            let source = std::mem::take(&mut buffer);
            let file_id = self.session.add_source("stdIn", &source);
            let _ = self.run_source(&source, file_id, output);
        }
    }

    fn prompt(&self, output: &mut dyn Write, fresh: bool) {
        if self.session.config.terminal_dumb {
            return;
        }
        let _ = write!(output, "{} ", if fresh { "-" } else { "=" });
        let _ = output.flush();
    }

    /// Run every statement in a source unit; errors abort the unit
    pub fn run_source(
        &mut self,
        source: &str,
        file_id: FileId,
        output: &mut dyn Write,
    ) -> Result<(), i32> {
        match self.run_statements(source, file_id, output) {
            Ok(()) => Ok(()),
            Err(Abort::Statement) => Err(1),
        }
    }

    fn run_statements(
        &mut self,
        source: &str,
        file_id: FileId,
        output: &mut dyn Write,
    ) -> Result<(), Abort> {
        let tokens = match quill_lex::tokenize(source, file_id) {
            Ok(tokens) => tokens,
            Err(error) => {
                self.print_error(output, error.pos, &error.to_string());
                return Err(Abort::Statement);
            }
        };
        let mut parser = Parser::new(tokens);
        loop {
            let statement = match parser.parse_statement() {
                Ok(Some(statement)) => statement,
                Ok(None) => return Ok(()),
                Err(error) => {
                    self.print_error(output, error.pos(), &error.to_string());
                    return Err(Abort::Statement);
                }
            };
            if let Some(path) = as_use(&statement) {
                self.run_use(&path, statement.pos(), output)?;
                continue;
            }
            if self.session.config.echo {
                let _ = writeln!(output, "{};", quill_par::unparse::statement(&statement));
            }
            match self.session.execute(&statement) {
                Ok(outcome) => self.print_outcome(output, &outcome),
                Err(SessionError::Runtime(raise)) => {
                    let _ = writeln!(output, "uncaught exception {}", raise.exn);
                    for pos in &raise.trace {
                        let file = self.session.source_map.name_of(pos.file_id).to_string();
                        let _ = writeln!(output, "  raised at: {}:{}", file, pos);
                    }
                    return Err(Abort::Statement);
                }
                Err(error) => {
                    self.print_error(output, error.pos(), &error.to_string());
                    return Err(Abort::Statement);
                }
            }
        }
    }

    /// `use "file"`: run the file as a sub-shell of this session
    fn run_use(
        &mut self,
        path: &str,
        pos: Pos,
        output: &mut dyn Write,
    ) -> Result<(), Abort> {
        let max = self.session.config.max_use_depth;
        if max >= 0 && self.use_depth >= max {
            self.print_error(
                output,
                pos,
                &format!("Io: openIn failed on \"{}\": Too many open files", path),
            );
            return Err(Abort::Statement);
        }
        let full_path = self.session.config.directory.join(path);
        let content = match std::fs::read_to_string(&full_path) {
            Ok(content) => content,
            Err(error) => {
                self.print_error(
                    output,
                    pos,
                    &format!("Io: openIn failed on \"{}\": {}", path, error),
                );
                return Err(Abort::Statement);
            }
        };
        let _ = writeln!(output, "[opening {}]", path);
        let file_id = self.session.add_source(path, &content);
        self.use_depth += 1;
        let result = self.run_statements(&content, file_id, output);
        self.use_depth -= 1;
        result
    }

    fn print_outcome(&self, output: &mut dyn Write, outcome: &StatementOutcome) {
        for warning in &outcome.warnings {
            if warning.level == Level::Warning {
                let file = self
                    .session
                    .source_map
                    .name_of(warning.pos.file_id)
                    .to_string();
                let _ = writeln!(
                    output,
                    "{}:{} Warning: {}",
                    file, warning.pos, warning.message
                );
            }
        }
        for binding in &outcome.printed {
            let _ = writeln!(
                output,
                "val {} = {} : {}",
                binding.name, binding.value, binding.ty
            );
        }
    }

    fn print_error(&self, output: &mut dyn Write, pos: Pos, message: &str) {
        let file = self.session.source_map.name_of(pos.file_id).to_string();
        let _ = writeln!(output, "{}:{} Error: {}", file, pos, message);
    }
}

/// Recognize the `use "file"` form
fn as_use(statement: &Statement) -> Option<String> {
    if let Statement::Expr(exp) = statement {
        if let ExprKind::Apply(f, arg) = &exp.kind {
            if let (ExprKind::Id(name), ExprKind::Lit(Literal::Str(path))) =
                (&f.kind, &arg.kind)
            {
                if name.eq_str("use") {
                    return Some(path.clone());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dumb_shell() -> Shell {
        Shell::new(Config {
            banner: false,
            terminal_dumb: true,
            ..Config::default()
        })
    }

    fn run_input(shell: &mut Shell, input: &str) -> String {
        let mut output = Vec::new();
        let mut reader = std::io::BufReader::new(input.as_bytes());
        let code = shell.run(&mut reader, &mut output);
        assert_eq!(code, 0);
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_simple_statement() {
        let mut shell = dumb_shell();
        let output = run_input(&mut shell, "1 + 2;\n");
        assert_eq!(output, "val it = 3 : int\n");
    }

    #[test]
    fn test_multiline_accumulation() {
        let mut shell = dumb_shell();
        let output = run_input(&mut shell, "1 +\n2;\n");
        assert_eq!(output, "val it = 3 : int\n");
    }

    #[test]
    fn test_bindings_thread_through() {
        let mut shell = dumb_shell();
        let output = run_input(&mut shell, "val x = 2;\nval y = x * 3;\ny;\n");
        assert!(output.contains("val x = 2 : int"));
        assert!(output.contains("val y = 6 : int"));
        assert!(output.contains("val it = 6 : int"));
    }

    #[test]
    fn test_error_then_continue() {
        let mut shell = dumb_shell();
        let output = run_input(&mut shell, "val x = nope;\n1 + 1;\n");
        assert!(output.contains("stdIn:"));
        assert!(output.contains("Error: unbound variable or constructor: nope"));
        assert!(output.contains("val it = 2 : int"));
    }

    #[test]
    fn test_uncaught_exception_format() {
        let mut shell = dumb_shell();
        let output = run_input(&mut shell, "1 div 0;\n1;\n");
        assert!(output.contains("uncaught exception Div"));
        assert!(output.contains("  raised at: stdIn:"));
        assert!(output.contains("val it = 1 : int"));
    }

    #[test]
    fn test_nonexhaustive_warning_format() {
        let mut shell = dumb_shell();
        let output = run_input(&mut shell, "fun f 1 = 0;\nf 1;\nf 2;\n");
        assert!(output.contains("Warning: match nonexhaustive"));
        assert!(output.contains("val it = 0 : int"));
        assert!(output.contains("uncaught exception Bind"));
    }

    #[test]
    fn test_quit() {
        let mut shell = dumb_shell();
        let output = run_input(&mut shell, "val x = 1;\nquit;\nval y = 2;\n");
        assert!(output.contains("val x = 1 : int"));
        assert!(!output.contains("val y"));
    }

    #[test]
    fn test_prompts_when_interactive() {
        let mut shell = Shell::new(Config {
            banner: false,
            terminal_dumb: false,
            ..Config::default()
        });
        let mut output = Vec::new();
        let mut reader = std::io::BufReader::new("1 +\n1;\n".as_bytes());
        shell.run(&mut reader, &mut output);
        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("- "));
        assert!(text.contains("= "));
    }

    #[test]
    fn test_echo_mode() {
        let mut shell = Shell::new(Config {
            banner: false,
            terminal_dumb: true,
            echo: true,
            ..Config::default()
        });
        let output = run_input(&mut shell, "1+2;\n");
        assert!(output.contains("1 + 2;"));
        assert!(output.contains("val it = 3 : int"));
    }

    #[test]
    fn test_use_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.ql"), "val lib = 41;\n").unwrap();
        let mut shell = Shell::new(Config {
            banner: false,
            terminal_dumb: true,
            directory: dir.path().to_path_buf(),
            ..Config::default()
        });
        let output = run_input(&mut shell, "use \"lib.ql\";\nlib + 1;\n");
        assert!(output.contains("[opening lib.ql]"));
        assert!(output.contains("val lib = 41 : int"));
        assert!(output.contains("val it = 42 : int"));
    }

    #[test]
    fn test_use_missing_file() {
        let mut shell = dumb_shell();
        let output = run_input(&mut shell, "use \"nope.ql\";\n1;\n");
        assert!(output.contains("Error: Io: openIn failed on \"nope.ql\""));
        assert!(output.contains("val it = 1 : int"));
    }

    #[test]
    fn test_use_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        // A file that includes itself forever.
        std::fs::write(dir.path().join("loop.ql"), "use \"loop.ql\";\n").unwrap();
        let mut shell = Shell::new(Config {
            banner: false,
            terminal_dumb: true,
            directory: dir.path().to_path_buf(),
            max_use_depth: 3,
            ..Config::default()
        });
        let output = run_input(&mut shell, "use \"loop.ql\";\n1;\n");
        assert!(output.contains("Too many open files"));
        assert!(output.contains("val it = 1 : int"));
    }

    #[test]
    fn test_exception_in_use_unwinds_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("bad.ql"),
            "val a = 1;\nval b = 1 div 0;\nval c = 3;\n",
        )
        .unwrap();
        let mut shell = Shell::new(Config {
            banner: false,
            terminal_dumb: true,
            directory: dir.path().to_path_buf(),
            ..Config::default()
        });
        let output = run_input(&mut shell, "use \"bad.ql\";\n5;\n");
        assert!(output.contains("val a = 1 : int"));
        assert!(output.contains("uncaught exception Div"));
        // The rest of the file is abandoned, the REPL continues.
        assert!(!output.contains("val c"));
        assert!(output.contains("val it = 5 : int"));
    }

    #[test]
    fn test_banner() {
        let mut shell = Shell::new(Config {
            banner: true,
            terminal_dumb: true,
            ..Config::default()
        });
        let output = run_input(&mut shell, "");
        assert!(output.starts_with("quill version"));
    }
}
