//! Verbosity and color context for an invocation, threaded explicitly as
//! a `Console` value (rather than kept as process-global state) so tests
//! can construct independent instances.

use std::sync::OnceLock;

use regex::Regex;

/// Verbosity and color settings for the current invocation.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    verbosity: i32,
    color: bool,
}

impl Console {
    /// Build a console from the CLI's stacked `-q`/`-v` counters: the
    /// effective verbosity is `verbose_count - quiet_count`.
    pub fn new(verbose_count: u8, quiet_count: u8, color: bool) -> Console {
        Console { verbosity: verbose_count as i32 - quiet_count as i32, color }
    }

    /// A console with default verbosity (0) and color disabled, for tests
    /// and library embedding.
    pub fn silent() -> Console {
        Console { verbosity: -100, color: false }
    }

    /// Print `text` to stdout if `level <= self.verbosity`.
    pub fn print_at(&self, level: i32, text: &str) {
        if level <= self.verbosity {
            if self.color {
                println!("{}", stack_colors(text));
            } else {
                println!("{text}");
            }
        }
    }

    /// Whether messages at `level` would currently be printed.
    pub fn enabled_at(&self, level: i32) -> bool {
        level <= self.verbosity
    }

    /// Whether color output is enabled for this console.
    pub fn color_enabled(&self) -> bool {
        self.color
    }

    /// Print an error message to stderr, colored red when enabled.
    pub fn error(&self, text: &str) {
        eprintln!("{}", color::red(self.color, text));
    }
}

/// ANSI color helpers, each a no-op passthrough when color is disabled.
pub mod color {
    pub fn bold(enabled: bool, text: &str) -> String {
        wrap(enabled, "1", text)
    }
    pub fn red(enabled: bool, text: &str) -> String {
        wrap(enabled, "31", text)
    }
    pub fn green(enabled: bool, text: &str) -> String {
        wrap(enabled, "32", text)
    }
    pub fn yellow(enabled: bool, text: &str) -> String {
        wrap(enabled, "33", text)
    }
    pub fn cyan(enabled: bool, text: &str) -> String {
        wrap(enabled, "36", text)
    }

    fn wrap(enabled: bool, code: &str, text: &str) -> String {
        if enabled {
            format!("\x1b[{code}m{text}\x1b[m")
        } else {
            text.to_string()
        }
    }
}

fn escape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[([0-9;]*)m").unwrap())
}

/// Restructure SGI escapes so each reset (`\x1b[m`) restores the previous
/// color context instead of fully resetting: `"{red}foo{blue}bar{reset}baz"`
/// renders foo in red, bar in blue, then baz back in red.
pub fn stack_colors(input: &str) -> String {
    let re = escape_re();
    let mut output = String::new();
    let mut stack: Vec<String> = Vec::new();
    let mut rest = input;

    loop {
        let Some(m) = re.find(rest) else {
            output.push_str(rest);
            break;
        };
        output.push_str(&rest[..m.start()]);
        let caps = re.captures(rest).unwrap();
        let code = caps.get(1).unwrap().as_str().to_string();
        rest = &rest[m.end()..];

        let effective = if code.is_empty() {
            stack.pop();
            stack.last().cloned().unwrap_or_default()
        } else {
            stack.push(code.clone());
            code
        };
        output.push_str(&format!("\x1b[{effective}m"));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_restores_previous_color() {
        let input = "\x1b[31mfoo\x1b[34mbar\x1b[mbaz";
        let output = stack_colors(input);
        assert_eq!(output, "\x1b[31mfoo\x1b[34mbar\x1b[31mbaz");
    }

    #[test]
    fn no_escapes_passes_through() {
        assert_eq!(stack_colors("plain text"), "plain text");
    }

    #[test]
    fn verbosity_collapses_verbose_minus_quiet() {
        let console = Console::new(2, 1, false);
        assert!(console.enabled_at(1));
        assert!(!console.enabled_at(2));
    }

    #[test]
    fn color_helpers_are_noop_when_disabled() {
        assert_eq!(color::red(false, "x"), "x");
        assert_eq!(color::red(true, "x"), "\x1b[31mx\x1b[m");
    }
}
