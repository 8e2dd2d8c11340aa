//! Command-line argument parsing.
//!
//! Usage:
//!   xpress [-d] [-t<ms>] [-a|-j] [-D name=value]... [-f <file> | <template>]
//!
//! With neither `-f` nor a template argument, the template is read from
//! stdin.

use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Evaluation timeout override (`-t<ms>`).
    pub timeout: Option<Duration>,
    /// What to print.
    pub output: OutputMode,
    /// String members (`-D name=value`), in command-line order.
    pub defines: Vec<(String, String)>,
    /// Where the template comes from.
    pub source: Source,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Evaluate and print the result (default).
    #[default]
    Evaluate,
    /// Print the parenthesized AST (`-a`).
    Lisp,
    /// Print the JSON AST (`-j`).
    Json,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum Source {
    #[default]
    Stdin,
    /// `-f <file>`.
    File(PathBuf),
    /// Positional template text.
    Inline(String),
}

impl Source {
    pub fn read(&self) -> io::Result<String> {
        match self {
            Source::Stdin => {
                let mut buf = String::new();
                io::stdin().read_to_string(&mut buf)?;
                Ok(buf)
            }
            Source::File(path) => std::fs::read_to_string(path)
                .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display()))),
            Source::Inline(text) => Ok(text.clone()),
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'a' => args.output = OutputMode::Lisp,
                'j' => args.output = OutputMode::Json,

                // Options taking a value: embedded (-t5) or separate (-t 5).
                opt @ ('t' | 'D' | 'f') => {
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err(format!("-{opt} requires an argument"));
                    };
                    match opt {
                        't' => {
                            let ms: u64 = value
                                .parse()
                                .map_err(|_| format!("invalid timeout: {value}"))?;
                            args.timeout = Some(Duration::from_millis(ms));
                        }
                        'D' => {
                            let (name, val) = value
                                .split_once('=')
                                .ok_or_else(|| format!("expected name=value, got: {value}"))?;
                            if name.is_empty() {
                                return Err(format!("empty member name in: {value}"));
                            }
                            args.defines.push((name.to_owned(), val.to_owned()));
                        }
                        _ => args.source = Source::File(PathBuf::from(value)),
                    }
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 => {}
        1 if args.source == Source::Stdin => {
            args.source = Source::Inline(positional.remove(0));
        }
        1 => return Err("cannot combine -f with a template argument".to_owned()),
        n => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn empty_args_read_stdin() {
        let a = parse_argv(&argv(&[])).unwrap();
        assert_eq!(a.source, Source::Stdin);
        assert_eq!(a.output, OutputMode::Evaluate);
        assert!(a.timeout.is_none());
    }

    #[test]
    fn inline_template() {
        let a = parse_argv(&argv(&["@{{ 1 + 1 }}"])).unwrap();
        assert_eq!(a.source, Source::Inline("@{{ 1 + 1 }}".into()));
    }

    #[test]
    fn bool_flags_combine() {
        let a = parse_argv(&argv(&["-dj"])).unwrap();
        assert!(a.debug);
        assert_eq!(a.output, OutputMode::Json);
        let a = parse_argv(&argv(&["-a"])).unwrap();
        assert_eq!(a.output, OutputMode::Lisp);
    }

    #[test]
    fn timeout_embedded_and_separate() {
        let a = parse_argv(&argv(&["-t50"])).unwrap();
        assert_eq!(a.timeout, Some(Duration::from_millis(50)));
        let a = parse_argv(&argv(&["-t", "7"])).unwrap();
        assert_eq!(a.timeout, Some(Duration::from_millis(7)));
        assert!(parse_argv(&argv(&["-tx"])).is_err());
    }

    #[test]
    fn defines_accumulate() {
        let a = parse_argv(&argv(&["-Dname=Ada", "-D", "greeting=hi=there"])).unwrap();
        assert_eq!(
            a.defines,
            vec![
                ("name".to_owned(), "Ada".to_owned()),
                ("greeting".to_owned(), "hi=there".to_owned()),
            ]
        );
        assert!(parse_argv(&argv(&["-Dnoequals"])).is_err());
        assert!(parse_argv(&argv(&["-D=x"])).is_err());
    }

    #[test]
    fn file_source() {
        let a = parse_argv(&argv(&["-f", "t.tmpl"])).unwrap();
        assert_eq!(a.source, Source::File(PathBuf::from("t.tmpl")));
        assert!(parse_argv(&argv(&["-ft.tmpl", "inline"])).is_err());
    }

    #[test]
    fn missing_value() {
        let err = parse_argv(&argv(&["-t"])).unwrap_err();
        assert_eq!(err, "-t requires an argument");
    }

    #[test]
    fn unknown_flag() {
        assert_eq!(parse_argv(&argv(&["-x"])).unwrap_err(), "unknown option: -x");
    }

    #[test]
    fn double_dash_ends_flags() {
        let a = parse_argv(&argv(&["--", "-not-a-flag"])).unwrap();
        assert_eq!(a.source, Source::Inline("-not-a-flag".into()));
    }

    #[test]
    fn too_many_positionals() {
        assert!(parse_argv(&argv(&["a", "b"])).is_err());
    }
}
