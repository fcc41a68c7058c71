//! 命令行参数

use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use zboard_core::animation::PlaybackMode;

pub const USAGE: &str = "\
Usage: zboard [--config <file>] <command> [options]

Commands:
  build <instructions.json> [-o <out>]          Apply drawing instructions and save the board
  info <file>                                   Show entities and measurements of a board
  animate <file> --point <name> --path <a,b,..> Move a point along a path
        [--duration <ms>] [--mode single|loop|pingpong] [--closed] [--realtime] [-o <out>]
  plot <expr> [--from <x>] [--to <x>] [--resolution <n>] [--into <file>]
                                                Sample y = f(x) as CSV
  analyze <expr> [--with <expr>] [--from <x>] [--to <x>]
                                                Value range, extrema and intersections
  check <file> [--fix] [-o <out>]               Report duplicate, degenerate and orphaned entities
  ask <prompt> [--board <file>] [-o <out>]      Let the assistant draw on a board

Logging is controlled by RUST_LOG (default: info).";

/// 子命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Build {
        input: PathBuf,
        output: PathBuf,
    },
    Info {
        file: PathBuf,
    },
    Animate {
        file: PathBuf,
        point: String,
        path: Vec<String>,
        closed: bool,
        duration_ms: Option<u64>,
        mode: Option<PlaybackMode>,
        realtime: bool,
        output: Option<PathBuf>,
    },
    Plot {
        expression: String,
        from: Option<f64>,
        to: Option<f64>,
        resolution: Option<usize>,
        into: Option<PathBuf>,
    },
    Analyze {
        expression: String,
        with: Option<String>,
        from: Option<f64>,
        to: Option<f64>,
    },
    Check {
        file: PathBuf,
        fix: bool,
        output: Option<PathBuf>,
    },
    Ask {
        prompt: String,
        board: Option<PathBuf>,
        output: Option<PathBuf>,
    },
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cli {
    pub config: Option<PathBuf>,
    pub command: Command,
}

/// 不带值的开关
const SWITCHES: &[&str] = &["--closed", "--realtime", "--fix", "--help", "-h"];

/// 拆分后的参数
#[derive(Debug, Default)]
struct Args {
    positional: Vec<String>,
    options: HashMap<String, String>,
    switches: Vec<String>,
}

impl Args {
    fn split(tokens: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = Args::default();
        let mut tokens = tokens.into_iter();
        while let Some(token) = tokens.next() {
            let is_option = token.starts_with("--") || token == "-o" || token == "-h";
            if !is_option {
                args.positional.push(token);
            } else if SWITCHES.contains(&token.as_str()) {
                args.switches.push(token);
            } else {
                let value = tokens
                    .next()
                    .ok_or_else(|| anyhow!("option {token} needs a value"))?;
                let key = if token == "-o" { "--output".to_string() } else { token };
                args.options.insert(key, value);
            }
        }
        Ok(args)
    }

    fn switch(&self, name: &str) -> bool {
        self.switches.iter().any(|s| s == name)
    }

    fn take(&mut self, name: &str) -> Option<String> {
        self.options.remove(name)
    }

    fn take_parsed<T>(&mut self, name: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.take(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| anyhow!("invalid value '{raw}' for {name}: {e}"))
            })
            .transpose()
    }

    fn positional(&self, index: usize, what: &str) -> Result<String> {
        self.positional
            .get(index)
            .cloned()
            .with_context(|| format!("missing {what}"))
    }

    /// 剩余未识别的选项视为错误
    fn finish(self) -> Result<()> {
        if let Some(name) = self.options.keys().next() {
            bail!("unknown option {name}");
        }
        Ok(())
    }
}

/// 解析参数（不含程序名）
pub fn parse_args(tokens: impl IntoIterator<Item = String>) -> Result<Cli> {
    let mut args = Args::split(tokens)?;
    let config = args.take("--config").map(PathBuf::from);

    if args.switch("--help") || args.switch("-h") || args.positional.is_empty() {
        return Ok(Cli {
            config,
            command: Command::Help,
        });
    }

    let name = args.positional.remove(0);
    let command = match name.as_str() {
        "build" => {
            let input = PathBuf::from(args.positional(0, "instruction file")?);
            let output = args
                .take("--output")
                .map(PathBuf::from)
                .unwrap_or_else(|| input.with_extension("zboard"));
            Command::Build { input, output }
        }
        "info" => Command::Info {
            file: PathBuf::from(args.positional(0, "board file")?),
        },
        "animate" => {
            let file = PathBuf::from(args.positional(0, "board file")?);
            let point = args.take("--point").context("missing --point")?;
            let path: Vec<String> = args
                .take("--path")
                .context("missing --path")?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if path.len() < 2 {
                bail!("--path needs at least two point names");
            }
            Command::Animate {
                file,
                point,
                path,
                closed: args.switch("--closed"),
                duration_ms: args.take_parsed("--duration")?,
                mode: args.take_parsed("--mode")?,
                realtime: args.switch("--realtime"),
                output: args.take("--output").map(PathBuf::from),
            }
        }
        "plot" => Command::Plot {
            expression: args.positional(0, "expression")?,
            from: args.take_parsed("--from")?,
            to: args.take_parsed("--to")?,
            resolution: args.take_parsed("--resolution")?,
            into: args.take("--into").map(PathBuf::from),
        },
        "analyze" => Command::Analyze {
            expression: args.positional(0, "expression")?,
            with: args.take("--with"),
            from: args.take_parsed("--from")?,
            to: args.take_parsed("--to")?,
        },
        "check" => Command::Check {
            file: PathBuf::from(args.positional(0, "board file")?),
            fix: args.switch("--fix"),
            output: args.take("--output").map(PathBuf::from),
        },
        "ask" => {
            // 需求可以不加引号，多个词拼接
            if args.positional.is_empty() {
                bail!("missing prompt");
            }
            Command::Ask {
                prompt: args.positional.join(" "),
                board: args.take("--board").map(PathBuf::from),
                output: args.take("--output").map(PathBuf::from),
            }
        }
        other => bail!("unknown command '{other}'\n\n{USAGE}"),
    };
    args.finish()?;

    Ok(Cli { config, command })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Cli> {
        parse_args(line.split_whitespace().map(String::from))
    }

    #[test]
    fn test_build_default_output() {
        let cli = parse("build shapes.json").unwrap();
        assert_eq!(
            cli.command,
            Command::Build {
                input: "shapes.json".into(),
                output: "shapes.zboard".into(),
            }
        );

        let cli = parse("--config my.json build shapes.json -o out.json").unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("my.json")));
        assert!(matches!(cli.command, Command::Build { output, .. } if output == PathBuf::from("out.json")));
    }

    #[test]
    fn test_animate() {
        let cli = parse("animate b.zboard --point P --path A,B,C --duration 2000 --mode pingpong --closed")
            .unwrap();
        match cli.command {
            Command::Animate {
                point,
                path,
                closed,
                duration_ms,
                mode,
                realtime,
                ..
            } => {
                assert_eq!(point, "P");
                assert_eq!(path, vec!["A", "B", "C"]);
                assert!(closed);
                assert!(!realtime);
                assert_eq!(duration_ms, Some(2000));
                assert_eq!(mode, Some(PlaybackMode::PingPong));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(parse("animate b.zboard --point P --path A").is_err());
        assert!(parse("animate b.zboard --point P --path A,B --mode bounce").is_err());
    }

    #[test]
    fn test_plot_negative_bounds() {
        let cli = parse("plot sin(x) --from -3.5 --to 3.5").unwrap();
        assert_eq!(
            cli.command,
            Command::Plot {
                expression: "sin(x)".into(),
                from: Some(-3.5),
                to: Some(3.5),
                resolution: None,
                into: None,
            }
        );
    }

    #[test]
    fn test_analyze_and_check() {
        let cli = parse("analyze x^2 --with x+2 --from -5").unwrap();
        assert_eq!(
            cli.command,
            Command::Analyze {
                expression: "x^2".into(),
                with: Some("x+2".into()),
                from: Some(-5.0),
                to: None,
            }
        );

        let cli = parse("check board.zboard --fix -o clean.zboard").unwrap();
        assert_eq!(
            cli.command,
            Command::Check {
                file: PathBuf::from("board.zboard"),
                fix: true,
                output: Some(PathBuf::from("clean.zboard")),
            }
        );
        assert!(parse("check").is_err());
    }

    #[test]
    fn test_ask_joins_words() {
        let cli = parse("ask 画 一个 手拉手 模型 -o hand.json").unwrap();
        assert_eq!(
            cli.command,
            Command::Ask {
                prompt: "画 一个 手拉手 模型".into(),
                board: None,
                output: Some("hand.json".into()),
            }
        );
    }

    #[test]
    fn test_errors_and_help() {
        assert_eq!(parse("").unwrap().command, Command::Help);
        assert_eq!(parse("info x --help").unwrap().command, Command::Help);
        assert!(parse("frobnicate").is_err());
        assert!(parse("info").is_err());
        assert!(parse("info a.zboard --bogus 1").is_err());
        assert!(parse("build a.json -o").is_err());
    }
}
