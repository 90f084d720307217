use std::env;
use std::path::PathBuf;

/// Port the REST view listens on when `--port` is not given.
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug)]
pub struct CliOptions {
    pub input: PathBuf,
    /// Rendered model goes to stdout when `None`.
    pub output: Option<PathBuf>,
    pub recipe: Option<PathBuf>,
    pub preset: Option<String>,
    pub inventory_out: Option<PathBuf>,
    pub verbose: bool,
    pub serve: bool,
    pub port: u16,
}

/// Outcome of argument parsing.
#[derive(Debug)]
pub enum CliCommand {
    Run(CliOptions),
    Help,
}

pub fn parse_args() -> Result<CliCommand, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

pub fn parse_args_from(args: Vec<String>) -> Result<CliCommand, String> {
    if args.iter().any(|a| a == "--help" || a == "-h") {
        return Ok(CliCommand::Help);
    }
    parse_options(&args).map(CliCommand::Run)
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let mut i = 0usize;
    let mut input = None;
    let mut output = None;
    let mut recipe = None;
    let mut preset = None;
    let mut inventory_out = None;
    let mut verbose = false;
    let mut serve = false;
    let mut port = None;

    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --input (expected a .glm file path)")?;
                if input.replace(PathBuf::from(path)).is_some() {
                    return Err("--input provided more than once".to_string());
                }
            }
            "--output" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --output (expected a file path)")?;
                if output.replace(PathBuf::from(path)).is_some() {
                    return Err("--output provided more than once".to_string());
                }
            }
            "--recipe" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --recipe (expected a TOML file path)")?;
                if recipe.replace(PathBuf::from(path)).is_some() {
                    return Err("--recipe provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name = args.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                if preset.replace(name.to_string()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--inventory-out" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --inventory-out (expected a file path)")?;
                if inventory_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--inventory-out provided more than once".to_string());
                }
            }
            "--verbose" | "-v" => verbose = true,
            "--serve" => serve = true,
            "--port" => {
                i += 1;
                let value = args.next_or_err(i, "missing value for --port (expected a u16)")?;
                let parsed = value
                    .parse::<u16>()
                    .map_err(|_| format!("--port value \"{value}\" is not a valid u16"))?;
                if port.replace(parsed).is_some() {
                    return Err("--port provided more than once".to_string());
                }
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    let input = input.ok_or_else(|| "missing required argument --input".to_string())?;

    if recipe.is_some() && preset.is_some() {
        return Err(
            "arguments `--recipe` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }
    if port.is_some() && !serve {
        return Err("--port only applies together with --serve".to_string());
    }

    Ok(CliOptions {
        input,
        output,
        recipe,
        preset,
        inventory_out,
        verbose,
        serve,
        port: port.unwrap_or(DEFAULT_PORT),
    })
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("glm-manager: prepare GridLAB-D models for simulation");
    eprintln!();
    eprintln!("Usage:");
    eprintln!(
        "  glm-manager --input <glm> [--output <glm>] [--recipe <toml> | --preset <name>]"
    );
    eprintln!("              [--inventory-out <csv>] [--verbose] [--serve [--port <u16>]]");
    eprintln!();
    eprintln!("Without --output the model is written to stdout.");
    eprintln!("Without --recipe or --preset the model is passed through unchanged.");
    eprintln!("--serve needs a build with the `api` feature (default port {DEFAULT_PORT}).");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn options(list: &[&str]) -> CliOptions {
        match parse_args_from(args(list)).expect("parse should succeed") {
            CliCommand::Run(opts) => opts,
            CliCommand::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn supports_minimal_cli() {
        let opts = options(&["--input", "feeder.glm"]);
        assert_eq!(opts.input.to_str(), Some("feeder.glm"));
        assert!(opts.output.is_none());
        assert!(opts.recipe.is_none());
        assert!(opts.preset.is_none());
        assert!(!opts.verbose);
        assert!(!opts.serve);
        assert_eq!(opts.port, DEFAULT_PORT);
    }

    #[test]
    fn supports_full_cli() {
        let opts = options(&[
            "--input",
            "in.glm",
            "--output",
            "out.glm",
            "--recipe",
            "prep.toml",
            "--inventory-out",
            "inv.csv",
            "--verbose",
            "--serve",
            "--port",
            "8080",
        ]);
        assert_eq!(opts.output.as_deref().and_then(|p| p.to_str()), Some("out.glm"));
        assert_eq!(opts.recipe.as_deref().and_then(|p| p.to_str()), Some("prep.toml"));
        assert_eq!(
            opts.inventory_out.as_deref().and_then(|p| p.to_str()),
            Some("inv.csv")
        );
        assert!(opts.verbose);
        assert!(opts.serve);
        assert_eq!(opts.port, 8080);
    }

    #[test]
    fn help_short_circuits() {
        assert!(matches!(
            parse_args_from(args(&["--input", "x.glm", "-h"])),
            Ok(CliCommand::Help)
        ));
    }

    #[test]
    fn rejects_bad_combinations() {
        let cases: &[&[&str]] = &[
            &[],
            &["--input"],
            &["--input", "a.glm", "--input", "b.glm"],
            &["--input", "a.glm", "--recipe", "r.toml", "--preset", "runnable"],
            &["--input", "a.glm", "--port", "80"],
            &["--input", "a.glm", "--serve", "--port", "http"],
            &["--input", "a.glm", "--bogus"],
        ];
        for case in cases {
            assert!(parse_args_from(args(case)).is_err(), "{case:?} should fail");
        }
    }
}
