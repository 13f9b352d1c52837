use std::{env, fs, process::ExitCode};

use oneliner::{convert_source, Config};

const USAGE: &str = "\
usage: oneliner <input.py> [options]

options:
  -o, --output <path>      write the expression to a file instead of stdout
      --unparser <v>       general | precision
      --expr-wrapper <v>   plain_sequence | chained_call
      --if-style <v>       conditional_expr | short_circuit
  -h, --help               show this help";

struct Cli {
    input: String,
    output: Option<String>,
    config: Config,
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(Some(cli)) => cli,
        Ok(None) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(msg) => {
            eprintln!("error: {msg}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let code = match fs::read_to_string(&cli.input) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: cannot read {}: {err}", cli.input);
            return ExitCode::from(2);
        }
    };

    let expr = match convert_source(&code, &cli.config) {
        Ok(expr) => expr,
        Err(err) => {
            eprintln!("error: {}: {err}", cli.input);
            return ExitCode::FAILURE;
        }
    };

    match &cli.output {
        Some(path) => {
            if let Err(err) = fs::write(path, expr + "\n") {
                eprintln!("error: cannot write {path}: {err}");
                return ExitCode::from(2);
            }
        }
        None => println!("{expr}"),
    }
    ExitCode::SUCCESS
}

fn parse_args(args: &[String]) -> Result<Option<Cli>, String> {
    let mut input = None;
    let mut output = None;
    let mut config = Config::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "-o" | "--output" => {
                let value = iter.next().ok_or("missing value for --output")?;
                output = Some(value.clone());
            }
            "--unparser" | "--expr-wrapper" | "--if-style" => {
                let name = arg.trim_start_matches("--").replace('-', "_");
                let value = iter.next().ok_or_else(|| format!("missing value for {arg}"))?;
                config.set(&name, value).map_err(|err| err.message().to_owned())?;
            }
            flag if flag.starts_with('-') => return Err(format!("unknown option {flag:?}")),
            path => {
                if input.replace(path.to_owned()).is_some() {
                    return Err("more than one input file given".to_owned());
                }
            }
        }
    }
    let Some(input) = input else {
        return Err("no input file given".to_owned());
    };
    Ok(Some(Cli {
        input,
        output,
        config,
    }))
}
