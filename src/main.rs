use mimika::{BASE_CHANNELS, Engine, InputSample, LoadReport, Rule};
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

const DEFAULT_MIN: f64 = -1000.0;
const DEFAULT_MAX: f64 = 1000.0;

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_target(false).init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    if config.list_channels {
        for name in BASE_CHANNELS.iter() {
            println!("{name}");
        }
        return;
    }

    let engine = Engine::new();
    let status = engine.install(LoadReport { rules: config.rules, ..LoadReport::default() });
    println!("status after install: {status:?}");

    let sample = InputSample::new(config.detected, config.channels);
    let result = engine.transform(&sample);

    println!("\nframe (detected={}):", result.detected);
    if result.outputs.is_empty() {
        println!("  (no outputs)");
    }
    for out in &result.outputs {
        println!("  {:<24} = {:>10.4}   [{}, {}]   {}", out.name, out.value, out.min, out.max, out.expression_text);
    }

    for pass in &result.passes {
        println!("pass {}: resolved={} pending={}", pass.pass, pass.resolved, pass.pending);
    }

    let snap = engine.snapshot();
    println!("\nstatus={:?} healthy={}", snap.status, snap.healthy);
    println!(
        "transforms total={} ok={} failed={}   rules valid={} invalid={}",
        snap.total_transformations, snap.successful_transformations, snap.failed_transformations, snap.valid_rules,
        snap.invalid_rules
    );
    for ab in &snap.abandoned {
        println!("abandoned [{:?}] {}: {}", ab.kind, ab.name, ab.detail);
    }
}

struct CliConfig {
    rules: Vec<Rule>,
    channels: HashMap<String, f64>,
    detected: bool,
    list_channels: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut rules: Vec<Rule> = Vec::new();
    let mut channels: HashMap<String, f64> = HashMap::new();
    let mut detected = true;
    let mut list_channels = false;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print!("{}", help_text());
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("mimika {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--not-detected" => detected = false,
            "--list-channels" => list_channels = true,
            "--rule" | "-r" => {
                let value = args.next().ok_or_else(|| "error: --rule expects a value".to_string())?;
                rules.push(parse_rule(&value)?);
            }
            "--set" | "-s" => {
                let value = args.next().ok_or_else(|| "error: --set expects a value".to_string())?;
                let (name, v) = parse_channel(&value)?;
                channels.insert(name, v);
            }
            _ if arg.starts_with("--rule=") => {
                rules.push(parse_rule(arg.trim_start_matches("--rule="))?);
            }
            _ if arg.starts_with("--set=") => {
                let (name, v) = parse_channel(arg.trim_start_matches("--set="))?;
                channels.insert(name, v);
            }
            _ => return Err(format!("error: unknown option '{arg}'\n\n{}", help_text())),
        }
    }

    if rules.is_empty() && !list_channels {
        return Err(format!("error: no rules provided\n\n{}", help_text()));
    }

    Ok(CliConfig { rules, channels, detected, list_channels })
}

/// `NAME=EXPR` or `NAME=EXPR@min,max,default`.
fn parse_rule(spec: &str) -> Result<Rule, String> {
    let (name, rest) =
        spec.split_once('=').ok_or_else(|| format!("error: invalid --rule '{spec}' (expected NAME=EXPR)"))?;
    let (expr, range) = match rest.rsplit_once('@') {
        Some((expr, range)) => (expr, Some(range)),
        None => (rest, None),
    };

    let (min, max, default) = match range {
        None => (DEFAULT_MIN, DEFAULT_MAX, 0.0),
        Some(range) => {
            let parts: Vec<&str> = range.split(',').collect();
            if parts.len() != 3 {
                return Err(format!("error: invalid range '{range}' (expected min,max,default)"));
            }
            let mut nums = [0.0f64; 3];
            for (slot, part) in nums.iter_mut().zip(&parts) {
                *slot = part.trim().parse().map_err(|_| format!("error: invalid number '{part}' in range"))?;
            }
            (nums[0], nums[1], nums[2])
        }
    };

    Rule::new(name.trim(), expr.trim(), min, max, default).map_err(|e| format!("error: rule '{name}': {e}"))
}

fn parse_channel(spec: &str) -> Result<(String, f64), String> {
    let (name, value) =
        spec.split_once('=').ok_or_else(|| format!("error: invalid --set '{spec}' (expected NAME=VALUE)"))?;
    let v: f64 = value.trim().parse().map_err(|_| format!("error: invalid value '{value}' for channel '{name}'"))?;
    Ok((name.trim().to_string(), v))
}

fn help_text() -> String {
    format!(
        "mimika {version}

Expression-driven parameter transformation engine CLI.

Evaluates one synthetic frame against an inline rule set and prints the
resolved parameters, the pass trace, and a statistics snapshot.

Usage:
  mimika --rule NAME=EXPR[@min,max,default] [--set NAME=VALUE]...

Options:
  -r, --rule <spec>     Add a rule, e.g. 'Smile=MouthSmile*2@0,1,0'.
                        Range defaults to [{min}, {max}] with default 0.
  -s, --set <spec>      Set an input channel, e.g. 'HeadPosX=0.25'.
  --not-detected        Mark the frame's subject as not detected.
  --list-channels       Print the canonical base channel names and exit.
  -h, --help            Show this help message.
  -V, --version         Print version information.

Exit codes:
  0  Success.
  2  Invalid arguments.
",
        version = env!("CARGO_PKG_VERSION"),
        min = DEFAULT_MIN,
        max = DEFAULT_MAX
    )
}
