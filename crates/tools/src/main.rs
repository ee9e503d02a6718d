use std::env;
use std::path::PathBuf;

use engine::EngineConfig;
use foundation::Viewport;
use foundation::math::distance_between;
use tools::{
    SIMULATION_TOKEN, check_viewport, is_masked, load_datasets, overlay_filter, parse_lng_lat,
    simulate,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let mut args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(usage());
    }

    let cmd = args[1].clone();
    args.drain(0..2);

    match cmd.as_str() {
        "validate-dataset" => cmd_validate_dataset(args),
        "validate-viewport" => cmd_validate_viewport(args),
        "distance" => cmd_distance(args),
        "overlay-filter" => cmd_overlay_filter(args),
        "simulate" => cmd_simulate(args),
        _ => Err(usage()),
    }
}

fn cmd_validate_dataset(args: Vec<String>) -> Result<(), String> {
    // passport-map validate-dataset <file.json> [file2.json ...]
    if args.is_empty() {
        return Err(usage());
    }
    let mut failures = 0usize;
    for path in args.iter().map(PathBuf::from) {
        match load_datasets(&path) {
            Ok(datasets) => {
                for d in datasets {
                    println!(
                        "ok   {}: {} ({} layers, source {} [{}])",
                        path.display(),
                        d.id,
                        d.layers.len(),
                        d.source.id,
                        d.source.type_name()
                    );
                }
            }
            Err(e) => {
                failures += 1;
                println!("fail {e}");
            }
        }
    }
    if failures > 0 {
        return Err(format!("{failures} file(s) failed validation"));
    }
    Ok(())
}

fn parse_f64(flag: &str, value: Option<&String>) -> Result<f64, String> {
    let value = value.ok_or_else(|| format!("{flag} requires a value"))?;
    value
        .parse()
        .map_err(|_| format!("{flag}: not a number: {value:?}"))
}

fn cmd_validate_viewport(args: Vec<String>) -> Result<(), String> {
    // passport-map validate-viewport <lng> <lat> <zoom> [--pitch P] [--bearing B]
    if args.len() < 3 {
        return Err(usage());
    }
    let mut viewport = Viewport::new(
        parse_f64("<lng>", args.first())?,
        parse_f64("<lat>", args.get(1))?,
        parse_f64("<zoom>", args.get(2))?,
    );

    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--pitch" => {
                i += 1;
                viewport = viewport.with_pitch(parse_f64("--pitch", args.get(i))?);
            }
            "--bearing" => {
                i += 1;
                viewport = viewport.with_bearing(parse_f64("--bearing", args.get(i))?);
            }
            s => return Err(format!("unknown arg: {s}\n\n{}", usage())),
        }
        i += 1;
    }

    check_viewport(&viewport)?;
    println!("viewport ok");
    Ok(())
}

fn cmd_distance(args: Vec<String>) -> Result<(), String> {
    // passport-map distance <lng,lat> <lng,lat>
    let [a, b] = args.as_slice() else {
        return Err(usage());
    };
    let km = distance_between(parse_lng_lat(a)?, parse_lng_lat(b)?);
    println!("{km:.1} km");
    Ok(())
}

fn cmd_overlay_filter(args: Vec<String>) -> Result<(), String> {
    // passport-map overlay-filter <CODE> [CODE ...] [--eval CODE]
    let mut codes: Vec<String> = Vec::new();
    let mut eval: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--eval" => {
                i += 1;
                if i >= args.len() {
                    return Err("--eval requires a value".to_string());
                }
                eval = Some(args[i].clone());
            }
            s if s.starts_with('-') => {
                return Err(format!("unknown arg: {s}\n\n{}", usage()));
            }
            code => codes.push(code.to_ascii_uppercase()),
        }
        i += 1;
    }
    if codes.is_empty() {
        return Err("overlay-filter requires at least one region code".to_string());
    }

    let filter = overlay_filter(&codes);
    println!("{}", filter.as_value());
    if let Some(code) = eval {
        let masked = is_masked(&filter, &code.to_ascii_uppercase())?;
        println!("{code}: {}", if masked { "masked" } else { "highlighted" });
    }
    Ok(())
}

fn cmd_simulate(args: Vec<String>) -> Result<(), String> {
    // passport-map simulate <file.json> [file2.json ...]
    if args.is_empty() {
        return Err(usage());
    }
    let mut datasets = Vec::new();
    for path in args.iter().map(PathBuf::from) {
        datasets.extend(load_datasets(&path)?);
    }

    let config = EngineConfig::from_env().unwrap_or_else(|e| {
        warn!("{e}; using a placeholder token for the headless engine");
        EngineConfig::new(SIMULATION_TOKEN)
    });

    for (step, op) in simulate(&config, &datasets)?.iter().enumerate() {
        println!("{step:>3}  {op:?}");
    }
    Ok(())
}

fn usage() -> String {
    let exe = env::args()
        .next()
        .unwrap_or_else(|| "passport-map".to_string());
    format!(
        "Usage:\n  {exe} validate-dataset <file.json> [file2.json ...]\n  {exe} validate-viewport <lng> <lat> <zoom> [--pitch P] [--bearing B]\n  {exe} distance <lng,lat> <lng,lat>\n  {exe} overlay-filter <CODE> [CODE ...] [--eval CODE]\n  {exe} simulate <file.json> [file2.json ...]\n\nNotes:\n- Region codes are ISO 3166-1 alpha-3.\n- `simulate` reads MAPBOX_ACCESS_TOKEN and MAPBOX_STYLE; set RUST_LOG=debug to see lifecycle logs.\n"
    )
}
