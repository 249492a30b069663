use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::EnvFilter;
use vizflow_core::info::{DATA_TIME_STEP, WHOLE_EXTENT};
use vizflow_pipeline::prelude::*;
use vizflow_pipeline::LoggingConfig;

fn cli() -> Command {
    Command::new("vizflow")
        .version(vizflow_pipeline::VERSION)
        .about("Demand-driven pipeline executive")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(std::path::PathBuf))
                .help("TOML configuration file"),
        )
        .subcommand(Command::new("stages").about("List registered stage types"))
        .subcommand(
            Command::new("demo")
                .about("Pull a synthetic source -> clip -> pass-through chain")
                .arg(
                    Arg::new("piece")
                        .long("piece")
                        .default_value("0")
                        .value_parser(value_parser!(u32))
                        .help("Piece to request"),
                )
                .arg(
                    Arg::new("pieces")
                        .long("pieces")
                        .default_value("1")
                        .value_parser(value_parser!(u32))
                        .help("Number of pieces"),
                )
                .arg(
                    Arg::new("time")
                        .long("time")
                        .value_parser(value_parser!(f64))
                        .help("Time value to request"),
                )
                .arg(
                    Arg::new("repeat")
                        .long("repeat")
                        .action(ArgAction::SetTrue)
                        .help("Pull a second time to show cached execution"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the pass trace as JSON"),
                ),
        )
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn demo(config: PipelineConfig, args: &ArgMatches) -> Result<()> {
    let piece = args.get_one::<u32>("piece").copied().unwrap_or(0);
    let pieces = args.get_one::<u32>("pieces").copied().unwrap_or(1);
    let time = args.get_one::<f64>("time").copied();

    let registry = StageRegistry::with_builtins();
    let mut pipeline = Pipeline::with_config(config);
    let source = pipeline.add_registered(
        &registry,
        "synthetic_image",
        &serde_json::json!({
            "whole_extent": [0, 63, 0, 63, 0, 0],
            "time_steps": [0.0, 0.5, 1.0, 1.5, 2.0],
        }),
    )?;
    let clip = pipeline.add_registered(&registry, "clip", &serde_json::json!({ "extent": [8, 55, 8, 55, 0, 0] }))?;
    let pass = pipeline.add_registered(&registry, "pass_through", &serde_json::Value::Null)?;
    pipeline.connect(source, 0, clip, 0)?;
    pipeline.connect(clip, 0, pass, 0)?;

    let mut request = UpdateRequest::piece(piece, pieces);
    if let Some(t) = time {
        request = request.with_time(t);
    }

    let pulls = if args.get_flag("repeat") { 2 } else { 1 };
    for round in 1..=pulls {
        let data = pipeline
            .update(pass, 0, request.clone())
            .with_context(|| format!("pull {round} failed"))?;
        let executed = pipeline
            .trace()
            .last_pull()
            .map(|pull| pipeline.trace().executed(pull))
            .unwrap_or_default();
        println!("pull {round}: request {request}");
        if let Some(extent) = data.extent() {
            println!("  extent      {extent}");
        }
        if let Some(t) = data.info().get(&DATA_TIME_STEP) {
            println!("  time        {t}");
        }
        println!("  points      {}", data.fields().map_or(0, |f| f.num_points()));
        println!("  executed    {}", executed.len());
    }

    let info = pipeline.output_information(pass, 0)?;
    if let Some(whole) = info.get(&WHOLE_EXTENT) {
        println!("whole extent  {whole}");
    }
    if args.get_flag("json") {
        println!("{}", pipeline.trace().to_json()?);
    }
    Ok(())
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config = match matches.get_one::<std::path::PathBuf>("config") {
        Some(path) => PipelineConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    init_logging(&config.logging);

    match matches.subcommand() {
        Some(("stages", _)) => {
            let registry = StageRegistry::with_builtins();
            for name in registry.names() {
                println!("{name}");
            }
            Ok(())
        }
        Some(("demo", args)) => demo(config, args),
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}
