use std::{env, io};

use fed_orchestrator::{
    Command, CommandOutcome, FederationConfig, RoundOrchestrator, Selection,
    configs::DataConfig, metrics::LogSink,
};
use log::{error, info, warn};
use tokio::signal;

const USAGE: &str = "usage: fedsim [CONFIG] [--rounds N] [--participation P] \
                     [--mode iid|non-iid] [--synthetic SEED]";

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = parse_args(env::args().skip(1))?;
    info!(
        "{} clients, {} rounds, {} partitions, participation {}",
        config.clients, config.rounds, config.mode, config.participation
    );

    tokio::select! {
        ret = run(&config) => ret,
        _ = signal::ctrl_c() => {
            info!("received SIGINT, stopping");
            Ok(())
        }
    }
}

async fn run(config: &FederationConfig) -> io::Result<()> {
    let orchestrator =
        RoundOrchestrator::from_config(config, Box::new(LogSink)).map_err(io::Error::other)?;
    orchestrator.initialize().await.map_err(io::Error::other)?;

    for _ in 0..config.rounds {
        match orchestrator.dispatch(Command::RunRound(Selection::All)).await {
            Ok(CommandOutcome::Round(report)) => {
                for e in &report.training.failures {
                    warn!("{e}");
                }
            }
            Ok(_) => {}
            Err(e) => error!("round skipped: {e}"),
        }
    }

    for record in orchestrator.accuracy_history() {
        println!("round {:>3}: accuracy {:.4}", record.round, record.accuracy);
    }

    Ok(())
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> io::Result<FederationConfig> {
    let mut path = None;
    let mut rounds = None;
    let mut participation = None;
    let mut mode = None;
    let mut synthetic = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--rounds" => rounds = Some(parse_value(&arg, args.next())?),
            "--participation" => participation = Some(parse_value(&arg, args.next())?),
            "--mode" => mode = Some(parse_value(&arg, args.next())?),
            "--synthetic" => synthetic = Some(parse_value(&arg, args.next())?),
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => return Err(invalid(format!("unknown flag {flag}"))),
            _ if path.is_none() => path = Some(arg),
            _ => return Err(invalid(format!("unexpected argument {arg}"))),
        }
    }

    let mut config = match path {
        Some(path) => FederationConfig::from_path(path).map_err(io::Error::other)?,
        None => FederationConfig::default(),
    };

    if let Some(rounds) = rounds {
        config.rounds = rounds;
    }
    if let Some(participation) = participation {
        config.participation = participation;
    }
    if let Some(mode) = mode {
        config.mode = mode;
    }
    if let Some(seed) = synthetic {
        config.data = DataConfig::Synthetic { seed };
    }

    config.validate().map_err(io::Error::other)?;
    Ok(config)
}

fn parse_value<T>(flag: &str, value: Option<String>) -> io::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = value.ok_or_else(|| invalid(format!("{flag} expects a value\n{USAGE}")))?;
    value
        .parse()
        .map_err(|e| invalid(format!("invalid value {value} for {flag}: {e}")))
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}
