//! Command-line entry point for the advice worker.
//!
//! - `invoke <event.json|->` handles one event and prints the response
//! - `run-rules` polls the local rule store and fires due rules
//! - `install <rule_name>` bootstraps the first activation of a rule

use std::env;
use std::fs;
use std::io::{self, Read};
use std::process::exit;
use std::thread;

use chrono::Utc;
use tracing::{error, info};
use worker_module::runtime::Runtime;
use worker_module::WorkerConfig;

fn print_usage() {
    eprintln!(
        r##"Usage: advice-worker <command> [arguments]

Commands:
  invoke <event.json|->   Handle one inbound event (file path, or - for stdin)
  run-rules               Poll the rule store and fire due rules until stopped
  install <rule_name>     Install the first scheduled run of <rule_name>

Environment Variables:
  SLACK_BOT_TOKEN         - Slack bot OAuth token (required)
  OPENAI_API_KEY          - Completion API key (required)
  TARGET_CHANNEL          - Channel the advice is posted to (default: exercise)
  RESCHEDULE_MODE         - weekly or interval (default: weekly)
  ADVICE_DB_PATH          - Advice history database (default: state/advice.db)
  RULES_DB_PATH           - Rule database (default: state/rules.db)
  LOG_LEVEL               - TRACE, DEBUG, INFO, WARN or ERROR (default: INFO)
"##
    );
}

fn main() {
    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(config.log_level)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        exit(1);
    };

    let runtime = match Runtime::new(config) {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start worker: {}", err);
            exit(1);
        }
    };

    let result = match command.as_str() {
        "invoke" => invoke(&runtime, args.get(1).map(String::as_str)),
        "run-rules" => run_rules(&runtime),
        "install" => install(&runtime, args.get(1).map(String::as_str)),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("unknown command: {other}");
            print_usage();
            exit(1);
        }
    };

    if let Err(err) = result {
        error!("{}", err);
        exit(1);
    }
}

fn invoke(runtime: &Runtime, source: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let raw = match source {
        Some("-") | None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
        Some(path) => fs::read_to_string(path)?,
    };
    let event: serde_json::Value = serde_json::from_str(&raw)?;
    let response = runtime.handle_event(&event, Utc::now());
    println!("{}", serde_json::to_string(&response)?);
    if response.status_code >= 500 {
        return Err(format!("event handling failed with status {}", response.status_code).into());
    }
    Ok(())
}

fn run_rules(runtime: &Runtime) -> Result<(), Box<dyn std::error::Error>> {
    let interval = runtime.config().rule_poll_interval;
    info!("polling rules every {:?}", interval);
    loop {
        match runtime.run_due_rules(Utc::now()) {
            Ok(0) => {}
            Ok(fired) => info!("fired {} rule(s)", fired),
            Err(err) => error!("rule poll failed: {}", err),
        }
        thread::sleep(interval);
    }
}

fn install(runtime: &Runtime, rule_name: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(rule_name) = rule_name else {
        print_usage();
        return Err("install requires a rule name".into());
    };
    worker_module::parse_rule_name(&format!("rule/{rule_name}"))?;
    let expression = runtime.install(rule_name, Utc::now())?;
    println!("{rule_name} {expression}");
    Ok(())
}
