//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise records, collections and the SQLite sync adapter end to end.
//! - Keep output deterministic apart from generated identities.
//!
//! Usage: `appframe_cli [--log-dir <absolute dir>] [--level <level>]`

use appframe_core::{
    core_version, default_log_level, init_logging, Collection, ListEvent, ListEventKind, Options,
    RecordSchema, SqliteSync,
};
use log::info;
use serde_json::{json, Value};
use std::error::Error;
use std::process::ExitCode;
use std::rc::Rc;

struct CliArgs {
    log_dir: Option<String>,
    level: String,
}

fn parse_args() -> Result<CliArgs, String> {
    let mut args = std::env::args().skip(1);
    let mut parsed = CliArgs {
        log_dir: None,
        level: default_log_level().to_string(),
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--log-dir" => {
                parsed.log_dir = Some(args.next().ok_or("--log-dir requires a value")?);
            }
            "--level" => {
                parsed.level = args.next().ok_or("--level requires a value")?;
            }
            other => return Err(format!("unknown argument `{other}`")),
        }
    }
    Ok(parsed)
}

fn run(args: CliArgs) -> Result<(), Box<dyn Error>> {
    println!("appframe_core version={}", core_version());
    if let Some(log_dir) = &args.log_dir {
        init_logging(&args.level, log_dir)?;
    }

    let store = Rc::new(SqliteSync::open_in_memory()?);
    let schema = RecordSchema::builder("todo")
        .attribute("title", "")
        .attribute("done", false)
        .validator(|attributes| match attributes.get("title") {
            Some(Value::String(title)) if !title.trim().is_empty() => Ok(()),
            _ => Err(json!("title must not be empty")),
        })
        .sync_adapter(store.clone())
        .build()?;

    let todos = Collection::new(&schema);
    todos.set_comparator(|record| record.get("title").unwrap_or(Value::Null));
    todos.after(ListEventKind::Add, |facade| {
        if let ListEvent::Add(added) = facade.event() {
            println!(
                "added title={} index={}",
                added.record.get_as_html("title"),
                added.index
            );
        }
    });

    for title in ["write docs", "buy milk", "<fix> bugs"] {
        todos.create(json!({ "title": title }), &Options::new());
    }
    if let Some(first) = todos.item(0) {
        first.set("done", true, &Options::src("cli")).save(&Options::new());
    }

    let reloaded = Collection::new(&schema);
    reloaded.load(&Options::new());
    info!(
        "event=cli_run module=cli status=ok created={} stored={}",
        todos.size(),
        store.count("todo")?
    );
    println!("{}", serde_json::to_string_pretty(&reloaded.get("done"))?);
    println!("{}", serde_json::to_string_pretty(&reloaded)?);
    Ok(())
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(2);
        }
    };
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
