use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use timekeeper_lib::engine::{format_clock, humanize_minutes};
use timekeeper_lib::{
    AddOutcome, AppConfig, EngineHandle, EngineRuntime, SqliteGateway, StopReport, SystemClock,
    TaskRegistry, TimerEngine, TimerSnapshot, TimerStateForAPI,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

const HELP: &str = "commands: tasks | add <name> | task <name> | notes <text> | start | pause | toggle | stop | reset | status | quit";

fn print_snapshot(s: &TimerSnapshot) {
    let state = match &s.state {
        TimerStateForAPI::Stopped => "STOPPED".to_string(),
        TimerStateForAPI::Running { started_at } => format!("RUNNING since {}", started_at.format("%H:%M:%S")),
        TimerStateForAPI::Paused => "PAUSED".to_string(),
    };
    let task = if s.task.is_empty() { "Select" } else { s.task.as_str() };
    println!(
        "{} | {} | {} | today {}",
        task,
        state,
        format_clock(s.elapsed_seconds),
        humanize_minutes(s.day_work_minutes)
    );
}

fn print_report(report: &Option<StopReport>) {
    match report {
        Some(report) => {
            for entry in &report.entries {
                println!(
                    "logged {} {}: work {}, pause {}",
                    entry.date,
                    entry.task,
                    humanize_minutes(entry.work_minutes),
                    humanize_minutes(entry.pause_minutes)
                );
            }
        }
        None => println!("nothing to stop"),
    }
}

async fn dispatch(handle: &EngineHandle, registry: &TaskRegistry, line: &str) -> Result<bool> {
    let (cmd, arg) = match line.split_once(' ') {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (line, ""),
    };
    let outcome = match cmd {
        "" => Ok(()),
        "help" => {
            println!("{}", HELP);
            Ok(())
        }
        "tasks" => registry.active_tasks().map(|tasks| {
            for task in tasks {
                println!("  {}", task);
            }
        }),
        "add" => registry.add_task(arg).map(|outcome| match outcome {
            AddOutcome::Added(name) => println!("added {}", name),
            AddOutcome::Exists(name) => println!("exists: {}", name),
        }),
        "task" => handle.select_task(arg).await,
        "notes" => handle.set_notes(arg).await,
        "start" => handle.start().await,
        "pause" => handle.pause().await,
        "toggle" => handle.toggle().await.map(|status| println!("{}", status)),
        "stop" => handle.stop().await.map(|report| print_report(&report)),
        "reset" => handle.reset().await,
        "status" => handle.snapshot().await.map(|s| print_snapshot(&s)),
        "quit" | "exit" => return Ok(false),
        other => {
            println!("unknown command '{}'. {}", other, HELP);
            Ok(())
        }
    };
    if let Err(e) = outcome {
        println!("error: {}", e);
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    timekeeper_lib::init_logging();

    let config_path = std::env::var_os("TIMEKEEPER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("timekeeper.json"));
    let config = AppConfig::load(&config_path)?;

    let gateway = Arc::new(
        SqliteGateway::open(&config.db_path, config.busy_timeout())
            .with_context(|| format!("Failed to open store {}", config.db_path.display()))?,
    );
    let clock = Arc::new(SystemClock::new());
    let registry = TaskRegistry::new(gateway.clone(), clock.clone());
    let engine = TimerEngine::new(gateway, clock, config.engine_config());
    let (handle, join) = EngineRuntime::spawn(engine);

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !dispatch(&handle, &registry, line.trim()).await? {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    match handle.shutdown().await {
        Ok(report) => {
            if report.is_some() {
                print_report(&report);
            }
        }
        Err(e) => error!("Session could not be logged on exit: {}", e),
    }
    join.await.context("Event loop task failed")?;
    Ok(())
}
