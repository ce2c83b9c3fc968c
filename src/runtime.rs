use crate::engine::{HeartbeatOutcome, StopReport, TimerEngine, TimerSnapshot, TimerStatus};
use crate::error::EngineError;
use crate::scheduler::Scheduler;
use std::ops::ControlFlow;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const HEARTBEAT: &str = "heartbeat";
const DAY_CHECK: &str = "day_check";

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Requests marshalled onto the engine's event loop
pub enum Command {
    SelectTask(String, Reply<()>),
    SetNotes(String, Reply<()>),
    Start(Reply<()>),
    Pause(Reply<()>),
    Toggle(Reply<TimerStatus>),
    Stop(Reply<Option<StopReport>>),
    Reset(Reply<()>),
    Snapshot(Reply<TimerSnapshot>),
    /// Stop and log any open session, then end the loop
    Shutdown(Reply<Option<StopReport>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Heartbeat,
    DayCheck,
}

/// Cloneable handle for actors outside the event loop
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
    display: watch::Receiver<TimerSnapshot>,
    cancel: CancellationToken,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    pub async fn select_task(&self, task: impl Into<String>) -> Result<(), EngineError> {
        let task = task.into();
        self.request(|r| Command::SelectTask(task, r)).await
    }

    pub async fn set_notes(&self, notes: impl Into<String>) -> Result<(), EngineError> {
        let notes = notes.into();
        self.request(|r| Command::SetNotes(notes, r)).await
    }

    pub async fn start(&self) -> Result<(), EngineError> {
        self.request(Command::Start).await
    }

    pub async fn pause(&self) -> Result<(), EngineError> {
        self.request(Command::Pause).await
    }

    pub async fn toggle(&self) -> Result<TimerStatus, EngineError> {
        self.request(Command::Toggle).await
    }

    pub async fn stop(&self) -> Result<Option<StopReport>, EngineError> {
        self.request(Command::Stop).await
    }

    pub async fn reset(&self) -> Result<(), EngineError> {
        self.request(Command::Reset).await
    }

    pub async fn snapshot(&self) -> Result<TimerSnapshot, EngineError> {
        self.request(Command::Snapshot).await
    }

    pub async fn shutdown(&self) -> Result<Option<StopReport>, EngineError> {
        self.request(Command::Shutdown).await
    }

    /// Latest snapshot, republished after every command and tick
    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.display.clone()
    }

    /// Ends the loop without logging the open session
    pub fn abort(&self) {
        self.cancel.cancel();
    }
}

pub struct EngineRuntime;

impl EngineRuntime {
    /// Move the engine onto its own task; it is only reachable through the handle afterwards.
    pub fn spawn(engine: TimerEngine) -> (EngineHandle, JoinHandle<()>) {
        let (tx, commands) = mpsc::channel(32);
        let (activity_tx, activities) = mpsc::channel(8);
        let (display_tx, display) = watch::channel(engine.snapshot());
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(activity_tx, cancel.child_token());

        let join = tokio::spawn(run_loop(
            engine,
            commands,
            activities,
            scheduler,
            display_tx,
            cancel.clone(),
        ));

        (
            EngineHandle {
                tx,
                display,
                cancel,
            },
            join,
        )
    }
}

/// Breaks once the command ended the loop
fn handle_command(engine: &mut TimerEngine, command: Command) -> ControlFlow<()> {
    // A dropped reply receiver only means the caller stopped waiting
    match command {
        Command::SelectTask(task, reply) => {
            let _ = reply.send(engine.select_task(&task));
        }
        Command::SetNotes(notes, reply) => {
            engine.set_notes(&notes);
            let _ = reply.send(Ok(()));
        }
        Command::Start(reply) => {
            let _ = reply.send(engine.start());
        }
        Command::Pause(reply) => {
            let _ = reply.send(engine.pause());
        }
        Command::Toggle(reply) => {
            let _ = reply.send(engine.toggle());
        }
        Command::Stop(reply) => {
            let _ = reply.send(engine.stop());
        }
        Command::Reset(reply) => {
            engine.reset();
            let _ = reply.send(Ok(()));
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(Ok(engine.snapshot()));
        }
        Command::Shutdown(reply) => {
            let result = engine.stop();
            if let Err(e) = &result {
                error!("[RUNTIME] Session could not be logged on shutdown: {}", e);
            }
            let _ = reply.send(result);
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

fn handle_activity(engine: &mut TimerEngine, activity: Activity) {
    match activity {
        Activity::Heartbeat => match engine.on_heartbeat() {
            Ok(HeartbeatOutcome::ForcedStop(report)) => {
                info!(
                    "[RUNTIME] Session force-stopped at {} after a heartbeat gap",
                    report.end_time
                );
            }
            Ok(_) => {}
            Err(e) => error!("[RUNTIME] Forced stop could not be logged: {}", e),
        },
        Activity::DayCheck => match engine.check_day() {
            Ok(entries) if !entries.is_empty() => {
                info!("[RUNTIME] Day check logged {} entries", entries.len());
            }
            Ok(_) => {}
            Err(e) => warn!("[RUNTIME] Day check failed, will retry: {}", e),
        },
    }
}

async fn run_loop(
    mut engine: TimerEngine,
    mut commands: mpsc::Receiver<Command>,
    mut activities: mpsc::Receiver<Activity>,
    mut scheduler: Scheduler<Activity>,
    display: watch::Sender<TimerSnapshot>,
    cancel: CancellationToken,
) {
    let tick = engine.config().tick_interval;
    let day_check = engine.config().day_check_interval;

    // Baseline for the first gap comparison
    let _ = engine.on_heartbeat();
    scheduler.schedule(HEARTBEAT, tick, Activity::Heartbeat);
    scheduler.schedule(DAY_CHECK, day_check, Activity::DayCheck);
    info!(
        "[RUNTIME] Event loop started (tick {:?}, day check {:?})",
        tick, day_check
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("[RUNTIME] Cancelled");
                break;
            }
            command = commands.recv() => match command {
                Some(command) => {
                    if handle_command(&mut engine, command).is_break() {
                        break;
                    }
                }
                None => {
                    debug!("[RUNTIME] All handles dropped");
                    break;
                }
            },
            Some(activity) = activities.recv() => {
                handle_activity(&mut engine, activity);
                match activity {
                    Activity::Heartbeat => scheduler.schedule(HEARTBEAT, tick, activity),
                    Activity::DayCheck => scheduler.schedule(DAY_CHECK, day_check, activity),
                }
            }
        }
        display.send_replace(engine.snapshot());
    }

    scheduler.cancel_all();
    cancel.cancel();
    info!("[RUNTIME] Event loop stopped");
}
