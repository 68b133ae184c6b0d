use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, RwLock};

use strata::config::Config;
use strata::core::{TaskGraph, TaskId, TaskStatus};
use strata::orchestration::{
    AgentDispatch, ExecutionCoordinator, ExecutionEvent, PlanResult, PlanStatus, ProcessDispatch,
    RunOptions, SimulatedDispatch, StagePlan, TaskGraphBuilder,
};
use strata::project::{ContextHints, DirScanner};
use strata::state::{CheckpointEntry, ContextStore, DecisionEntry};
use strata::status::StatusTracker;
use strata::{stlog, Result};

/// Strata - problem decomposition and parallel agent orchestration
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    STRATA_LOG=<level>  Log verbosity: error|warn|info|debug|trace\n    STRATA_DEBUG=1      Enable debug logging (alternative to --debug)"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.strata/logs/)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Session data directory (default: .strata/session)
    #[arg(long)]
    pub session_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Commands for strata orchestration
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Decompose a problem into a task graph and persist the plan
    Plan {
        /// The problem statement (bullet lines become tasks)
        problem: String,
    },

    /// Decompose a problem and execute the plan
    Run {
        /// The problem statement (bullet lines become tasks)
        problem: String,

        /// Maximum concurrent agent dispatches per stage
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Per-task dispatch timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Abort remaining stages on the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Simulate agent dispatch instead of running the agent program
        #[arg(long)]
        dry_run: bool,
    },

    /// Resume execution of the persisted plan
    Resume {
        /// Maximum concurrent agent dispatches per stage
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Per-task dispatch timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Abort remaining stages on the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Simulate agent dispatch instead of running the agent program
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the status projection of the persisted plan
    Status,

    /// Append a progress checkpoint to the session log
    Checkpoint {
        /// What this checkpoint is working toward
        #[arg(long)]
        objective: String,

        /// Achievement reached (repeatable)
        #[arg(long = "achievement")]
        achievements: Vec<String>,

        /// Challenge encountered (repeatable)
        #[arg(long = "challenge")]
        challenges: Vec<String>,

        /// Summary of the current state
        #[arg(long)]
        state: String,

        /// Next action to take (repeatable)
        #[arg(long = "next")]
        next_actions: Vec<String>,

        /// Completion percentage (0-100)
        #[arg(long, default_value_t = 0)]
        percent: u8,
    },

    /// Append an architectural decision to the session log
    Decide {
        /// The decision taken
        #[arg(long)]
        decision: String,

        /// Why it was taken
        #[arg(long)]
        rationale: String,

        /// Alternative considered (repeatable)
        #[arg(long = "alternative")]
        alternatives: Vec<String>,

        /// Confidence on a 1-10 scale
        #[arg(long, default_value_t = 7)]
        confidence: u8,

        /// Tag for later retrieval (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Free-form context
        #[arg(long)]
        context: Option<String>,
    },

    /// Print recent decisions and checkpoints
    Log {
        /// How many entries of each kind to show
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Print the session summary
    Summary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    strata::log::init_with_debug(cli.debug);
    stlog!("Strata starting");

    let config = Config::load()?;
    let session_dir = cli
        .session_dir
        .clone()
        .unwrap_or_else(|| config.effective_session_dir());
    let store = ContextStore::open(&session_dir)?;

    match cli.command {
        Command::Plan { problem } => run_plan(&problem, &store),
        Command::Run {
            problem,
            max_parallel,
            timeout,
            fail_fast,
            dry_run,
        } => run_execute(
            Some(problem),
            &store,
            &config,
            options_from(&config, max_parallel, timeout, fail_fast),
            dry_run,
        ),
        Command::Resume {
            max_parallel,
            timeout,
            fail_fast,
            dry_run,
        } => run_execute(
            None,
            &store,
            &config,
            options_from(&config, max_parallel, timeout, fail_fast),
            dry_run,
        ),
        Command::Status => run_status(&store),
        Command::Checkpoint {
            objective,
            achievements,
            challenges,
            state,
            next_actions,
            percent,
        } => {
            let entry = CheckpointEntry::new(&objective, &state)
                .with_achievements(achievements)
                .with_challenges(challenges)
                .with_next_actions(next_actions)
                .with_completion_percent(percent);
            store.append_checkpoint(&entry)?;
            println!("Checkpoint recorded: {} ({}%)", objective, entry.completion_percent);
            Ok(())
        }
        Command::Decide {
            decision,
            rationale,
            alternatives,
            confidence,
            tags,
            context,
        } => {
            let mut entry = DecisionEntry::new(&decision, &rationale)
                .with_alternatives(alternatives)
                .with_confidence(confidence)
                .with_tags(tags);
            if let Some(context) = context {
                entry = entry.with_context(&context);
            }
            store.append_decision(&entry)?;
            println!(
                "Decision recorded: {} (confidence {}/10)",
                decision, entry.confidence
            );
            Ok(())
        }
        Command::Log { limit } => run_log(&store, limit),
        Command::Summary => {
            print!("{}", store.session_summary()?);
            Ok(())
        }
    }
}

fn options_from(
    config: &Config,
    max_parallel: Option<usize>,
    timeout: Option<u64>,
    fail_fast: bool,
) -> RunOptions {
    RunOptions {
        max_parallel: max_parallel.unwrap_or_else(|| config.effective_max_parallel()),
        task_timeout: timeout
            .map(std::time::Duration::from_secs)
            .unwrap_or_else(|| config.effective_task_timeout()),
        fail_fast: fail_fast || config.fail_fast,
    }
}

/// Gather context hints by scanning the current directory.
fn gather_hints() -> Result<ContextHints> {
    let cwd = std::env::current_dir()?;
    ContextHints::from_scanner(&DirScanner::new(&cwd))
}

/// Decompose the problem, print the stage layout, persist the plan.
fn run_plan(problem: &str, store: &ContextStore) -> Result<()> {
    let hints = gather_hints()?;
    let graph = TaskGraphBuilder::new().decompose(problem, &hints)?;
    let plan = StagePlan::compute(&graph)?;
    store.save_state(&graph)?;

    println!("Plan: {} task(s) in {} stage(s)", graph.task_count(), plan.len());
    println!();
    print_stages(&graph, &plan);
    println!();
    println!("Saved to {}", store.root().display());
    println!("Execute with: strata resume");
    Ok(())
}

fn print_stages(graph: &TaskGraph, plan: &StagePlan) {
    for (index, stage) in plan.stages().iter().enumerate() {
        println!("Stage {}:", index + 1);
        for id in stage {
            if let Some(task) = graph.get(id) {
                println!("  [{:>10}] {}", task.capability.to_string(), task.name);
            }
        }
    }
}

/// Plan (or load) a graph and execute it stage by stage.
fn run_execute(
    problem: Option<String>,
    store: &ContextStore,
    config: &Config,
    options: RunOptions,
    dry_run: bool,
) -> Result<()> {
    let hints = gather_hints()?;

    let graph = match problem {
        Some(problem) => {
            let graph = TaskGraphBuilder::new().decompose(&problem, &hints)?;
            store.save_state(&graph)?;
            graph
        }
        None => {
            let mut graph = store.load_state()?;
            // Tasks caught mid-dispatch by a crash and tasks cancelled
            // by an abort are requeued; failed and blocked tasks stay.
            for id in graph.order().to_vec() {
                if let Some(task) = graph.get_mut(&id) {
                    if matches!(
                        task.status,
                        TaskStatus::InProgress | TaskStatus::Cancelled { .. }
                    ) {
                        task.status = TaskStatus::Pending;
                    }
                }
            }
            graph
        }
    };

    // Defensive recheck: a loaded snapshot never went through the builder.
    let plan = StagePlan::compute(&graph)?;

    let dispatcher: Arc<dyn AgentDispatch> = if dry_run {
        Arc::new(SimulatedDispatch::new())
    } else {
        let dispatch = ProcessDispatch::from_config(config, std::env::current_dir()?);
        dispatch.check_available()?;
        Arc::new(dispatch)
    };

    println!(
        "Executing {} task(s) in {} stage(s) (max_parallel={}, timeout={}s{}{})",
        plan.task_count(),
        plan.len(),
        options.max_parallel,
        options.task_timeout.as_secs(),
        if options.fail_fast { ", fail-fast" } else { "" },
        if dry_run { ", dry-run" } else { "" },
    );
    println!();

    let graph = Arc::new(RwLock::new(graph));
    let rt = tokio::runtime::Runtime::new()?;

    let result = rt.block_on(async {
        let (event_tx, event_rx) = mpsc::channel(256);
        let coordinator =
            ExecutionCoordinator::new(Arc::clone(&graph), dispatcher, options).with_events(event_tx);

        // Ctrl-C aborts the run; partial state is persisted below.
        let cancel = coordinator.cancel_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stlog!("Ctrl-C received, aborting run");
                cancel.cancel();
            }
        });

        let printer = tokio::spawn(print_events(event_rx, Arc::clone(&graph)));
        let result = coordinator.run(&plan, &hints).await;
        drop(coordinator);
        let _ = printer.await;
        result
    })?;

    // Persist the final statuses whatever the outcome was.
    {
        let graph = rt.block_on(graph.read());
        store.save_state(&graph)?;
    }

    print_result(&result, &rt.block_on(graph.read()));
    Ok(())
}

/// Stream run progress to stdout as events arrive.
async fn print_events(
    mut rx: mpsc::Receiver<ExecutionEvent>,
    graph: Arc<RwLock<TaskGraph>>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            ExecutionEvent::StageStarted { index, total, tasks } => {
                println!("▸ Stage {}/{} ({} task(s))", index + 1, total, tasks.len());
            }
            ExecutionEvent::TaskCompleted { task_id } => {
                println!("  ✓ {}", task_name(&graph, &task_id).await);
            }
            ExecutionEvent::TaskFailed { task_id, error } => {
                println!("  ✗ {}: {}", task_name(&graph, &task_id).await, error);
            }
            ExecutionEvent::TaskBlocked { task_id } => {
                println!("  ⊘ {} (blocked)", task_name(&graph, &task_id).await);
            }
            ExecutionEvent::TasksCancelled { tasks } => {
                println!("  – {} task(s) cancelled", tasks.len());
            }
            ExecutionEvent::TaskStarted { .. } | ExecutionEvent::RunFinished { .. } => {}
        }
    }
}

async fn task_name(graph: &Arc<RwLock<TaskGraph>>, id: &TaskId) -> String {
    graph
        .read()
        .await
        .get(id)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| id.short())
}

fn print_result(result: &PlanResult, graph: &TaskGraph) {
    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║                       Run Complete                          ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
    println!("  Status:     {}", format_status(result.status));
    println!("  Completed:  {}", result.completed.len());
    println!("  Failed:     {}", result.failed.len());
    println!("  Blocked:    {}", result.blocked.len());
    println!("  Cancelled:  {}", result.cancelled.len());
    println!("  Elapsed:    {:.1}s", result.elapsed.as_secs_f64());

    if !result.failed.is_empty() {
        println!();
        println!("Failed tasks:");
        for id in &result.failed {
            if let Some(task) = graph.get(id) {
                println!("  ✗ {}: {}", task.name, task.error().unwrap_or("unknown error"));
            }
        }
    }
    if !result.blocked.is_empty() {
        println!();
        println!("Blocked tasks:");
        for id in &result.blocked {
            if let Some(task) = graph.get(id) {
                println!("  ⊘ {}", task.name);
            }
        }
    }
}

/// Format a plan status with color codes for terminal.
fn format_status(status: PlanStatus) -> String {
    match status {
        PlanStatus::Success => format!("\x1b[32m{}\x1b[0m", status), // Green
        PlanStatus::Partial => format!("\x1b[33m{}\x1b[0m", status), // Yellow
        PlanStatus::Cancelled => format!("\x1b[35m{}\x1b[0m", status), // Magenta
    }
}

/// Print the status projection of the persisted plan.
fn run_status(store: &ContextStore) -> Result<()> {
    let graph = store.load_state()?;
    let mut tracker = StatusTracker::from_graph(&graph);

    // Highlight the first genuinely running task, if any.
    if let Some(running) = graph
        .tasks()
        .find(|t| t.status == TaskStatus::InProgress)
        .map(|t| t.id)
    {
        tracker.set_active(running)?;
    }

    let counts = graph.status_counts();
    println!(
        "{} task(s): {} completed, {} pending, {} failed, {} blocked, {} cancelled",
        counts.total(),
        counts.completed,
        counts.pending + counts.in_progress,
        counts.failed,
        counts.blocked,
        counts.cancelled
    );
    println!();
    for line in tracker.project(&graph) {
        let marker = match &line.status {
            TaskStatus::Completed => "✓",
            TaskStatus::Failed { .. } => "✗",
            TaskStatus::Blocked { .. } => "⊘",
            TaskStatus::Cancelled { .. } => "–",
            TaskStatus::InProgress => "▸",
            TaskStatus::Pending => "·",
        };
        println!("  {} [{:>10}] {}", marker, line.capability.to_string(), line.name);
    }
    Ok(())
}

/// Print recent decisions and checkpoints.
fn run_log(store: &ContextStore, limit: usize) -> Result<()> {
    let decisions = store.recent_decisions(limit)?;
    let checkpoints = store.recent_checkpoints(limit)?;

    println!("Decisions ({} shown):", decisions.len());
    for entry in decisions {
        println!(
            "  [{}] {} — {} (confidence {}/10)",
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.decision,
            entry.rationale,
            entry.confidence
        );
    }
    println!();
    println!("Checkpoints ({} shown):", checkpoints.len());
    for entry in checkpoints {
        println!(
            "  [{}] {} ({}%): {}",
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.objective,
            entry.completion_percent,
            entry.current_state
        );
    }
    Ok(())
}
