//! REPL – the participant's shell around one [`ExperimentRunner`].
//!
//! Supported commands:
//!   /start                 – load the first model
//!   w a s d                – rotate up / left / down / right
//!   /up /down /left /right – same as above
//!   /next                  – load the next model
//!   /status                – show the session state
//!   /history               – list every model seen so far
//!   /answer <n..>          – answer the recall round (numbers = "seen")
//!   /reset                 – start over with a fresh sequence
//!   /help                  – show this list
//!   /quit | /exit          – leave
//!
//! Countdown ticks are handled between commands.  Steps are recorded on a
//! background task: input keeps being read while a step settles and
//! submits, and a step typed in that window is dropped, not queued.  Phase
//! announcements and record outcomes published on the bus while a command
//! or tick runs are printed once it returns.

use colored::Colorize;
use std::collections::HashMap;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use turntable_middleware::{Topic, TopicReceiver};
use turntable_runtime::{
    BudgetPolicy, DropReason, ExperimentRunner, RecallTest, RunnerPhase, StepEvent, StepOutcome, TimerEvent,
    Transition,
};
use turntable_types::{Action, Event, EventPayload, MemoryTestBatch, Phase};

/// One parsed line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Step(Action),
    Next,
    Status,
    History,
    /// 1-based item numbers answered "seen".
    Answer(Vec<usize>),
    Reset,
    Help,
    Quit,
}

/// Parse one input line.  Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let command = match head {
        "/start" => Command::Start,
        "w" | "/up" => Command::Step(Action::Up),
        "s" | "/down" => Command::Step(Action::Down),
        "a" | "/left" => Command::Step(Action::Left),
        "d" | "/right" => Command::Step(Action::Right),
        "/next" => Command::Next,
        "/status" => Command::Status,
        "/history" => Command::History,
        "/answer" => {
            let mut picks = Vec::new();
            for word in words {
                for part in word.split(',').filter(|p| !p.is_empty()) {
                    let n = part
                        .parse::<usize>()
                        .map_err(|_| format!("'{part}' is not an item number"))?;
                    if n == 0 {
                        return Err("item numbers start at 1".to_string());
                    }
                    picks.push(n);
                }
            }
            return Ok(Some(Command::Answer(picks)));
        }
        "/reset" => Command::Reset,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => return Err(format!("Unknown command '{other}'")),
    };
    Ok(Some(command))
}

/// Turn 1-based picks into a full response map for `test`.  Every item not
/// picked is answered "not seen".
pub fn responses_for(test: &RecallTest, picks: &[usize]) -> Result<HashMap<String, bool>, String> {
    if let Some(bad) = picks.iter().find(|&&n| n == 0 || n > test.items.len()) {
        return Err(format!("item {bad} does not exist (1..={})", test.items.len()));
    }
    Ok(test
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.model_name.clone(), picks.contains(&(i + 1))))
        .collect())
}

/// Entry point for the interactive shell.  Returns on `/quit`, end of input
/// or Ctrl-C.
pub async fn run(mut runner: ExperimentRunner) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut timer = runner.take_timer_events().unwrap_or_else(|| mpsc::unbounded_channel().1);
    let mut steps = runner.take_step_events().unwrap_or_else(|| mpsc::unbounded_channel().1);
    let bus = runner.bus();
    let mut phases = bus.subscribe_to(Topic::Phase);
    let mut records = bus.subscribe_to(Topic::Records);

    prompt();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        eprintln!("{}: {}", "Read error".red(), e);
                        break;
                    }
                };
                match parse_command(&line) {
                    Ok(Some(Command::Quit)) => {
                        println!("{}", "Goodbye.".green());
                        break;
                    }
                    Ok(Some(command)) => execute(&mut runner, command).await,
                    Ok(None) => {}
                    Err(e) => println!(
                        "{} {}. Type {} for available commands.",
                        "Error:".red(),
                        e.yellow(),
                        "/help".bold()
                    ),
                }
                drain_events(&runner, &mut phases, &mut records);
                prompt();
            }
            Some(done) = steps.recv() => {
                report_step(&runner, done);
                drain_events(&runner, &mut phases, &mut records);
                prompt();
            }
            Some(event) = timer.recv() => {
                if on_tick(&mut runner, event).await {
                    drain_events(&runner, &mut phases, &mut records);
                    prompt();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("{}", "⚠  Ctrl-C received – leaving the session.".yellow().bold());
                break;
            }
        }
    }
    info!(session_id = runner.session_id(), "shell closed");
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn execute(runner: &mut ExperimentRunner, command: Command) {
    match command {
        Command::Start => {
            let transition = runner.start().await;
            report_transition(runner, &transition);
        }
        Command::Step(action) => cmd_step(runner, action),
        Command::Next => {
            let transition = runner.next().await;
            if transition == Transition::Ignored {
                println!("  {}", "Not available yet.".yellow());
            } else {
                report_transition(runner, &transition);
            }
        }
        Command::Status => cmd_status(runner),
        Command::History => cmd_history(runner),
        Command::Answer(picks) => cmd_answer(runner, &picks).await,
        Command::Reset => match runner.reset() {
            Ok(()) => println!(
                "  {} Fresh sequence of {} model(s). Type {} to begin.",
                "✓".green().bold(),
                runner.controller().session().sequence().len(),
                "/start".bold()
            ),
            Err(e) => println!("{}: {}", "Reset failed".red(), e),
        },
        Command::Help => cmd_help(),
        Command::Quit => {}
    }
}

fn cmd_step(runner: &mut ExperimentRunner, action: Action) {
    match runner.begin_step(action) {
        Ok(()) => {}
        Err(DropReason::InFlight) => {
            println!("  {}", "Still recording the previous step.".dimmed());
        }
        Err(DropReason::BudgetExhausted) => {
            println!("  {} Type {} to continue.", "No steps left.".yellow(), "/next".bold());
        }
        Err(DropReason::NoActiveTrial) => {
            println!("  {}", "No model on screen.".yellow());
        }
    }
}

/// Print the outcome of a step recorded in the background.
fn report_step(runner: &ExperimentRunner, done: StepEvent) {
    let StepOutcome::Recorded { record, delta, submission } = done.outcome else {
        return;
    };
    println!();
    println!(
        "  {}: yaw {:+.1}°, pitch {:+.1}° (now {:.1}°, {:.1}°)",
        done.action, delta.yaw, delta.pitch, record.after_angles.yaw, record.after_angles.pitch
    );
    if let Err(e) = submission {
        println!("  {} {}", "not logged:".yellow(), e);
    }
    if matches!(runner.controller().config().budget, BudgetPolicy::Steps { .. }) {
        println!("  {} step(s) left", runner.controller().budget_remaining());
    }
}

async fn cmd_answer(runner: &mut ExperimentRunner, picks: &[usize]) {
    let Some(test) = runner.recall_test().cloned() else {
        println!("  {}", "No recall test is waiting for answers.".yellow());
        return;
    };
    let responses = match responses_for(&test, picks) {
        Ok(responses) => responses,
        Err(e) => {
            println!("{} {}", "Error:".red(), e.yellow());
            return;
        }
    };
    if let Some(batch) = runner.answer(&responses).await {
        print_score(&batch);
    }
    // The next round (if any) is announced here rather than through the bus.
    if let Some(next) = runner.recall_test()
        && next.round != test.round {
            print_recall_test(next);
        }
}

fn cmd_status(runner: &ExperimentRunner) {
    let status = runner.status();
    println!("{}", "Session Status".bold().underline());
    println!("  Session     : {}", status.session_id.bold());
    println!("  Phase       : {:?}", status.phase);
    println!("  Trial state : {:?}", status.state);
    println!(
        "  Model       : {}",
        status.model.as_deref().unwrap_or("–").yellow()
    );
    if let Some(loading) = &status.loading {
        println!("  Loading     : {}", loading.yellow());
    }
    println!(
        "  Models      : {} of {} (sequence position {} of {})",
        status.interaction_count, status.max_models, status.current_index, status.sequence_len
    );
    let unit = match status.budget {
        BudgetPolicy::Countdown { .. } => "second(s)",
        BudgetPolicy::Steps { .. } => "step(s)",
    };
    println!("  Budget      : {} {} left", status.budget_remaining, unit);
    if let Some(round) = status.recall_round {
        println!("  Recall round: {}", round);
    }
}

fn cmd_history(runner: &ExperimentRunner) {
    let history = match runner.seen_history() {
        Ok(history) => history,
        Err(e) => {
            println!("{}: {}", "History unavailable".red(), e);
            return;
        }
    };
    if history.is_empty() {
        println!("  {}", "No models seen yet.".dimmed());
        return;
    }
    println!("{}", "Seen Models".bold().underline());
    for entry in &history {
        let marker = if entry.session_id == runner.session_id() { "*" } else { " " };
        println!(
            "  {} {}  {}",
            marker.green().bold(),
            entry.model.bold(),
            entry.first_seen.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
    }
    println!("  {} model(s); * = this session", history.len());
}

fn cmd_help() {
    println!();
    println!("{}", "Turntable Commands".bold().underline());
    println!("  {}         – load the first model", "/start".bold().cyan());
    println!("  {}        – rotate up / left / down / right", "w a s d".bold().cyan());
    println!("  {}  – same as above", "/up /down /left /right".bold().cyan());
    println!("  {}          – load the next model", "/next".bold().cyan());
    println!("  {}        – show the session state", "/status".bold().cyan());
    println!("  {}       – list every model seen so far", "/history".bold().cyan());
    println!("  {}  – mark recall items 1, 3 as seen", "/answer 1 3".bold().cyan());
    println!("  {}         – start over with a fresh sequence", "/reset".bold().cyan());
    println!("  {}   – leave", "/quit  /exit".bold().cyan());
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Background events
// ─────────────────────────────────────────────────────────────────────────────

/// Feed one countdown tick to the runner.  Returns `true` when the trial
/// ended and the prompt needs redrawing.
async fn on_tick(runner: &mut ExperimentRunner, event: TimerEvent) -> bool {
    match runner.on_timer(event).await {
        Transition::Stay => {
            let left = runner.controller().budget_remaining();
            if left > 0 && left <= 3 {
                println!();
                println!("  {} {}s", "⏱".yellow(), left);
                return true;
            }
            false
        }
        Transition::Ignored => false,
        other => {
            println!();
            println!("  {}", "Time is up.".yellow());
            report_transition(runner, &other);
            true
        }
    }
}

fn drain_events(runner: &ExperimentRunner, phases: &mut TopicReceiver, records: &mut TopicReceiver) {
    while let Ok(event) = phases.try_recv() {
        announce_phase(runner, &event);
    }
    while let Ok(event) = records.try_recv() {
        report_record(&event);
    }
}

fn announce_phase(runner: &ExperimentRunner, event: &Event) {
    match &event.payload {
        EventPayload::PhaseChanged { phase: Phase::Recall, .. } => {
            println!();
            println!("{}", "═══════════════════════════════════════".bold());
            println!("{}", "           Recognition Test            ".bold().cyan());
            println!("{}", "═══════════════════════════════════════".bold());
            if let Some(test) = runner.recall_test() {
                print_recall_test(test);
            }
        }
        EventPayload::PhaseChanged { phase: Phase::End, .. } => {
            println!();
            println!("  {} Thank you for taking part!", "✓".green().bold());
        }
        EventPayload::PhaseChanged { phase: Phase::OutOfModels, .. } => {
            println!();
            println!(
                "  {} You have already seen every available model.",
                "Out of models.".yellow().bold()
            );
        }
        EventPayload::TrialStarted { model_name, index, .. } => {
            println!("  [{}] {}", index, model_name.bold());
        }
        _ => {}
    }
}

fn report_record(event: &Event) {
    if let EventPayload::SubmissionFailed { kind, details } = &event.payload {
        warn!(?kind, details = %details, "record not delivered");
    }
}

fn report_transition(runner: &ExperimentRunner, transition: &Transition) {
    match transition {
        Transition::Load(model) if runner.active_model().is_none() => {
            println!("  {} {}", "Could not load".red(), model.yellow());
        }
        Transition::Load(_) => {
            if let BudgetPolicy::Countdown { seconds } = runner.controller().config().budget {
                println!("  {}s to explore. Use {} to rotate.", seconds, "w a s d".bold());
            }
        }
        Transition::Stay | Transition::Ignored => {
            println!("  {}", "Nothing to do.".dimmed());
        }
        Transition::PhaseComplete | Transition::Exhausted => {}
    }
    if runner.phase() == RunnerPhase::Ended {
        println!("  Session is over. Type {} to start again.", "/reset".bold());
    }
}

fn print_recall_test(test: &RecallTest) {
    println!(
        "  Round {}: which of these did you see? Answer with {}.",
        test.round,
        "/answer <numbers>".bold()
    );
    for (i, item) in test.items.iter().enumerate() {
        println!("    {:>2}) {}  {}", i + 1, item.model_name.bold(), item.image.dimmed());
    }
}

fn print_score(batch: &MemoryTestBatch) {
    let correct = batch.results.iter().filter(|r| r.correct).count();
    println!(
        "  {} {} of {} correct",
        "✓".green().bold(),
        correct,
        batch.results.len()
    );
}

fn prompt() {
    print!("{} ", "turntable>".bold().cyan());
    std::io::stdout().flush().ok();
}
