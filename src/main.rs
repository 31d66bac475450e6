use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use inbox_agent::config::{SmtpConfig, WorkflowConfig};
use inbox_agent::error::RunFailure;
use inbox_agent::llm::create_provider;
use inbox_agent::pipeline::approval::{AutoApprove, ReviewDecision, ReviewRequest, Reviewer};
use inbox_agent::pipeline::dispatch::Mailbox;
use inbox_agent::pipeline::types::EmailRecord;
use inbox_agent::services::{CommitmentCalendar, MemoryMailbox, SmtpMailbox, StaticDirectory};
use inbox_agent::workflow::{RunState, WorkflowDeps, WorkflowEngine};

const USAGE: &str = "\
Usage:
  inbox-agent [--auto-approve | --pause-to <dir>]
  inbox-agent resume <run.json> approve|reject [note]
  inbox-agent redispatch <run.json>";

enum Command {
    Demo(ReviewMode),
    Resume {
        path: PathBuf,
        decision: ReviewDecision,
    },
    /// Retry delivery of a failed run as a new run.
    Redispatch(PathBuf),
}

enum ReviewMode {
    Interactive,
    AutoApprove,
    /// Save paused runs as JSON for a later `resume`.
    PauseTo(PathBuf),
}

fn parse_args(args: &[String]) -> Option<Command> {
    match args {
        [] => Some(Command::Demo(ReviewMode::Interactive)),
        [flag] if flag == "--auto-approve" => Some(Command::Demo(ReviewMode::AutoApprove)),
        [flag, dir] if flag == "--pause-to" => {
            Some(Command::Demo(ReviewMode::PauseTo(PathBuf::from(dir))))
        }
        [cmd, path, verdict, note @ ..] if cmd == "resume" => {
            let decision = match verdict.as_str() {
                "approve" => ReviewDecision::Approve {
                    reviewer: Some("cli".into()),
                },
                "reject" => ReviewDecision::Reject {
                    note: (!note.is_empty()).then(|| note.join(" ")),
                },
                _ => return None,
            };
            Some(Command::Resume {
                path: PathBuf::from(path),
                decision,
            })
        }
        [cmd, path] if cmd == "redispatch" => Some(Command::Redispatch(PathBuf::from(path))),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = parse_args(&args) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = WorkflowConfig::from_env().context("invalid INBOX_AGENT_* configuration")?;
    let llm_config = config.llm_config_from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export OPENAI_API_KEY=sk-...");
        std::process::exit(1);
    });
    let llm = create_provider(&llm_config)?;

    eprintln!("📬 Inbox Agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model_name);
    eprintln!(
        "   Approval timeout: {}h",
        config.approval_timeout.as_secs() / 3600
    );

    let mailbox: Arc<dyn Mailbox> = match SmtpConfig::from_env() {
        Some(smtp) => {
            eprintln!("   Mailbox: SMTP via {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpMailbox::new(smtp))
        }
        None => {
            eprintln!("   Mailbox: in-memory (set INBOX_AGENT_SMTP_HOST to send)");
            Arc::new(MemoryMailbox::new())
        }
    };

    let deps = WorkflowDeps {
        llm,
        directory: Arc::new(StaticDirectory::demo()),
        calendar: Arc::new(CommitmentCalendar::demo(Utc::now(), config.days_ahead)),
        mailbox,
    };
    let engine = WorkflowEngine::new(config, deps);

    match command {
        Command::Demo(mode) => run_demo(&engine, mode).await,
        Command::Resume { path, decision } => {
            let state = RunState::load(&path)
                .await
                .with_context(|| format!("failed to load run from {}", path.display()))?;
            let outcome = engine.resume(state, decision).await;
            report(&outcome);
            persist_outcome(&outcome, &path).await
        }
        Command::Redispatch(path) => {
            let failed = RunState::load(&path)
                .await
                .with_context(|| format!("failed to load run from {}", path.display()))?;
            let outcome = engine.redispatch(&failed).await;
            report(&outcome);
            let state = outcome_state(&outcome);
            let new_path = path.with_file_name(format!("{}.json", state.run_id));
            persist_outcome(&outcome, &new_path).await?;
            println!("💾 Saved: {}", new_path.display());
            Ok(())
        }
    }
}

/// The run state an outcome carries, including the state preserved by a failure.
fn outcome_state(outcome: &Result<RunState, RunFailure>) -> &RunState {
    match outcome {
        Ok(state) => state,
        Err(failure) => &failure.state,
    }
}

async fn persist_outcome(
    outcome: &Result<RunState, RunFailure>,
    path: &Path,
) -> anyhow::Result<()> {
    outcome_state(outcome)
        .save(path)
        .await
        .with_context(|| format!("failed to save run to {}", path.display()))
}

/// Console logs to stderr; daily rolling file when `INBOX_AGENT_LOG_DIR` is set.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let mut log_guard = None;
    let file_layer = std::env::var("INBOX_AGENT_LOG_DIR").ok().map(|dir| {
        let file_appender = tracing_appender::rolling::daily(dir, "inbox-agent.log");
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        log_guard = Some(guard);
        tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_filter(env_filter.clone())
    });

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    log_guard
}

fn demo_emails() -> Vec<EmailRecord> {
    let now = Utc::now();
    vec![
        EmailRecord::new(
            "ceo@company.com",
            "Meeting Request: Q4 Strategy Discussion",
            "Hi, I'd like to schedule a meeting next week to discuss our Q4 strategy. \
             Are you available Tuesday or Wednesday afternoon?",
            now,
        )
        .with_sender_title("CEO")
        .with_sender_company("Important Corp"),
        EmailRecord::new(
            "support@customer.com",
            "Question about your product features",
            "Hello, I'm interested in learning more about your product's API capabilities. \
             Can you provide some documentation?",
            now,
        ),
        EmailRecord::new(
            "newsletter@spam.com",
            "🎉 Amazing deals just for you!",
            "Don't miss out on these incredible deals! Click here to save 90% on everything!",
            now,
        ),
    ]
}

async fn run_demo(engine: &WorkflowEngine, mode: ReviewMode) -> anyhow::Result<()> {
    let reviewer: Box<dyn Reviewer> = match mode {
        ReviewMode::Interactive => Box::new(StdinReviewer),
        ReviewMode::AutoApprove => Box::new(AutoApprove),
        ReviewMode::PauseTo(dir) => return pause_demo(engine, &dir).await,
    };

    for (i, email) in demo_emails().into_iter().enumerate() {
        print_header(i + 1, &email);
        let outcome = engine.run_with_reviewer(email, reviewer.as_ref()).await;
        report(&outcome);
    }
    Ok(())
}

/// Run the demo emails concurrently and park paused runs on disk.
async fn pause_demo(engine: &WorkflowEngine, dir: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let emails = demo_emails();
    for (i, email) in emails.iter().enumerate() {
        print_header(i + 1, email);
    }

    for outcome in engine.process_batch(emails).await {
        report(&outcome);
        if let Ok(state) = outcome
            && state.is_paused()
        {
            let path = dir.join(format!("{}.json", state.run_id));
            state.save(&path).await?;
            println!("⏸  Saved for review: {}", path.display());
        }
    }
    Ok(())
}

fn print_header(n: usize, email: &EmailRecord) {
    let preview: String = email.body.chars().take(100).collect();
    println!("\n{}", "=".repeat(60));
    println!("PROCESSING EMAIL {n}");
    println!("{}", "=".repeat(60));
    println!("From: {}", email.sender);
    println!("Subject: {}", email.subject);
    println!("Content: {preview}...");
}

fn report(outcome: &Result<RunState, RunFailure>) {
    match outcome {
        Ok(state) => {
            if let Some(c) = state.classification() {
                println!("✅ Classification: {} ({})", c.intent, c.urgency);
                println!("📝 Reasoning: {}", c.reasoning);
            }
            match state.status() {
                Some(status) => println!("🏁 Outcome: {status}"),
                None => println!("⏸  Outcome: awaiting approval ({})", state.run_id),
            }
        }
        Err(failure) => {
            println!("❌ Run failed at {}: {}", failure.stage, failure.error);
        }
    }
}

/// Shows the draft on stdout and reads a verdict from stdin.
struct StdinReviewer;

#[async_trait]
impl Reviewer for StdinReviewer {
    async fn review(&self, request: &ReviewRequest) -> ReviewDecision {
        let draft = &request.draft;
        println!("\n{}", "=".repeat(50));
        println!("DRAFT EMAIL FOR REVIEW");
        println!("{}", "=".repeat(50));
        println!("To: {}", request.email.sender);
        println!("Subject: {}", draft.subject);
        println!("Tone: {}", draft.tone);
        println!("\nContent:\n{}", draft.body);
        if !draft.proposed_times.is_empty() {
            println!("\nProposed times:");
            for slot in &draft.proposed_times {
                println!("  - {}", slot.render());
            }
        }
        println!("{}", "=".repeat(50));
        println!("Decide before {}. [a]pprove / [r]eject <note>:", request.deadline);

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        if stdin.read_line(&mut line).await.is_err() {
            return ReviewDecision::reject("could not read reviewer input");
        }

        let line = line.trim();
        match line.split_once(char::is_whitespace).unwrap_or((line, "")) {
            ("a" | "approve" | "y" | "yes", _) => ReviewDecision::Approve {
                reviewer: std::env::var("USER").ok(),
            },
            (_, note) => ReviewDecision::Reject {
                note: (!note.trim().is_empty()).then(|| note.trim().to_string()),
            },
        }
    }
}
