//! A terminal tutoring chat that demonstrates how to use `tutor-relay`
//! as a library.

#[macro_use]
extern crate tracing;

use std::env;
use std::fs;
use std::io::Write as _;
use std::pin::pin;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::{select, signal};
use tutor_relay::core::retry::RelayEvent;
use tutor_relay::core::{ErrorKind, Session, SessionSnapshot, abort};
use tutor_relay::{Lesson, ProviderSettings};

const BAR_CHAR: &str = "▎";
const DEFAULT_LESSON: &str = include_str!("../lessons/civics.json");

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let settings = match ProviderSettings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    let lesson = match env::var("TUTOR_RELAY_LESSON") {
        Ok(path) => Lesson::from_path(path),
        Err(_) => Lesson::from_json(DEFAULT_LESSON),
    };
    let lesson = match lesson {
        Ok(lesson) => lesson,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    let snapshot = match load_snapshot() {
        Ok(snapshot) => snapshot,
        Err(err) => {
            eprintln!("failed to resume: {err}");
            return;
        }
    };
    let builder = match settings.session_builder() {
        Ok(builder) => builder,
        Err(err) => {
            eprintln!("failed to create the chat provider: {err}");
            return;
        }
    };

    let resuming = snapshot.is_some();
    let mut session = lesson.configure(builder, snapshot).build();

    if resuming {
        println!(
            "{}",
            format!("Resumed with {} messages.", session.messages().len())
                .dimmed()
        );
        print_progress(&session);
    } else if let Some(greeting) = &lesson.opening_message {
        println!("{}🤖 {}", BAR_CHAR.bright_cyan(), greeting.bright_white());
    }

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let mut lines = BufReader::new(io::stdin()).lines();

    while !session.is_wrapped_up() {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = select! {
            line = read_line(&mut lines) => line,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        run_turn(&mut session, line.trim(), &progress_style).await;
        print_progress(&session);
    }

    if session.is_wrapped_up() {
        println!("{}", "🎉 Lesson complete!".bright_green().bold());
    }

    match serde_json::to_string_pretty(&session.snapshot()) {
        Ok(json) => println!("{json}"),
        Err(err) => error!("failed to serialize the session: {err}"),
    }
}

async fn run_turn(session: &mut Session, line: &str, style: &ProgressStyle) {
    let (handle, signal) = abort::pair();
    let mut spinner = Some(new_spinner(style, "🤔 Thinking..."));
    let mut replying = false;

    let outcome = {
        let send = session.send_with_abort(line, signal, |event| match event {
            RelayEvent::Content(text) => {
                if let Some(spinner) = spinner.take() {
                    spinner.finish_and_clear();
                }
                if !replying {
                    print!("{}🤖 ", BAR_CHAR.bright_cyan());
                    replying = true;
                }
                print!("{}", text.bright_white());
                std::io::stdout().flush().ok();
            }
            RelayEvent::ThreadId(id) => {
                debug!("thread id: {id}");
            }
            RelayEvent::Retrying { notice, .. } => {
                if let Some(spinner) = spinner.take() {
                    spinner.finish_and_clear();
                }
                println!("{}{}", BAR_CHAR.bright_yellow(), notice.yellow());
                spinner = Some(new_spinner(style, "⏳ Waiting..."));
            }
            RelayEvent::Failed { notice, .. } => {
                if let Some(spinner) = spinner.take() {
                    spinner.finish_and_clear();
                }
                if replying {
                    println!();
                    replying = false;
                }
                println!("{}{}", BAR_CHAR.bright_red(), notice.red());
            }
        });

        let mut send = pin!(send);
        loop {
            select! {
                outcome = &mut send => break outcome,
                _ = signal::ctrl_c() => handle.abort(),
            }
        }
    };

    if let Some(spinner) = spinner.take() {
        spinner.finish_and_clear();
    }
    if replying {
        println!();
    }

    match outcome {
        Ok(Some(reply)) => {
            for id in &reply.newly_completed {
                let topics = session.topics();
                let Some(topic) = topics.iter().find(|t| t.id() == id.as_str())
                else {
                    continue;
                };
                println!(
                    "{}✅ Topic covered: {}",
                    BAR_CHAR.bright_green(),
                    topic.name().bold()
                );
            }
        }
        Ok(None) => {}
        Err(failure) if failure.error.kind() == ErrorKind::Aborted => {
            println!("{}", "Interrupted.".dimmed());
        }
        Err(failure) => {
            debug!("turn failed: {failure}");
        }
    }
}

fn new_spinner(style: &ProgressStyle, message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(style.clone());
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn print_progress(session: &Session) {
    let (completed, total) = session.tracker().progress();
    if total == 0 {
        return;
    }
    let pending: Vec<_> = session
        .topics()
        .iter()
        .filter(|topic| !topic.is_completed())
        .map(|topic| topic.name())
        .collect();
    let summary = format!("{completed}/{total} topics covered");
    if pending.is_empty() {
        println!("{}{}", BAR_CHAR.bright_green(), summary.dimmed());
    } else {
        println!(
            "{}{} (remaining: {})",
            BAR_CHAR.bright_green(),
            summary.dimmed(),
            pending.join(", ").dimmed()
        );
    }
}

fn load_snapshot()
-> Result<Option<SessionSnapshot>, Box<dyn std::error::Error>> {
    let Ok(path) = env::var("TUTOR_RELAY_RESUME") else {
        return Ok(None);
    };
    info!("resuming from {path}");
    let json = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&json)?))
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Option<String> {
    match lines.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
