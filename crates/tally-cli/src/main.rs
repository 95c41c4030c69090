//! tally - chat with the assistant of a bookkeeping server

mod commands;
mod config;
mod render;
mod transcript;
mod utils;

use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;
use tally_ai::providers::http::HttpTransport;
use tally_assistant::{Assistant, ConversationMessage};

use crate::render::ReplyPrinter;
use crate::transcript::Transcript;

/// tally - ask questions about your bookkeeping data
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API root of the bookkeeping server (default: http://localhost:8080/api/v1)
    #[arg(short, long)]
    base_url: Option<String>,

    /// Bearer token (default: config file, then TALLY_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Ask a single question and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Summarize the conversation and exit (useful with --resume)
    #[arg(long)]
    summary: bool,

    /// Wait for whole replies instead of streaming them
    #[arg(long)]
    no_stream: bool,

    /// Print the assistant's reasoning while it streams
    #[arg(long)]
    thinking: bool,

    /// Resume a saved transcript by ID
    #[arg(long)]
    resume: Option<String>,

    /// List saved transcripts
    #[arg(long)]
    transcripts: bool,

    /// Do not save this conversation
    #[arg(long)]
    no_save: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

/// What to ask the assistant for
enum Ask<'a> {
    Message(&'a str),
    Summary,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("tally=debug")
    } else {
        match tracing_subscriber::EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => return,
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // List transcripts and exit
    if args.transcripts {
        return list_transcripts();
    }

    let cfg = config::Config::load();

    // CLI args take precedence over the config file
    let base_url = args
        .base_url
        .clone()
        .unwrap_or_else(|| cfg.base_url().to_string());

    let mut transport = HttpTransport::new(base_url.clone());
    match args.token.clone().or_else(|| cfg.token()) {
        Some(token) => transport = transport.with_token(token),
        None => tracing::warn!("no token configured, requests are sent unauthenticated"),
    }
    if let Some(timeout) = cfg.timeout() {
        transport = transport.with_timeout(timeout);
    }

    let mut assistant_config = cfg.assistant_config();
    if args.no_stream {
        assistant_config.streaming = false;
    }
    if !assistant_config.enabled {
        eprintln!("The AI assistant is disabled in {}", config::Config::config_path().display());
        std::process::exit(1);
    }

    let mut assistant = Assistant::new(assistant_config, Arc::new(transport));
    let mut printer = ReplyPrinter::new(args.thinking || cfg.show_thinking.unwrap_or(false));

    let transcript = if let Some(ref id) = args.resume {
        match Transcript::load(id) {
            Ok((transcript, messages)) => {
                eprintln!("Resuming transcript {} ({} messages)", id, messages.len());
                assistant.restore(messages);
                Some(transcript)
            }
            Err(e) => {
                eprintln!("Error loading transcript: {}", e);
                std::process::exit(1);
            }
        }
    } else if args.no_save {
        None
    } else {
        match Transcript::create(&base_url) {
            Ok(transcript) => Some(transcript),
            Err(e) => {
                tracing::warn!("transcript will not be saved: {}", e);
                None
            }
        }
    };

    // Non-interactive mode
    if args.summary || args.command.is_some() {
        let request = match args.command.as_deref() {
            Some(command) => Ask::Message(command),
            None => Ask::Summary,
        };
        let result = ask(&mut assistant, request, &mut printer).await;
        save(transcript.as_ref(), &assistant);
        // ask() already reported the failure
        if result.is_err_and(|e| e.user_message().is_some()) {
            std::process::exit(1);
        }
        return Ok(());
    }

    run_interactive(&mut assistant, &mut printer, transcript.as_ref(), &base_url).await
}

/// Send one request, printing the reply as it arrives.
///
/// Ctrl-C cancels the request; the partial reply stays in the conversation.
async fn ask(
    assistant: &mut Assistant,
    request: Ask<'_>,
    printer: &mut ReplyPrinter,
) -> tally_assistant::Result<ConversationMessage> {
    let handle = assistant.handle();
    let mut snapshots = assistant.subscribe();
    snapshots.mark_unchanged();
    printer.mark_seen(&assistant.snapshot());
    let mut stdout = io::stdout();

    let result = {
        let send = async {
            match request {
                Ask::Message(text) => assistant.send_message(text).await,
                Ask::Summary => assistant.generate_summary().await,
            }
        };
        tokio::pin!(send);

        let mut watching = true;
        loop {
            tokio::select! {
                result = &mut send => break result,
                changed = snapshots.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    if let Err(e) = printer.update(&snapshot, &mut stdout) {
                        tracing::debug!("failed to render reply: {}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    if handle.cancel() {
                        eprintln!("\n[canceling]");
                    }
                }
            }
        }
    };

    // The last patch can land in the same poll that completes the request
    if let Err(e) = printer.update(&assistant.snapshot(), &mut stdout) {
        tracing::debug!("failed to render reply: {}", e);
    }

    match &result {
        Ok(message) => {
            if let Err(e) = printer.finish(message, &mut stdout) {
                tracing::debug!("failed to render reply: {}", e);
            }
        }
        Err(e) if e.is_canceled() => eprintln!("\n[canceled]"),
        Err(e) => {
            println!();
            if let Some(message) = e.user_message() {
                eprintln!("Error: {}", message);
            }
        }
    }

    result
}

async fn run_interactive(
    assistant: &mut Assistant,
    printer: &mut ReplyPrinter,
    transcript: Option<&Transcript>,
    base_url: &str,
) -> anyhow::Result<()> {
    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        match transcript {
            Some(t) => eprintln!(
                "tally ({}) transcript: {}",
                base_url,
                t.id().get(..8).unwrap_or(t.id())
            ),
            None => eprintln!("tally ({})", base_url),
        }
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        // Handle slash commands
        if let Some(result) = commands::execute_command(input, assistant) {
            match result {
                commands::CommandResult::Clear => {
                    assistant.clear();
                    save(transcript, assistant);
                    println!("Cleared conversation.");
                }
                commands::CommandResult::Summary => {
                    println!();
                    let _ = ask(assistant, Ask::Summary, printer).await;
                    save(transcript, assistant);
                }
                commands::CommandResult::SetStreaming(on) => {
                    assistant.set_streaming(on);
                    println!("Streaming {}.", if on { "on" } else { "off" });
                }
                commands::CommandResult::Message(msg) => {
                    println!("{}", msg);
                }
                commands::CommandResult::Exit => {
                    break;
                }
                commands::CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            println!();
            continue;
        }

        println!();
        let _ = ask(assistant, Ask::Message(input), printer).await;
        save(transcript, assistant);
        println!();
    }

    Ok(())
}

fn save(transcript: Option<&Transcript>, assistant: &Assistant) {
    if let Some(t) = transcript {
        if let Err(e) = t.save(assistant.messages()) {
            tracing::warn!("failed to save transcript {}: {}", t.id(), e);
        }
    }
}

fn list_transcripts() -> anyhow::Result<()> {
    match Transcript::list() {
        Ok(transcripts) => {
            if transcripts.is_empty() {
                println!("No saved transcripts found.");
                println!(
                    "Transcripts are stored in: {}",
                    Transcript::transcripts_dir().display()
                );
            } else {
                println!("Saved transcripts:\n");
                println!("{:<38} {:<20} {:<8} Server", "ID", "Created", "Msgs");
                println!("{}", "-".repeat(90));
                for t in transcripts {
                    println!(
                        "{:<38} {:<20} {:<8} {}",
                        t.id,
                        t.created_at_display(),
                        t.message_count,
                        t.base_url
                    );
                }
                println!("\nResume with: tally --resume <transcript-id>");
            }
        }
        Err(e) => {
            eprintln!("Error listing transcripts: {}", e);
        }
    }
    Ok(())
}
