use agent_chat::{AgentClient, CallResult, ChatError, ConversationHistory, Transport, sink_fn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, BufReader, Lines};
use tokio::sync::mpsc;
use tracing::debug;

use crate::render::{self, OutputMode};

const HELP: &str = "\
Examples:
  list all clusters
  show the clients in cluster production
  create a client named edge-01 in cluster staging
Commands:
  clear   reset conversation history
  help    show this message
  exit    leave (also: quit)";

/// Input line interpretation for the interactive session.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Empty,
    Exit,
    Help,
    Clear,
    Message(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let trimmed = line.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => Command::Empty,
        "exit" | "quit" => Command::Exit,
        "help" => Command::Help,
        "clear" => Command::Clear,
        _ => Command::Message(trimmed),
    }
}

/// What the prompt produced.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Line(String),
    Eof,
    Interrupted,
}

/// Forwards every Ctrl-C for the rest of the process. The session exits on
/// one at the prompt and aborts the reply in flight otherwise.
fn spawn_interrupt_listener() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

async fn next_input<R>(
    lines: &mut Lines<R>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> std::io::Result<Input>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        biased;
        Some(()) = interrupts.recv() => Ok(Input::Interrupted),
        line = lines.next_line() => Ok(match line? {
            Some(line) => Input::Line(line),
            None => Input::Eof,
        }),
    }
}

pub async fn send_once(
    client: &AgentClient,
    message: &str,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let mut sink = sink_fn(|notification| render::print(mode, &notification));
    client.chat_stream(message, &[], &mut sink).await?;
    Ok(())
}

pub async fn run_interactive(
    client: &AgentClient,
    api: &str,
    mode: OutputMode,
) -> anyhow::Result<()> {
    println!("Agent chat - connected to {api}");
    println!("Type 'help' for examples, 'exit' to leave. Ctrl-C interrupts a reply, or exits at the prompt.\n");

    let mut interrupts = spawn_interrupt_listener();
    let mut history = ConversationHistory::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_prompt();
        let line = match next_input(&mut lines, &mut interrupts).await? {
            Input::Line(line) => line,
            Input::Eof => break,
            Input::Interrupted => {
                println!();
                break;
            }
        };
        match parse_command(&line) {
            Command::Empty => continue,
            Command::Exit => break,
            Command::Help => println!("{HELP}"),
            Command::Clear => {
                history.clear();
                println!("Conversation history cleared");
            }
            Command::Message(message) => {
                let reply = stream_reply(client, &history, message, mode, &mut interrupts).await;
                match reply {
                    Ok(result) => history.record_exchange(message, result.message),
                    Err(ChatError::Cancelled) => println!("\n(interrupted)"),
                    Err(err) => eprintln!("\nerror: {err}"),
                }
            }
        }
        println!();
    }
    println!("Goodbye!");
    Ok(())
}

async fn stream_reply<T>(
    client: &AgentClient<T>,
    history: &ConversationHistory,
    message: &str,
    mode: OutputMode,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> Result<CallResult, ChatError>
where
    T: Transport + ?Sized + 'static,
{
    let mut stream = client.start_stream(history.request(message)).await?;
    let abort = stream.abort_handle();

    if mode == OutputMode::Text {
        print!("Agent: ");
    }
    loop {
        tokio::select! {
            notification = stream.next_notification() => match notification {
                Some(notification) => render::print(mode, &notification),
                None => break,
            },
            Some(()) = interrupts.recv(), if !abort.is_aborted() => abort.abort(),
        }
    }
    // A Ctrl-C that raced the end of the reply must not end the session.
    while interrupts.try_recv().is_ok() {}
    let result = stream.finish().await;
    debug!(ok = result.is_ok(), turns = history.len(), "reply finished");
    result
}

fn print_prompt() {
    use std::io::Write as _;
    print!("You: ");
    let _ = std::io::stdout().flush();
}
