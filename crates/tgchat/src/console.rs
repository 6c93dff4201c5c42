//! Interactive command loop.
//!
//! Reads one command per line and, concurrently, drains the session's
//! notification inbox so incoming messages show up while the user is typing.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::command::{Command, HELP};
use crate::error::ChatError;
use crate::notify::{Envelope, Inbox, Notifier};
use crate::session::Session;

const PROMPT: &str = "> ";

enum Flow {
    Continue,
    Exit,
}

enum Event {
    Line(std::io::Result<usize>),
    Notification(Option<Envelope>),
}

/// Run the loop until `/exit` (returns `Ok`), end of input
/// ([`ChatError::Input`]) or a fatal error.
///
/// Lines are taken as raw bytes; invalid UTF-8 is replaced rather than
/// rejected. The caller is responsible for leaving the room afterwards.
pub async fn run<N, R, W>(
    session: &Session<N>,
    inbox: &mut Inbox,
    mut input: R,
    out: &mut W,
) -> Result<(), ChatError>
where
    N: Notifier,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    // Partial lines survive a notification winning the select.
    let mut line = Vec::new();
    loop {
        write_out(out, PROMPT)?;

        let event = tokio::select! {
            read = input.read_until(b'\n', &mut line) => Event::Line(read),
            envelope = inbox.recv() => Event::Notification(envelope),
        };

        match event {
            Event::Line(Ok(0)) if line.is_empty() => return Err(ChatError::Input),
            Event::Line(Ok(_)) => {
                let text = String::from_utf8_lossy(&line).into_owned();
                line.clear();
                match execute(session, text.trim_end_matches(['\n', '\r']), out) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Exit) => return Ok(()),
                    Err(e) if e.is_recoverable() => report(out, &e)?,
                    Err(e) => return Err(e),
                }
            }
            Event::Line(Err(e)) => {
                tracing::warn!(error = %e, "reading input failed");
                return Err(ChatError::Input);
            }
            Event::Notification(envelope) => {
                let envelope = envelope.ok_or_else(|| {
                    ChatError::Signal("notification channel closed".into())
                })?;
                if let Some(message) = session.handle(envelope)? {
                    // Overwrite the pending prompt.
                    write_out(out, &format!("\r{}\n", message.render()))?;
                }
            }
        }
    }
}

fn execute<N: Notifier, W: Write>(
    session: &Session<N>,
    line: &str,
    out: &mut W,
) -> Result<Flow, ChatError> {
    match Command::parse(line)? {
        Command::Me => write_out(out, &format!("PID: {}\n", session.id()))?,
        Command::Tell { target, text } => {
            session.tell(target, &text)?;
        }
        Command::Say { text } => {
            let broadcast = session.say(&text)?;
            for (recipient, e) in &broadcast.failed {
                write_out(out, &format!("not delivered to {recipient}: {e}\n"))?;
            }
        }
        Command::Help => write_out(out, HELP)?,
        Command::Exit => return Ok(Flow::Exit),
    }
    Ok(Flow::Continue)
}

fn report<W: Write>(out: &mut W, e: &ChatError) -> Result<(), ChatError> {
    write_out(out, &format!("error: {e}\n"))?;
    if matches!(e, ChatError::Usage(_)) {
        write_out(out, HELP)?;
    }
    Ok(())
}

fn write_out<W: Write>(out: &mut W, text: &str) -> Result<(), ChatError> {
    out.write_all(text.as_bytes())
        .and_then(|()| out.flush())
        .map_err(ChatError::Output)
}
