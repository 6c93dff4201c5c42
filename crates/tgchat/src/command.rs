//! Console command grammar.

use tgchat_room::ParticipantId;

use crate::error::ChatError;

/// Command summary printed by `/help` and after usage errors.
pub const HELP: &str = "\
/me                   get your PID
/tell <pid> <msg>     send message to particular user
/say <msg>            broadcast message
/help                 show this help
/exit                 exit from chat
";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Me,
    Tell { target: ParticipantId, text: String },
    Say { text: String },
    Help,
    Exit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ChatError> {
        let (word, rest) = split_word(line);
        match word {
            "" => Err(ChatError::Usage("empty command".into())),
            "/me" => Ok(Self::Me),
            "/help" => Ok(Self::Help),
            "/exit" => Ok(Self::Exit),
            "/tell" => {
                let (pid, rest) = split_word(rest);
                if pid.is_empty() {
                    return Err(ChatError::Usage("/tell needs a pid and a message".into()));
                }
                let target = pid
                    .parse()
                    .map_err(|e| ChatError::Usage(format!("/tell: {e}")))?;
                let text = message_text(rest, "/tell")?;
                Ok(Self::Tell { target, text })
            }
            "/say" => {
                let text = message_text(rest, "/say")?;
                Ok(Self::Say { text })
            }
            other => Err(ChatError::Usage(format!("unknown command {other:?}"))),
        }
    }
}

/// Split off the first whitespace-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(end) => (&s[..end], &s[end..]),
        None => (s, ""),
    }
}

fn message_text(rest: &str, command: &str) -> Result<String, ChatError> {
    let text = rest.trim_start();
    if text.is_empty() {
        return Err(ChatError::Usage(format!("{command} needs a message")));
    }
    Ok(text.to_string())
}
