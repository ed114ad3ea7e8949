use std::{
    io::{self, BufRead},
    path::PathBuf,
    str::FromStr,
    thread,
};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::protocol::{ApiError, WebhookResponse};

pub const HELP: &str = "\
commands:
  url <URL>       set the webhook url (saved after it stops changing)
  load <FILE>     load the component tree from a JSON file
  attach <FILE>   upload FILE alongside the message
  detach          drop all attachments
  clear           start over with an empty component tree
  send            post the message to the webhook
  title <NAME>    name the new thread when the webhook asks for one
  cancel          dismiss the thread title prompt
  codegen         print the component tree as an escaped JSON string
  status          show the current target and last response
  help            show this list
  quit            leave";

#[derive(Debug)]
pub enum Event {
    Input(Command),
    Invalid(CommandError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Url(String),
    Load(PathBuf),
    Attach(PathBuf),
    Detach,
    Clear,
    Send,
    Title(String),
    Cancel,
    Codegen,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let path = |name: &'static str| {
            if rest.is_empty() {
                Err(CommandError::MissingArgument(name))
            } else {
                Ok(PathBuf::from(rest))
            }
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "url" => Self::Url(rest.to_owned()),
            "load" => Self::Load(path("load")?),
            "attach" => Self::Attach(path("attach")?),
            "detach" => Self::Detach,
            "clear" => Self::Clear,
            "send" => Self::Send,
            "title" => Self::Title(rest.to_owned()),
            "cancel" => Self::Cancel,
            "codegen" => Self::Codegen,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_owned())),
        };

        Ok(command)
    }
}

/// Reads stdin lines on a plain thread: a blocked read must not hold up
/// runtime shutdown. The thread ends on EOF or once the receiver is gone.
pub fn spawn_input_loop(tx: mpsc::UnboundedSender<Event>) {
    let spawned = thread::Builder::new()
        .name("hookcast-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        error!(?err, "failed to read console input");
                        break;
                    }
                };

                if line.trim().is_empty() {
                    continue;
                }

                let event = match line.parse::<Command>() {
                    Ok(command) => Event::Input(command),
                    Err(err) => Event::Invalid(err),
                };

                if tx.send(event).is_err() {
                    break;
                }
            }
            debug!("console input closed");
        });

    if let Err(err) = spawned {
        error!(?err, "failed to start console input thread");
    }
}

pub fn render_response(response: &WebhookResponse) -> String {
    let mut buf = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    if let Err(err) = response.serialize(&mut serializer) {
        return format!("<unrenderable response: {err}>");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn render_field_errors(error: &ApiError) -> Vec<String> {
    error
        .field_errors()
        .into_iter()
        .map(|entry| {
            let path = if entry.path.is_empty() { "(message)" } else { entry.path.as_str() };
            match entry.code {
                Some(code) => format!("  {path}: {} [{code}]", entry.message),
                None => format!("  {path}: {}", entry.message),
            }
        })
        .collect()
}
