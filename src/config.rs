use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "hookcast", version, about = "Compose component messages and post them to a Discord webhook")]
pub struct Config {
    /// Webhook to post to; falls back to the last saved one.
    #[arg(
        long = "webhook-url",
        alias = "url",
        env = "HOOKCAST_WEBHOOK_URL",
        value_name = "URL",
        help = "Webhook URL (defaults to the last one saved in the store)"
    )]
    pub webhook_url: Option<String>,

    /// Component tree to start from.
    #[arg(
        long = "message",
        short = 'm',
        value_name = "FILE",
        help = "JSON file with a component array or an object holding `components`"
    )]
    pub message: Option<PathBuf>,

    #[arg(long = "attach", value_name = "FILE", help = "Upload FILE with the message (repeatable)")]
    pub attachments: Vec<PathBuf>,

    /// Answers the thread title prompt without asking.
    #[arg(
        long = "thread-name",
        value_name = "NAME",
        help = "Thread name used when the webhook requires one"
    )]
    pub thread_name: Option<String>,

    #[arg(
        long = "store",
        env = "HOOKCAST_STORE",
        value_name = "FILE",
        help = "Key/value file remembering the webhook URL"
    )]
    pub store: Option<PathBuf>,

    #[arg(long = "send", help = "Send once and exit instead of starting a session")]
    pub send: bool,

    #[arg(long = "codegen", help = "Print the escaped component JSON and exit")]
    pub codegen: bool,
}

impl Config {
    pub fn is_batch(&self) -> bool {
        self.send || self.codegen
    }
}
