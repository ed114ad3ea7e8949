use std::{
    io::{self, Write},
    path::Path,
    sync::Arc,
};

use color_eyre::{Result, eyre::eyre};
use tokio::{select, sync::mpsc};
use tracing::{debug, info, warn};

use crate::{
    client::{self, DispatchError, WebhookClient},
    codegen,
    config::Config,
    console::{self, Command, Event},
    persist::{self, FileStore, PersistScheduler, UrlStore},
    request::{self, Attachment, MessageDraft},
    state::{Attempt, Phase, Session},
    target,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub struct HookcastApp {
    webhook_url: String,
    draft: MessageDraft,
    session: Session,
    client: WebhookClient,
    persist: Option<PersistScheduler>,
    thread_name: Option<String>,
    prompt_available: bool,
    batch: Option<Batch>,
    out: Box<dyn Write + Send>,
}

#[derive(Debug, Clone, Copy)]
struct Batch {
    codegen: bool,
    send: bool,
}

impl HookcastApp {
    pub async fn bootstrap(config: Config) -> Result<Self> {
        let store_path = config
            .store
            .clone()
            .or_else(FileStore::default_path)
            .ok_or_else(|| eyre!("no config directory found; pass --store <FILE>"))?;
        let store = FileStore::new(store_path);
        debug!(path = %store.path().display(), "using key/value store");

        let stored_url = match store.load().await {
            Ok(value) => value,
            Err(err) => {
                warn!(?err, "failed to read saved webhook url");
                None
            }
        };

        let mut draft = MessageDraft::default();
        if let Some(path) = &config.message {
            draft.components = MessageDraft::load_components(path).await?;
        }
        for path in &config.attachments {
            draft.attachments.push(Attachment::read(path).await?);
        }

        let batch = config.is_batch().then_some(Batch {
            codegen: config.codegen,
            send: config.send,
        });
        let persist = batch
            .is_none()
            .then(|| PersistScheduler::new(Arc::new(store) as Arc<dyn UrlStore>, persist::DEFAULT_WINDOW));

        let mut app = Self::new(
            WebhookClient::new()?,
            persist,
            Box::new(io::stdout()),
            config.thread_name,
        );
        app.batch = batch;
        app.prompt_available = batch.is_none() || app.thread_name.is_some();
        app.draft = draft;
        app.webhook_url = stored_url.unwrap_or_default();

        if let Some(url) = config.webhook_url {
            app.set_webhook_url(url);
        }

        Ok(app)
    }

    fn new(
        client: WebhookClient,
        persist: Option<PersistScheduler>,
        out: Box<dyn Write + Send>,
        thread_name: Option<String>,
    ) -> Self {
        Self {
            webhook_url: String::new(),
            draft: MessageDraft::default(),
            session: Session::default(),
            client,
            persist,
            thread_name: thread_name.filter(|name| !name.is_empty()),
            prompt_available: true,
            batch: None,
            out,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        if let Some(batch) = self.batch {
            return self.run_batch(batch).await;
        }

        info!("starting interactive session");
        self.emit("hookcast ready, type `help` for commands");

        let (tx, mut rx) = mpsc::unbounded_channel();
        console::spawn_input_loop(tx);

        loop {
            let flow = select! {
                maybe_event = rx.recv() => match maybe_event {
                    Some(Event::Input(command)) => self.handle_command(command).await,
                    Some(Event::Invalid(err)) => {
                        self.emit(&err.to_string());
                        Flow::Continue
                    }
                    None => Flow::Exit,
                },
                ctrl_c = tokio::signal::ctrl_c() => {
                    if let Err(err) = ctrl_c {
                        warn!(?err, "failed to listen for ctrl+c");
                    } else {
                        info!("received ctrl+c");
                    }
                    Flow::Exit
                }
            };

            if flow == Flow::Exit {
                break;
            }
        }

        self.teardown();
        info!("hookcast shutting down");
        Ok(())
    }

    async fn run_batch(mut self, batch: Batch) -> Result<()> {
        if batch.codegen {
            let text = codegen::render(&self.draft.components);
            self.emit(&text);
        }

        if batch.send {
            self.send_message().await?;
            if !self.session.response().is_some_and(|response| response.is_delivered()) {
                return Err(eyre!("the webhook did not accept the message"));
            }
        }

        Ok(())
    }

    async fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Url(url) => self.set_webhook_url(url),
            Command::Load(path) => self.load_components(&path).await,
            Command::Attach(path) => match Attachment::read(&path).await {
                Ok(attachment) => {
                    self.emit(&format!("attached {} ({} bytes)", attachment.name, attachment.bytes.len()));
                    self.draft.attachments.push(attachment);
                }
                Err(err) => self.emit(&err.to_string()),
            },
            Command::Detach => {
                self.draft.attachments.clear();
                self.emit("attachments cleared");
            }
            Command::Clear => {
                self.draft.components = Default::default();
                self.emit("component tree cleared");
            }
            Command::Send => {
                if let Err(err) = self.send_message().await {
                    self.emit(&format!("send failed: {err}"));
                }
            }
            Command::Title(title) => self.submit_title(title).await,
            Command::Cancel => {
                if self.session.phase() == Phase::AwaitingTitle {
                    self.session = std::mem::take(&mut self.session).dismiss_title();
                    self.emit("thread title prompt dismissed");
                } else {
                    self.emit("nothing to cancel");
                }
            }
            Command::Codegen => {
                let text = codegen::render(&self.draft.components);
                self.emit(&text);
            }
            Command::Status => self.show_status(),
            Command::Help => self.emit(console::HELP),
            Command::Quit => return Flow::Exit,
        }

        Flow::Continue
    }

    fn set_webhook_url(&mut self, url: String) {
        self.webhook_url = url;
        if let Some(persist) = self.persist.as_mut() {
            persist.schedule(self.webhook_url.clone());
        }

        let resolved = target::resolve(&self.webhook_url);
        if let Some(thread_id) = &resolved.thread_id {
            self.emit(&format!("messages will be posted into thread {thread_id}"));
        }
    }

    async fn load_components(&mut self, path: &Path) {
        match MessageDraft::load_components(path).await {
            Ok(components) => {
                self.emit(&format!("loaded {} components", components.len()));
                self.draft.components = components;
            }
            Err(err) => self.emit(&err.to_string()),
        }
    }

    async fn send_message(&mut self) -> Result<(), DispatchError> {
        if self.draft.components.is_empty() {
            warn!("sending an empty component tree");
        }
        self.dispatch(Attempt::Initial, None).await?;

        if self.session.phase() == Phase::AwaitingTitle {
            match self.thread_name.clone() {
                Some(name) => self.dispatch(Attempt::Titled, Some(&name)).await?,
                None => self.emit("this webhook needs a thread title: `title <NAME>` to send, `cancel` to dismiss"),
            }
        }

        Ok(())
    }

    async fn submit_title(&mut self, title: String) {
        if self.session.phase() != Phase::AwaitingTitle {
            self.emit("no thread title was requested");
            return;
        }
        if !self.session.can_submit_title(&title) {
            return;
        }

        if let Err(err) = self.dispatch(Attempt::Titled, Some(&title)).await {
            self.emit(&format!("send failed: {err}"));
        }
    }

    async fn dispatch(&mut self, attempt: Attempt, title: Option<&str>) -> Result<(), DispatchError> {
        let resolved = target::resolve(&self.webhook_url);
        self.session = std::mem::take(&mut self.session).begin_send();

        let request = request::build(&self.draft, title);
        let prompt = attempt.prompt(self.prompt_available);
        debug!(?attempt, sendable = resolved.is_sendable(), thread_id = ?resolved.thread_id, "sending webhook message");

        let outcome = self.client.send(resolved.url.as_ref(), request, prompt).await?;
        self.session = std::mem::take(&mut self.session).settle(outcome);
        if let Some(error) = self.session.response().and_then(|response| response.as_error()) {
            warn!(
                code = ?error.code(),
                message = error.message().unwrap_or_default(),
                "webhook rejected the message"
            );
        }
        self.show_response();
        Ok(())
    }

    fn show_response(&mut self) {
        let Some(response) = self.session.response() else {
            return;
        };

        let mut lines = vec![console::render_response(response)];
        if let Some(error) = response.as_error() {
            lines.extend(console::render_field_errors(error));
        }
        self.emit(&lines.join("\n"));
    }

    fn show_status(&mut self) {
        let resolved = target::resolve(&self.webhook_url);
        let target = resolved
            .url
            .as_ref()
            .map(client::redact)
            .unwrap_or_else(|| "(none)".to_owned());
        let thread = resolved.thread_id.as_deref().unwrap_or("(none)");
        let phase = match self.session.phase() {
            Phase::AwaitingSend => "ready",
            Phase::AwaitingTitle => "waiting for a thread title",
        };

        let status = format!(
            "target: {target}\nthread: {thread}\ncomponents: {}\nattachments: {}\nstate: {phase}",
            self.draft.components.len(),
            self.draft.attachments.len(),
        );
        self.emit(&status);
        self.show_response();
    }

    fn teardown(&mut self) {
        if let Some(persist) = self.persist.as_mut() {
            if persist.is_pending() {
                debug!("dropping unsaved webhook url change");
            }
            persist.cancel();
        }
    }

    fn emit(&mut self, text: &str) {
        if let Err(err) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            warn!(?err, "failed to write output");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::*;
    use crate::{
        client::testing,
        persist::testing::MemoryStore,
        protocol::{ComponentTree, WebhookResponse},
    };
    use serde_json::json;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn text(&self) -> String {
            self.0
                .lock()
                .map(|buf| String::from_utf8_lossy(&buf).into_owned())
                .unwrap_or_default()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            if let Ok(mut buf) = self.0.lock() {
                buf.extend_from_slice(data);
            }
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn app(thread_name: Option<&str>) -> (HookcastApp, SharedBuffer) {
        let out = SharedBuffer::default();
        let mut app = HookcastApp::new(
            WebhookClient::new().expect("client"),
            None,
            Box::new(out.clone()),
            thread_name.map(ToOwned::to_owned),
        );
        app.draft.components =
            ComponentTree::from_value(json!([{ "type": 10, "content": "hello" }])).expect("tree");
        (app, out)
    }

    #[tokio::test]
    async fn forum_send_prompts_then_delivers_with_title() {
        let (addr, mock) = testing::spawn().await;
        let (mut app, out) = app(None);

        app.handle_command(Command::Url(format!("http://{addr}/api/webhooks/forum/token"))).await;
        app.handle_command(Command::Send).await;

        assert_eq!(app.session.phase(), Phase::AwaitingTitle);
        assert!(app.session.response().is_none());
        assert!(out.text().contains("needs a thread title"));

        app.handle_command(Command::Title("Launch day".into())).await;

        assert_eq!(app.session.phase(), Phase::AwaitingSend);
        assert_eq!(app.session.response(), Some(&WebhookResponse::delivered()));
        assert!(out.text().contains("\"status\": \"204 Success\""));

        let received = mock.received();
        assert_eq!(received.len(), 2);
        assert!(received[1].body_text().contains("\"thread_name\":\"Launch day\""));
    }

    #[tokio::test]
    async fn repeated_thread_name_error_after_title_is_plain_error() {
        let (addr, mock) = testing::spawn().await;
        let (mut app, _out) = app(None);

        app.handle_command(Command::Url(format!("http://{addr}/api/webhooks/stubborn/token"))).await;
        app.handle_command(Command::Send).await;
        app.handle_command(Command::Title("Again".into())).await;

        assert_eq!(app.session.phase(), Phase::AwaitingSend);
        assert!(
            app.session
                .response()
                .and_then(WebhookResponse::as_error)
                .is_some_and(|error| error.requires_thread_name())
        );
        assert_eq!(mock.received().len(), 2);
    }

    #[tokio::test]
    async fn empty_title_and_cancel_send_nothing() {
        let (addr, mock) = testing::spawn().await;
        let (mut app, _out) = app(None);

        app.handle_command(Command::Url(format!("http://{addr}/api/webhooks/forum/token"))).await;
        app.handle_command(Command::Send).await;
        app.handle_command(Command::Title(String::new())).await;
        assert_eq!(app.session.phase(), Phase::AwaitingTitle);

        app.handle_command(Command::Cancel).await;
        assert_eq!(app.session.phase(), Phase::AwaitingSend);
        assert_eq!(mock.received().len(), 1);
    }

    #[tokio::test]
    async fn preset_thread_name_answers_prompt() {
        let (addr, mock) = testing::spawn().await;
        let (mut app, _out) = app(Some("Changelog"));

        app.handle_command(Command::Url(format!("http://{addr}/api/webhooks/forum/token"))).await;
        app.handle_command(Command::Send).await;

        assert_eq!(app.session.response(), Some(&WebhookResponse::delivered()));
        assert_eq!(mock.received().len(), 2);
    }

    #[tokio::test]
    async fn batch_without_prompt_reports_thread_error() {
        let (addr, mock) = testing::spawn().await;
        let (mut app, out) = app(None);
        app.prompt_available = false;
        app.webhook_url = format!("http://{addr}/api/webhooks/forum/token");

        let result = app.run_batch(Batch { codegen: true, send: true }).await;

        assert!(result.is_err());
        assert_eq!(mock.received().len(), 1);
        let text = out.text();
        assert!(text.contains(r#"\"content\":\"hello\""#));
        assert!(text.contains("\"code\": 220001"));
    }

    #[tokio::test]
    async fn rejected_send_shows_field_errors() {
        let (addr, _mock) = testing::spawn().await;
        let (mut app, out) = app(None);

        app.handle_command(Command::Url(format!("http://{addr}/api/webhooks/invalid/token"))).await;
        app.handle_command(Command::Send).await;

        let text = out.text();
        assert!(text.contains("\"code\": 50035"));
        assert!(text.contains("  components: This field is required [BASE_TYPE_REQUIRED]"));
    }

    #[tokio::test]
    async fn new_send_clears_stale_error_even_when_it_fails() {
        let (addr, _mock) = testing::spawn().await;
        let (mut app, out) = app(None);

        app.handle_command(Command::Url(format!("http://{addr}/api/webhooks/invalid/token"))).await;
        app.handle_command(Command::Send).await;
        assert!(app.session.response().is_some());

        app.handle_command(Command::Url(format!("http://{addr}/api/webhooks/broken/token"))).await;
        app.handle_command(Command::Send).await;

        assert!(app.session.response().is_none());
        assert!(out.text().contains("send failed"));
    }

    #[tokio::test]
    async fn sending_uses_latest_url() {
        let (addr, mock) = testing::spawn().await;
        let (mut app, _out) = app(None);

        app.handle_command(Command::Url("https://discord.com/api/webhooks/1/stale".into())).await;
        app.handle_command(Command::Url(format!("http://{addr}/api/webhooks/ok/token?thread_id=9"))).await;
        app.handle_command(Command::Send).await;

        assert_eq!(app.session.response(), Some(&WebhookResponse::delivered()));
        assert_eq!(
            mock.received()[0].query.as_deref(),
            Some("thread_id=9&with_components=true")
        );
    }

    #[tokio::test]
    async fn invalid_url_fails_without_request() {
        let (mut app, out) = app(None);

        app.handle_command(Command::Url("not a webhook".into())).await;
        assert!(out.text().is_empty(), "a malformed url stays quiet until send");

        app.handle_command(Command::Send).await;
        assert_eq!(out.text(), "send failed: no valid webhook url is set\n");
    }

    #[tokio::test(start_paused = true)]
    async fn url_changes_are_debounced_into_store() {
        let store = Arc::new(MemoryStore::default());
        let out = SharedBuffer::default();
        let mut app = HookcastApp::new(
            WebhookClient::new().expect("client"),
            Some(PersistScheduler::new(store.clone(), persist::DEFAULT_WINDOW)),
            Box::new(out.clone()),
            None,
        );

        for url in ["https://discord.com/api/webhooks/1", "https://discord.com/api/webhooks/1/abc?thread_id=3"] {
            app.handle_command(Command::Url(url.into())).await;
            tokio::task::yield_now().await;
            tokio::time::advance(Duration::from_millis(200)).await;
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            store.writes(),
            vec!["https://discord.com/api/webhooks/1/abc?thread_id=3".to_string()]
        );
        assert!(out.text().contains("posted into thread 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_drops_pending_write() {
        let store = Arc::new(MemoryStore::default());
        let mut app = HookcastApp::new(
            WebhookClient::new().expect("client"),
            Some(PersistScheduler::new(store.clone(), persist::DEFAULT_WINDOW)),
            Box::new(SharedBuffer::default()),
            None,
        );

        app.handle_command(Command::Url("https://discord.com/api/webhooks/1/x".into())).await;
        tokio::task::yield_now().await;
        app.teardown();

        tokio::time::advance(Duration::from_secs(3)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn codegen_and_clear_commands() {
        let (mut app, out) = app(None);

        app.handle_command(Command::Codegen).await;
        app.handle_command(Command::Clear).await;
        app.handle_command(Command::Codegen).await;

        let text = out.text();
        assert!(text.contains(r#"\"content\":\"hello\""#));
        assert!(text.lines().any(|line| line == "[]"));
    }

    #[tokio::test]
    async fn quit_exits() {
        let (mut app, _out) = app(None);
        assert_eq!(app.handle_command(Command::Quit).await, Flow::Exit);
        assert_eq!(app.handle_command(Command::Status).await, Flow::Continue);
    }
}
