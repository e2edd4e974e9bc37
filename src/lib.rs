pub mod api;
pub mod bridge;
pub mod interceptor;
pub mod push;
pub mod reminders;
pub mod session;
pub mod settings;
pub mod storage;

#[cfg(test)]
mod test_utils;

use api::auth::AuthService;
use api::client::ReqwestTransport;
use api::HttpTransport;
use async_trait::async_trait;
use bridge::{PushBridge, Reloader, Router};
use interceptor::{AuthInterceptor, AuthenticatedClient, RefreshCoordinator};
use push::host::{WorkerEvent, WorkerHost};
use push::inbox::NotificationInbox;
use push::platform::{LaunchedWindow, LocalWindows, WindowInbox};
use push::subscription::{PushSubscription, PushSubscriptionService};
use push::worker::{resolve_target_url, NotificationClick, PushWorker};
use push::{ClientId, Visibility, WorkerPlatform};
use reminders::{Recurrence, RemindersService};
use serde::Deserialize;
use serde_json::Value;
use session::TokenStore;
use settings::{ClientSettings, TokenStorageKind};
use std::sync::Arc;
use std::time::Duration;
use storage::{FileStore, KeyValueStore, KeyringStore};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Backing stores: one for the token pair, one for everything else.
pub struct Stores {
    pub tokens: Arc<dyn KeyValueStore>,
    pub app: Arc<dyn KeyValueStore>,
}

/// Opens the stores selected in settings. The application store is always
/// `storage.json` in the data directory.
pub fn open_stores(settings: &ClientSettings) -> Stores {
    let app: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(settings::data_dir().join("storage.json")));
    let tokens: Arc<dyn KeyValueStore> = match settings.auth.token_storage {
        TokenStorageKind::Keyring => Arc::new(KeyringStore::new()),
        TokenStorageKind::File => app.clone(),
    };
    Stores { tokens, app }
}

/// Long-lived services shared by every window.
pub struct App {
    pub settings: ClientSettings,
    pub tokens: Arc<TokenStore>,
    pub auth: Arc<AuthService>,
    pub client: Arc<AuthenticatedClient>,
    pub reminders: Arc<RemindersService>,
    pub subscriptions: PushSubscriptionService,
    pub inbox: NotificationInbox,
    reloader: Arc<dyn Reloader>,
}

impl App {
    /// `router` is where logout sends the user.
    pub fn build(
        settings: ClientSettings,
        stores: Stores,
        transport: Arc<dyn HttpTransport>,
        router: Arc<dyn Router>,
        reloader: Arc<dyn Reloader>,
    ) -> Self {
        let base_url = settings.api.base_url.trim_end_matches('/').to_string();
        let tokens = Arc::new(TokenStore::new(stores.tokens));
        let auth = Arc::new(AuthService::new(&base_url, transport.clone(), tokens.clone(), router));

        let coordinator = Arc::new(RefreshCoordinator::with_wait_timeout(
            settings.auth.refresh_wait_timeout_secs.map(Duration::from_secs),
        ));
        let interceptor = AuthInterceptor::new(tokens.clone(), auth.clone(), coordinator);
        let client = Arc::new(AuthenticatedClient::new(
            &format!("{}/api", base_url),
            transport,
            interceptor,
        ));

        let reminders = Arc::new(RemindersService::new(client.clone(), &settings.api.timezone));
        let subscriptions =
            PushSubscriptionService::new(client.clone(), settings.push.vapid_public_key.clone());
        let inbox = NotificationInbox::new(stores.app);

        Self {
            settings,
            tokens,
            auth,
            client,
            reminders,
            subscriptions,
            inbox,
            reloader,
        }
    }

    /// A push bridge for one window, navigating through `router`.
    pub fn bridge(&self, router: Arc<dyn Router>) -> Arc<PushBridge> {
        Arc::new(PushBridge::new(self.reminders.clone(), router, self.reloader.clone()))
    }
}

/// Routes in-app navigation to one `LocalWindows` window.
pub struct WindowRouter {
    windows: Arc<LocalWindows>,
    client: ClientId,
    base_url: String,
}

impl WindowRouter {
    pub fn new(windows: Arc<LocalWindows>, client: ClientId, base_url: &str) -> Self {
        Self {
            windows,
            client,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl Router for WindowRouter {
    async fn navigate_by_url(&self, url: &str) {
        let target = resolve_target_url(&self.base_url, Some(url));
        match self.windows.navigate(self.client, &target).await {
            Ok(()) => log::info!("[window {}] now at {}", self.client, target),
            Err(e) => log::warn!("[window {}] navigation to {} failed: {}", self.client, target, e),
        }
    }
}

struct LogReloader;

impl Reloader for LogReloader {
    fn reload(&self) {
        log::info!("[window] reload requested");
    }
}

/// One line of JSON on stdin.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum HostCommand {
    Login {
        username: String,
        password: String,
    },
    Logout,
    /// A push message arriving; `payload` is the raw body (string) or a JSON object.
    Push {
        #[serde(default)]
        payload: Option<Value>,
    },
    /// Click on the displayed notification with `tag`.
    Click {
        #[serde(default)]
        tag: Option<String>,
        #[serde(default)]
        action: Option<String>,
    },
    Remind {
        progression_id: u64,
        at: String,
        #[serde(default)]
        recurrence: Recurrence,
    },
    Subscribe {
        subscription: PushSubscription,
    },
    Unsubscribe {
        endpoint: String,
    },
    Inbox,
    Quit,
}

fn raw_body(payload: &Value) -> Vec<u8> {
    match payload {
        Value::String(text) => text.as_bytes().to_vec(),
        other => other.to_string().into_bytes(),
    }
}

/// Foreground view of a push body as the inbox stores it.
fn inbox_message(payload: &Value) -> Value {
    match payload {
        Value::String(text) => serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "body": text })),
        other => other.clone(),
    }
}

struct Host {
    app: App,
    windows: Arc<LocalWindows>,
    events: tokio::sync::mpsc::Sender<WorkerEvent>,
}

impl Host {
    /// Returns `false` once the host should stop.
    async fn handle(&self, command: HostCommand) -> bool {
        match command {
            HostCommand::Login { username, password } => {
                if let Err(e) = self.app.auth.login(&username, &password).await {
                    log::error!("Login failed: {}", e);
                }
            }
            HostCommand::Logout => {
                api::Authenticator::logout(self.app.auth.as_ref()).await;
            }
            HostCommand::Push { payload } => {
                if let Some(payload) = &payload {
                    if let Err(e) = self.app.inbox.record(&inbox_message(payload)) {
                        log::warn!("Failed to record notification: {}", e);
                    }
                }
                let event = WorkerEvent::Push {
                    payload: payload.as_ref().map(raw_body),
                };
                if self.events.send(event).await.is_err() {
                    log::error!("[push] worker is gone");
                }
            }
            HostCommand::Click { tag, action } => {
                let tag = tag.unwrap_or_else(|| self.app.settings.push.default_tag.clone());
                let shown = self
                    .windows
                    .notifications()
                    .into_iter()
                    .rev()
                    .find(|n| n.options.tag == tag);
                match shown {
                    Some(notification) => {
                        let click = NotificationClick { action, notification };
                        if self.events.send(WorkerEvent::NotificationClick(click)).await.is_err() {
                            log::error!("[push] worker is gone");
                        }
                    }
                    None => log::warn!("No notification with tag '{}' is displayed", tag),
                }
            }
            HostCommand::Remind {
                progression_id,
                at,
                recurrence,
            } => match self
                .app
                .reminders
                .create_by_progression(progression_id, &at, recurrence)
                .await
            {
                Ok(created) => log::info!("Reminder {} scheduled", created.id),
                Err(e) => log::error!("Failed to schedule reminder: {}", e),
            },
            HostCommand::Subscribe { subscription } => {
                self.app.subscriptions.enable(&subscription).await;
            }
            HostCommand::Unsubscribe { endpoint } => {
                self.app.subscriptions.disable(&endpoint).await;
            }
            HostCommand::Inbox => match serde_json::to_string_pretty(&self.app.inbox.entries()) {
                Ok(json) => println!("{}", json),
                Err(e) => log::error!("Failed to print inbox: {}", e),
            },
            HostCommand::Quit => return false,
        }
        true
    }
}

/// Runs the client host: one application window, the push worker, and a
/// JSON-lines command channel on stdin.
pub async fn run() -> anyhow::Result<()> {
    env_logger::init();

    let settings = settings::load_settings().unwrap_or_else(|e| {
        log::warn!("Failed to load settings, using defaults: {}", e);
        ClientSettings::default()
    });
    let frontend = settings.push.frontend_base_url.trim_end_matches('/').to_string();

    let mut host_windows = HostWindows::new(&frontend);
    let (main_window, main_messages) =
        host_windows
            .windows
            .register(&format!("{}/", frontend), Visibility::Visible, true);
    let main_router = host_windows.router(main_window.id);

    let stores = open_stores(&settings);
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());
    let app = App::build(
        settings.clone(),
        stores,
        transport,
        main_router.clone(),
        Arc::new(LogReloader),
    );
    log::info!(
        "EcoTrack client started (api {}, logged in: {})",
        settings.api.base_url,
        app.auth.is_logged_in()
    );

    host_windows.serve(&app, main_window.id, main_messages);

    let worker = Arc::new(PushWorker::new(host_windows.windows.clone(), settings.push.clone()));
    let worker_host = WorkerHost::spawn(worker);

    let host = Host {
        app,
        windows: host_windows.windows.clone(),
        events: worker_host.events(),
    };

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<HostCommand>(&line) {
                    Ok(command) => {
                        if !host.handle(command).await {
                            break;
                        }
                    }
                    Err(e) => log::warn!("Ignoring command: {}", e),
                }
            }
            Some(window) = host_windows.launched.recv() => {
                host_windows.adopt(&host.app, window);
            }
        }
    }

    let Host { app, events, .. } = host;
    drop(events);
    worker_host.shutdown().await;
    host_windows.close(&app).await;
    Ok(())
}

/// The host's windows and the bridge task serving each of them.
struct HostWindows {
    windows: Arc<LocalWindows>,
    launched: mpsc::UnboundedReceiver<LaunchedWindow>,
    bridges: JoinSet<()>,
    frontend: String,
}

impl HostWindows {
    fn new(frontend: &str) -> Self {
        let (windows, launched) = LocalWindows::new();
        Self {
            windows: Arc::new(windows),
            launched,
            bridges: JoinSet::new(),
            frontend: frontend.to_string(),
        }
    }

    fn router(&self, client: ClientId) -> Arc<dyn Router> {
        Arc::new(WindowRouter::new(self.windows.clone(), client, &self.frontend))
    }

    fn serve(&mut self, app: &App, client: ClientId, messages: WindowInbox) {
        let bridge = app.bridge(self.router(client));
        self.bridges.spawn(bridge.listen(messages));
    }

    /// Windows the worker opens get their own bridge.
    fn adopt(&mut self, app: &App, window: LaunchedWindow) {
        log::info!("[window {}] opened at {}", window.client.id, window.client.url);
        self.serve(app, window.client.id, window.messages);
    }

    /// Closes every window once the worker is done with them and waits for
    /// the bridges to finish the actions already relayed.
    async fn close(mut self, app: &App) {
        while let Ok(window) = self.launched.try_recv() {
            self.adopt(app, window);
        }
        self.windows.close_all();

        while let Some(done) = self.bridges.join_next().await {
            if let Err(e) = done {
                log::error!("[bridge] task ended abnormally: {}", e);
            }
        }
    }
}
