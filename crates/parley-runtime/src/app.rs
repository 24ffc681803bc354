//! The application host.
//!
//! [`App`] owns the plugin registry, the router and the credential cache,
//! and implements the host side of the plugin event slots. Every inbound
//! activity a plugin emits runs through [`App::process`]:
//!
//! ```text
//!  plugin ──emit──▶ process
//!                     │ reference + route selection (hooks, then router)
//!                     │ credentials (bot / app / user)
//!                     │ stream from the receiving plugin
//!                     ▼
//!                  ctx.next() ──▶ handlers …
//!                     │
//!         ok ─────────┴───────── err / panic
//!   close stream,                 on_error to every plugin,
//!   handler response or 200       500
//!                     │
//!        on_activity_response to every plugin
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use tokio::signal;
use tracing::{Instrument, debug, error, info, info_span, warn};

use parley_core::{
    Activity, ApiError, ApiResult, BoxedCredentialProvider, BoxedSender, ConversationReference,
    CredentialProvider, InvokeResponse, SentActivity, Token,
};
use parley_framework::{
    ActivityContext, ActivityResponseEvent, ActivitySentEvent, ApiClient, BoxError, BoxedHandler,
    ContextParts, Credentials, ErrorEvent, EventSink, HandlerPanic, InboundActivity,
    NoopStreamer, Plugin, PluginRegistry, Router, StreamConfig, Streamer,
};

use crate::config::{ConfigLoader, ParleyConfig, validate_config};
use crate::credentials::CredentialCache;
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Plugin name used for activities the app sends on its own.
pub const APP_SENDER: &str = "app";

/// Key under which the credential provider is offered to plugins.
pub const CREDENTIALS_KEY: &str = "credentials";

/// Key under which the streaming settings are offered to plugins.
pub const STREAMING_KEY: &str = "streaming";

// =============================================================================
// AppBuilder
// =============================================================================

/// Collects configuration, plugins and routes, then resolves plugin
/// dependencies in [`build`](Self::build).
///
/// Registration errors are deferred and reported by `build`.
pub struct AppBuilder {
    config: ParleyConfig,
    init_logging: bool,
    registry: PluginRegistry,
    router: Router,
    credentials: Option<BoxedCredentialProvider>,
    error: Option<RuntimeError>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::from_config(ParleyConfig::default())
    }

    pub fn from_config(config: ParleyConfig) -> Self {
        Self {
            config,
            init_logging: false,
            registry: PluginRegistry::new(),
            router: Router::new(),
            credentials: None,
            error: None,
        }
    }

    /// Loads configuration through `loader` and installs the configured
    /// logging subscriber at build time.
    pub fn load(loader: ConfigLoader) -> RuntimeResult<Self> {
        Ok(Self::from_config(loader.load()?).with_logging())
    }

    /// Installs the global tracing subscriber from `[logging]` at build time.
    pub fn with_logging(mut self) -> Self {
        self.init_logging = true;
        self
    }

    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    pub fn plugin<P: Plugin>(self, plugin: P) -> Self {
        self.plugin_arc(Arc::new(plugin))
    }

    /// Registers a plugin the caller keeps a handle to.
    pub fn plugin_arc<P: Plugin>(mut self, plugin: Arc<P>) -> Self {
        if self.error.is_none()
            && let Err(err) = self.registry.register_arc(plugin)
        {
            self.error = Some(err.into());
        }
        self
    }

    /// Offers a shared value to plugin dependency slots.
    pub fn provide<T: ?Sized + Send + Sync + 'static>(
        mut self,
        key: impl Into<String>,
        value: Arc<T>,
    ) -> Self {
        self.registry.provide(key, value);
        self
    }

    /// Sets the credential provider used for per-dispatch token lookup.
    ///
    /// It is also offered to plugins as `dyn CredentialProvider` under
    /// [`CREDENTIALS_KEY`].
    pub fn credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.registry
            .provide::<dyn CredentialProvider>(CREDENTIALS_KEY, provider.clone());
        self.credentials = Some(provider);
        self
    }

    /// Registers routes.
    pub fn routes(mut self, f: impl FnOnce(&mut Router)) -> Self {
        f(&mut self.router);
        self
    }

    pub fn build(self) -> RuntimeResult<App> {
        let Self {
            config,
            init_logging,
            mut registry,
            router,
            credentials,
            error,
        } = self;

        if let Some(err) = error {
            return Err(err);
        }
        validate_config(&config)?;
        if init_logging {
            logging::init_from_config(&config.logging);
        }

        for (plugin, section) in &config.plugins {
            registry.set_settings(plugin.clone(), section.clone());
        }
        let stream_config = Arc::new(config.streaming.to_stream_config());
        registry.provide::<StreamConfig>(STREAMING_KEY, stream_config.clone());

        let mut resolution = Ok(());
        let inner = Arc::new_cyclic(|this: &Weak<AppInner>| {
            let sink: Weak<dyn EventSink> = this.clone();
            resolution = registry.resolve_all(sink);
            AppInner {
                this: this.clone(),
                cache: CredentialCache::new(&config.credentials),
                config,
                stream_config,
                registry,
                router: RwLock::new(router),
                credentials,
                running: AtomicBool::new(false),
            }
        });
        resolution?;

        info!(
            app = %inner.config.app.name,
            plugins = inner.registry.len(),
            routes = inner.router.read().len(),
            "App built"
        );
        Ok(App { inner })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// App
// =============================================================================

/// A built application. Cloning shares the same host.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

struct AppInner {
    this: Weak<AppInner>,
    config: ParleyConfig,
    stream_config: Arc<StreamConfig>,
    registry: PluginRegistry,
    router: RwLock<Router>,
    credentials: Option<BoxedCredentialProvider>,
    cache: CredentialCache,
    running: AtomicBool,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    pub fn config(&self) -> &ParleyConfig {
        &self.inner.config
    }

    pub fn stream_config(&self) -> &StreamConfig {
        &self.inner.stream_config
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.inner.registry
    }

    /// Registers more routes. Activities already dispatched are unaffected.
    pub fn routes(&self, f: impl FnOnce(&mut Router)) {
        f(&mut self.inner.router.write());
    }

    pub fn route_count(&self) -> usize {
        self.inner.router.read().len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Runs one inbound activity through the pipeline as if `plugin` had
    /// received it.
    pub async fn process(&self, plugin: &str, inbound: InboundActivity) -> InvokeResponse {
        self.inner.clone().process(plugin, inbound).await
    }

    /// Sends an activity outside any dispatch through the first plugin
    /// offering a sender.
    pub async fn send(
        &self,
        reference: &ConversationReference,
        activity: Activity,
    ) -> ApiResult<SentActivity> {
        let sender = self.inner.default_sender().ok_or(ApiError::NoSender)?;
        let activity = reference.apply(activity);
        activity.validate()?;

        let resource = sender.send_activity(reference, &activity).await?;
        let sent = SentActivity::new(resource.id, activity);
        self.inner
            .on_activity_sent(ActivitySentEvent {
                plugin: APP_SENDER.to_owned(),
                reference: Arc::new(reference.clone()),
                sent: sent.clone(),
            })
            .await;
        Ok(sent)
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────────

    /// Starts every plugin in registration order.
    ///
    /// The first failing `on_start` aborts startup.
    pub async fn start(&self) -> RuntimeResult<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("App is already running");
            return Ok(());
        }

        info!(app = %self.inner.config.app.name, "Starting app");
        for entry in self.inner.registry.plugins() {
            if let Err(source) = entry.plugin.on_start().await {
                error!(plugin = %entry.name(), error = %source, "Failed to start plugin");
                self.inner.running.store(false, Ordering::SeqCst);
                return Err(RuntimeError::PluginStart {
                    plugin: entry.name().to_owned(),
                    source,
                });
            }
            debug!(plugin = %entry.name(), "Plugin started");
        }

        info!("App started");
        Ok(())
    }

    /// Stops every plugin in reverse registration order. Failures are logged.
    pub async fn stop(&self) -> RuntimeResult<()> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            warn!("App is not running");
            return Ok(());
        }

        info!("Stopping app");
        for entry in self.inner.registry.plugins().iter().rev() {
            if let Err(e) = entry.plugin.on_stop().await {
                error!(plugin = %entry.name(), error = %e, "Error during plugin shutdown");
            }
        }

        info!("App stopped");
        Ok(())
    }

    /// Starts, waits for Ctrl+C or SIGTERM, then stops.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("App is now running. Press Ctrl+C to stop.");
        wait_for_shutdown().await;
        self.stop().await
    }

    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("name", &self.inner.config.app.name)
            .field("registry", &self.inner.registry)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// Dispatch
// =============================================================================

impl AppInner {
    fn default_sender(&self) -> Option<BoxedSender> {
        self.registry
            .plugins()
            .iter()
            .find_map(|entry| entry.plugin.sender())
    }

    /// Plugin hooks (latest registered first), then matching routes.
    fn select_routes(&self, activity: &Activity) -> Vec<BoxedHandler> {
        let mut routes: Vec<BoxedHandler> = self
            .registry
            .plugins()
            .iter()
            .rev()
            .filter_map(|entry| entry.plugin.activity_hook())
            .collect();
        routes.extend(self.router.read().select(activity));
        routes
    }

    async fn resolve_credentials(&self, activity: &Activity, bot: Option<Token>) -> Credentials {
        let Some(provider) = &self.credentials else {
            return Credentials {
                bot,
                ..Default::default()
            };
        };

        let user = if activity.from.id.is_empty() {
            None
        } else {
            provider
                .user_token(
                    &activity.channel_id,
                    &activity.from.id,
                    &self.config.app.oauth_connection,
                )
                .await
                .inspect_err(|err| debug!(%err, "No user token"))
                .ok()
        };
        let app = self.cache.app_token(provider, activity.tenant_id()).await;

        Credentials { bot, app, user }
    }

    async fn process(self: Arc<Self>, plugin: &str, inbound: InboundActivity) -> InvokeResponse {
        let InboundActivity { activity, token } = inbound;
        let activity = Arc::new(activity);
        let span = info_span!(
            "activity",
            id = activity.id.as_deref().unwrap_or_default(),
            r#type = %activity.activity_type(),
            plugin
        );

        let response = self.dispatch(plugin, activity.clone(), token).instrument(span).await;

        let event = ActivityResponseEvent {
            plugin: plugin.to_owned(),
            activity,
            response: response.clone(),
        };
        for entry in self.registry.plugins() {
            entry.plugin.on_activity_response(&event).await;
        }
        response
    }

    async fn dispatch(
        self: &Arc<Self>,
        plugin: &str,
        activity: Arc<Activity>,
        token: Option<Token>,
    ) -> InvokeResponse {
        let routes = self.select_routes(&activity);
        if routes.is_empty() {
            debug!("No route matched");
            return InvokeResponse::ok();
        }
        debug!(routes = routes.len(), "Dispatching");

        let reference = Arc::new(ConversationReference::from_activity(&activity));
        let credentials = self.resolve_credentials(&activity, token).await;

        let receiver = self.registry.get(plugin).map(|entry| &entry.plugin);
        let stream: Arc<dyn Streamer> = receiver
            .and_then(|p| p.create_stream(&reference))
            .unwrap_or_else(|| Arc::new(NoopStreamer));
        let sender = receiver
            .and_then(|p| p.sender())
            .or_else(|| self.default_sender());

        let ctx = ActivityContext::new(
            ContextParts {
                plugin: plugin.to_owned(),
                activity: activity.clone(),
                reference: reference.clone(),
                api: ApiClient::new(sender, reference.clone(), credentials),
                stream: stream.clone(),
                sink: self.clone(),
            },
            routes,
        );

        let result = match AssertUnwindSafe(ctx.next()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(Box::new(HandlerPanic(panic_message(panic.as_ref()))) as BoxError),
        };

        match result {
            Ok(response) => {
                self.close_stream(plugin, &reference, stream.as_ref()).await;
                response.unwrap_or_default()
            }
            Err(error) => {
                error!(%error, "Activity handler failed");
                self.on_error(ErrorEvent {
                    plugin: plugin.to_owned(),
                    error: Arc::from(error),
                    activity: Some(activity),
                })
                .await;
                if self.config.app.close_stream_on_error {
                    self.close_stream(plugin, &reference, stream.as_ref()).await;
                }
                InvokeResponse::internal_error()
            }
        }
    }

    async fn close_stream(
        &self,
        plugin: &str,
        reference: &Arc<ConversationReference>,
        stream: &dyn Streamer,
    ) {
        match stream.close().await {
            Ok(Some(sent)) => {
                self.on_activity_sent(ActivitySentEvent {
                    plugin: plugin.to_owned(),
                    reference: reference.clone(),
                    sent,
                })
                .await;
            }
            Ok(None) => {}
            Err(error) => {
                warn!(%error, "Failed to close stream");
                self.on_error(ErrorEvent {
                    plugin: plugin.to_owned(),
                    error: Arc::new(error),
                    activity: None,
                })
                .await;
            }
        }
    }
}

#[async_trait]
impl EventSink for AppInner {
    async fn on_activity(&self, plugin: &str, inbound: InboundActivity) -> InvokeResponse {
        match self.this.upgrade() {
            Some(this) => this.process(plugin, inbound).await,
            None => InvokeResponse::new(503),
        }
    }

    async fn on_error(&self, event: ErrorEvent) {
        debug!(plugin = %event.plugin, error = %event.error, "Error reported");
        for entry in self.registry.plugins() {
            entry.plugin.on_error(&event).await;
        }
    }

    async fn on_activity_sent(&self, event: ActivitySentEvent) {
        debug!(plugin = %event.plugin, id = %event.sent.id, "Activity sent");
        for entry in self.registry.plugins() {
            entry.plugin.on_activity_sent(&event).await;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
