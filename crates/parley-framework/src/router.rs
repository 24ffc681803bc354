//! Route selection.
//!
//! A [`Router`] is an append-only list of [`Route`]s. [`Router::select`]
//! returns the handlers of every matching route in registration order:
//! first-match order, not best-match. Middleware (`Selector::Any`) matches
//! every activity.
//!
//! ```rust,ignore
//! let mut router = Router::new();
//! router
//!     .use_middleware(log_everything)
//!     .message("help", show_help)
//!     .message(Regex::new(r"^deploy (\w+)$")?, deploy)
//!     .on_invoke("adaptiveCard/action", card_action)
//!     .on_message(fallback);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use tracing::trace;

use parley_core::{Activity, ActivityType};

use crate::context::ActivityContext;
use crate::handler::{BoxedHandler, IntoHandlerResult, into_handler};

/// A custom route predicate.
pub type Predicate = Arc<dyn Fn(&Activity) -> bool + Send + Sync>;

// ─── Selectors ────────────────────────────────────────────────────────────────

/// Text matcher for message routes.
#[derive(Clone)]
pub enum TextPattern {
    /// The whole text equals the string.
    Exact(String),
    /// The regular expression matches somewhere in the text.
    Regex(Regex),
}

impl TextPattern {
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Exact(expected) => text == expected,
            Self::Regex(regex) => regex.is_match(text),
        }
    }
}

impl From<&str> for TextPattern {
    fn from(value: &str) -> Self {
        Self::Exact(value.to_owned())
    }
}

impl From<String> for TextPattern {
    fn from(value: String) -> Self {
        Self::Exact(value)
    }
}

impl From<Regex> for TextPattern {
    fn from(value: Regex) -> Self {
        Self::Regex(value)
    }
}

impl fmt::Debug for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(text) => f.debug_tuple("Exact").field(text).finish(),
            Self::Regex(regex) => f.debug_tuple("Regex").field(&regex.as_str()).finish(),
        }
    }
}

/// Refinement of an activity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subtype {
    /// The activity's `name` (invoke and event names).
    Name(String),
    /// A top-level string field of `channelData`, e.g. `eventType`.
    ChannelData { key: String, value: String },
}

impl Subtype {
    fn matches(&self, activity: &Activity) -> bool {
        match self {
            Self::Name(name) => activity.name.as_deref() == Some(name.as_str()),
            Self::ChannelData { key, value } => {
                activity.channel_data_value(key).and_then(Value::as_str) == Some(value.as_str())
            }
        }
    }
}

/// Decides whether a route applies to an activity.
#[derive(Clone)]
pub enum Selector {
    /// Always matches.
    Any,
    Type(ActivityType),
    Subtype {
        activity_type: ActivityType,
        subtype: Subtype,
    },
    /// A message whose text matches.
    Text(TextPattern),
    Custom(Predicate),
}

impl Selector {
    pub fn custom(predicate: impl Fn(&Activity) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    /// `conversationUpdate` refined by `channelData.eventType`.
    pub fn channel_event(
        activity_type: ActivityType,
        event_type: impl Into<String>,
    ) -> Self {
        Self::Subtype {
            activity_type,
            subtype: Subtype::ChannelData {
                key: "eventType".to_owned(),
                value: event_type.into(),
            },
        }
    }

    pub fn matches(&self, activity: &Activity) -> bool {
        match self {
            Self::Any => true,
            Self::Type(activity_type) => activity.is(activity_type),
            Self::Subtype {
                activity_type,
                subtype,
            } => activity.is(activity_type) && subtype.matches(activity),
            Self::Text(pattern) => {
                activity.is(&ActivityType::MESSAGE)
                    && activity
                        .text
                        .as_deref()
                        .is_some_and(|text| pattern.is_match(text))
            }
            Self::Custom(predicate) => predicate(activity),
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Type(ty) => f.debug_tuple("Type").field(ty).finish(),
            Self::Subtype {
                activity_type,
                subtype,
            } => f
                .debug_struct("Subtype")
                .field("activity_type", activity_type)
                .field("subtype", subtype)
                .finish(),
            Self::Text(pattern) => f.debug_tuple("Text").field(pattern).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ─── Route ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Route {
    selector: Selector,
    handler: BoxedHandler,
    name: Option<String>,
}

impl Route {
    pub fn new(selector: Selector, handler: BoxedHandler) -> Self {
        Self {
            selector,
            handler,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("selector", &self.selector)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ─── Router ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route.
    pub fn register(&mut self, route: Route) -> &mut Self {
        trace!(selector = ?route.selector, name = ?route.name, "Route registered");
        self.routes.push(route);
        self
    }

    /// Handlers of all matching routes, in registration order.
    pub fn select(&self, activity: &Activity) -> Vec<BoxedHandler> {
        self.routes
            .iter()
            .filter(|route| route.selector.matches(activity))
            .map(|route| route.handler.clone())
            .collect()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    // ─── Convenience registration ─────────────────────────────────────────────

    pub fn on<F, Fut, R>(&mut self, selector: Selector, handler: F) -> &mut Self
    where
        F: Fn(ActivityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult,
    {
        self.register(Route::new(selector, into_handler(handler)))
    }

    /// Every `message` activity.
    pub fn on_message<F, Fut, R>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(ActivityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult,
    {
        self.on(Selector::Type(ActivityType::MESSAGE), handler)
    }

    /// `message` activities whose text matches `pattern`.
    pub fn message<F, Fut, R>(&mut self, pattern: impl Into<TextPattern>, handler: F) -> &mut Self
    where
        F: Fn(ActivityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult,
    {
        self.on(Selector::Text(pattern.into()), handler)
    }

    /// `invoke` activities with the given name.
    pub fn on_invoke<F, Fut, R>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(ActivityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult,
    {
        self.on(
            Selector::Subtype {
                activity_type: ActivityType::INVOKE,
                subtype: Subtype::Name(name.into()),
            },
            handler,
        )
    }

    /// `event` activities with the given name.
    pub fn on_event<F, Fut, R>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(ActivityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult,
    {
        self.on(
            Selector::Subtype {
                activity_type: ActivityType::EVENT,
                subtype: Subtype::Name(name.into()),
            },
            handler,
        )
    }

    pub fn on_conversation_update<F, Fut, R>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(ActivityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult,
    {
        self.on(Selector::Type(ActivityType::CONVERSATION_UPDATE), handler)
    }

    /// A handler run for every activity.
    pub fn use_middleware<F, Fut, R>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(ActivityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult,
    {
        self.on(Selector::Any, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tagged(tag: u16) -> BoxedHandler {
        into_handler(move |_ctx| async move { parley_core::InvokeResponse::new(tag) })
    }

    /// Selects routes and identifies each handler by the status it returns.
    async fn selected(router: &Router, activity: &Activity) -> Vec<u16> {
        let mut tags = Vec::new();
        for (index, handler) in router.select(activity).into_iter().enumerate() {
            let ctx = crate::testing::context(activity.clone(), vec![handler]);
            let response = ctx.next().await.unwrap();
            tags.push(response.map_or(index as u16, |r| r.status));
        }
        tags
    }

    #[tokio::test]
    async fn select_preserves_registration_order_with_middleware() {
        let mut router = Router::new();
        router
            .register(Route::new(Selector::Type(ActivityType::MESSAGE), tagged(1)))
            .register(Route::new(Selector::Any, tagged(2)))
            .register(Route::new(Selector::Text("ping".into()), tagged(3)))
            .register(Route::new(Selector::Type(ActivityType::INVOKE), tagged(4)));

        assert_eq!(selected(&router, &Activity::message("ping")).await, vec![1, 2, 3]);
        assert_eq!(selected(&router, &Activity::message("pong")).await, vec![1, 2]);
        assert_eq!(selected(&router, &Activity::typing()).await, vec![2]);
    }

    #[test]
    fn text_patterns() {
        let exact = Selector::Text("help".into());
        let regex = Selector::Text(Regex::new(r"^deploy (\w+)$").unwrap().into());

        assert!(exact.matches(&Activity::message("help")));
        assert!(!exact.matches(&Activity::message("help me")));
        assert!(regex.matches(&Activity::message("deploy prod")));
        assert!(!regex.matches(&Activity::message("deploy")));
        // Only messages carry routable text.
        assert!(!exact.matches(&Activity::typing().with_text("help")));
    }

    #[test]
    fn subtypes_refine_by_name_and_channel_data() {
        let invoke = Selector::Subtype {
            activity_type: ActivityType::INVOKE,
            subtype: Subtype::Name("adaptiveCard/action".into()),
        };
        let added = Selector::channel_event(ActivityType::CONVERSATION_UPDATE, "channelCreated");

        let card = Activity::new(ActivityType::INVOKE).with_name("adaptiveCard/action");
        let other = Activity::new(ActivityType::INVOKE).with_name("signin/verifyState");
        let created = Activity::new(ActivityType::CONVERSATION_UPDATE)
            .with_channel_data("eventType", json!("channelCreated"));

        assert!(invoke.matches(&card));
        assert!(!invoke.matches(&other));
        assert!(added.matches(&created));
        assert!(!added.matches(&Activity::new(ActivityType::CONVERSATION_UPDATE)));
    }

    #[test]
    fn custom_predicate() {
        let selector = Selector::custom(|activity| activity.locale.as_deref() == Some("fr-FR"));
        let mut activity = Activity::message("bonjour");
        assert!(!selector.matches(&activity));
        activity.locale = Some("fr-FR".into());
        assert!(selector.matches(&activity));
    }

    #[test]
    fn convenience_methods_register_in_order() {
        let mut router = Router::new();
        router
            .use_middleware(|_ctx| async {})
            .on_message(|_ctx| async {})
            .message("hi", |_ctx| async {})
            .on_invoke("task/fetch", |_ctx| async {})
            .on_event("meetingStart", |_ctx| async {})
            .on_conversation_update(|_ctx| async {});

        assert_eq!(router.len(), 6);
        assert!(matches!(router.routes()[0].selector(), Selector::Any));
        assert_eq!(router.select(&Activity::message("hi")).len(), 3);
        assert_eq!(
            router
                .select(&Activity::new(ActivityType::EVENT).with_name("meetingStart"))
                .len(),
            2
        );
    }
}
