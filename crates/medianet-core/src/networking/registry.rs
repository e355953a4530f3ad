//! Scheme plugin registry.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::operation::AbortableOperation;
use crate::request::{Request, RequestType, Response};

/// Called by a plugin as bytes arrive: `(elapsed since last call, bytes since
/// last call, bytes still expected)`.
pub type ProgressUpdated = Arc<dyn Fn(Duration, u64, u64) + Send + Sync>;

/// Called by a plugin at most once, when response headers are known.
pub type HeadersReceived = Arc<dyn Fn(&HashMap<String, String>) + Send + Sync>;

/// Registration tiers, lowest to highest. A registration replaces the current
/// holder of a scheme when its priority is greater than or equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PluginPriority {
    Fallback = 1,
    Preferred = 2,
    Application = 3,
}

/// A transport for one or more URI schemes.
///
/// The returned operation must eventually settle, and should settle with the
/// abort error soon after being aborted.
pub trait SchemePlugin: Send + Sync {
    fn request(
        &self,
        uri: &str,
        request: &Request,
        request_type: RequestType,
        progress_updated: ProgressUpdated,
        headers_received: HeadersReceived,
    ) -> AbortableOperation<Response>;
}

impl<F> SchemePlugin for F
where
    F: Fn(&str, &Request, RequestType, ProgressUpdated, HeadersReceived) -> AbortableOperation<Response>
        + Send
        + Sync,
{
    fn request(
        &self,
        uri: &str,
        request: &Request,
        request_type: RequestType,
        progress_updated: ProgressUpdated,
        headers_received: HeadersReceived,
    ) -> AbortableOperation<Response> {
        self(uri, request, request_type, progress_updated, headers_received)
    }
}

#[derive(Clone)]
pub struct SchemeRegistration {
    pub plugin: Arc<dyn SchemePlugin>,
    pub priority: PluginPriority,
    /// Whether the plugin reports progress; enables connection/stall timeouts.
    pub progress_support: bool,
}

/// Scheme (lower-cased) to active plugin.
#[derive(Default)]
pub struct SchemeRegistry {
    schemes: RwLock<HashMap<String, SchemeRegistration>>,
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plugin` for `scheme`. Returns false (and changes nothing) when
    /// a higher-priority plugin already holds the scheme. `None` priority
    /// means [`PluginPriority::Application`].
    pub fn register(
        &self,
        scheme: &str,
        plugin: Arc<dyn SchemePlugin>,
        priority: Option<PluginPriority>,
        progress_support: bool,
    ) -> bool {
        let priority = priority.unwrap_or(PluginPriority::Application);
        let scheme = scheme.to_ascii_lowercase();
        let mut schemes = self.schemes.write();
        if let Some(existing) = schemes.get(&scheme) {
            if priority < existing.priority {
                tracing::debug!(%scheme, ?priority, existing = ?existing.priority, "ignoring lower-priority plugin");
                return false;
            }
        }
        tracing::info!(%scheme, ?priority, progress_support, "registered scheme plugin");
        schemes.insert(
            scheme,
            SchemeRegistration {
                plugin,
                priority,
                progress_support,
            },
        );
        true
    }

    pub fn unregister(&self, scheme: &str) -> bool {
        self.schemes
            .write()
            .remove(&scheme.to_ascii_lowercase())
            .is_some()
    }

    pub fn get(&self, scheme: &str) -> Option<SchemeRegistration> {
        self.schemes.read().get(&scheme.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.schemes.read().contains_key(&scheme.to_ascii_lowercase())
    }
}
