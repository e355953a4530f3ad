//! Built-in scheme plugins.

mod data;
mod http;

use std::sync::Arc;

use crate::networking::{PluginPriority, SchemeRegistry};

pub use data::{parse_data_uri, DataUri, DataUriPlugin};
pub use http::HttpPlugin;

/// Register `http`/`https` (libcurl, with progress) and `data`.
pub fn register_default_plugins(registry: &SchemeRegistry) {
    let http = Arc::new(HttpPlugin);
    for scheme in ["http", "https"] {
        registry.register(scheme, http.clone(), Some(PluginPriority::Preferred), true);
    }
    registry.register(
        "data",
        Arc::new(DataUriPlugin),
        Some(PluginPriority::Application),
        false,
    );
}
