//! Caddy gateway wiring.
//!
//! With the `gateway` service enabled, a Caddyfile is rendered from the
//! resolved configuration and mounted read-only into the gateway
//! container, and services marked `behind_gateway` publish no host ports.

use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

use crate::config::{render_template, ResolvedConfig};
use crate::error::Result;
use crate::state::{StatePaths, CADDYFILE_NAME};

/// Name of the gateway service.
pub const GATEWAY_SERVICE: &str = "gateway";

/// Mount point of the Caddyfile inside the gateway container.
pub const CADDYFILE_TARGET: &str = "/etc/caddy/Caddyfile";

const CADDYFILE_TEMPLATE: &str = include_str!("Caddyfile.tmpl");

/// A file rendered from configuration and written during provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    /// Host location.
    pub path: PathBuf,
    /// Rendered contents.
    pub contents: String,
}

/// Returns whether the gateway service is enabled.
#[must_use]
pub fn gateway_enabled(config: &ResolvedConfig) -> bool {
    config
        .config
        .services
        .get(GATEWAY_SERVICE)
        .is_some_and(|service| service.enabled)
}

/// Renders the gateway Caddyfile; `None` when the gateway is disabled.
///
/// # Errors
///
/// Returns a template error if the ports the Caddyfile refers to are not
/// configured.
pub fn render_caddyfile(config: &ResolvedConfig, paths: &StatePaths) -> Result<Option<GeneratedFile>> {
    if !gateway_enabled(config) {
        return Ok(None);
    }
    let contents = render_template(CADDYFILE_NAME, CADDYFILE_TEMPLATE, &config.table)?;
    debug!("Rendered {CADDYFILE_NAME} ({} bytes)", contents.len());
    Ok(Some(GeneratedFile {
        path: paths.caddyfile(),
        contents,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigDocument, SourceKind};
    use crate::error::AirpodsError;

    fn resolved(overlay: &str) -> ResolvedConfig {
        let user = ConfigDocument {
            kind: SourceKind::ExplicitFile,
            path: None,
            table: overlay.parse().unwrap(),
        };
        let merged = ConfigDocument::merge(&[user, ConfigDocument::defaults().unwrap()]);
        ResolvedConfig::from_document(&merged).unwrap()
    }

    #[test]
    fn test_disabled_gateway_renders_nothing() {
        let paths = StatePaths::new(PathBuf::from("/srv/airpods"));
        assert_eq!(render_caddyfile(&resolved(""), &paths).unwrap(), None);
    }

    #[test]
    fn test_caddyfile_follows_configured_ports() {
        let paths = StatePaths::new(PathBuf::from("/srv/airpods"));
        let file = render_caddyfile(&resolved("[services.gateway]\nenabled = true\n"), &paths)
            .unwrap()
            .unwrap();

        assert_eq!(file.path, PathBuf::from("/srv/airpods/configs/Caddyfile"));
        assert!(file.contents.contains(":80 {"));
        assert!(file.contents.contains("reverse_proxy open-webui:8080"));
        assert!(!file.contents.contains("{{"));

        let moved = resolved(
            "[services.gateway]\nenabled = true\n\
             [[services.open-webui.ports]]\nhost = 3000\ncontainer = 9090\n",
        );
        let file = render_caddyfile(&moved, &paths).unwrap().unwrap();
        assert!(file.contents.contains("reverse_proxy open-webui:9090"));
    }

    #[test]
    fn test_gateway_without_ports_is_template_error() {
        let paths = StatePaths::new(PathBuf::from("/srv/airpods"));
        let config = resolved("[services.gateway]\nenabled = true\nports = []\n");
        assert!(matches!(
            render_caddyfile(&config, &paths),
            Err(AirpodsError::Template(_))
        ));
    }
}
