//! Request payload options shared by the interaction commands

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Args;
use rsk_core::config::ClientConfig;
use rsk_protocol::{Authentication, CompositeMetadata, MimeRegistry, Payload};

/// Server, route, data and credentials of one request
#[derive(Args, Debug, Clone, Default)]
pub struct PayloadArgs {
    /// Server URL (ws://, wss:// or tcp://); defaults to `url` from the config file
    pub url: Option<String>,

    /// Route carried in the routing metadata
    #[arg(short, long)]
    pub route: Option<String>,

    /// Request data
    #[arg(short, long)]
    pub data: Option<String>,

    /// Bearer token for authentication metadata
    #[arg(long, value_name = "TOKEN", conflicts_with = "auth_simple")]
    pub auth_bearer: Option<String>,

    /// Username and password for simple authentication metadata
    #[arg(long, value_name = "USER:PASSWORD")]
    pub auth_simple: Option<String>,
}

impl PayloadArgs {
    /// URL from the arguments, else from the config file
    pub fn resolve_url(&self, config: &ClientConfig) -> Result<String> {
        self.url
            .clone()
            .or_else(|| config.url.clone())
            .context("No server URL given and none configured (see 'rsk config init')")
    }

    fn authentication(&self) -> Result<Option<Authentication>> {
        if let Some(token) = &self.auth_bearer {
            return Ok(Some(Authentication::bearer(token.clone())));
        }
        match &self.auth_simple {
            Some(credentials) => {
                let (username, password) = credentials
                    .split_once(':')
                    .context("--auth-simple expects USER:PASSWORD")?;
                Ok(Some(Authentication::simple(username, password)))
            }
            None => Ok(None),
        }
    }
}

/// Build the request payload: data plus composite metadata for route and auth
pub fn build_payload(args: &PayloadArgs) -> Result<Payload> {
    let mut metadata = CompositeMetadata::new();
    if let Some(route) = &args.route {
        metadata
            .push_route(route)
            .with_context(|| format!("Invalid route: {}", route))?;
    }
    if let Some(auth) = args.authentication()? {
        metadata
            .push_authentication(&auth)
            .context("Invalid authentication metadata")?;
    }

    let metadata = if metadata.is_empty() {
        Bytes::new()
    } else {
        metadata
            .encode(&MimeRegistry::standard())
            .context("Failed to encode metadata")?
    };
    Ok(Payload::new(args.data.clone().unwrap_or_default(), metadata))
}
