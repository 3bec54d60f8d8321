//! Network-based ownership lookup over the HTTP client.

use async_trait::async_trait;

use crate::error::Result;
use crate::slb::{NetworkOracle, SlbClient};

use super::classifier::matches_prefix;

/// Treats a VPC or vswitch as swept when its name carries a sweep prefix.
#[derive(Debug, Clone)]
pub struct PrefixNetworkOracle {
    client: SlbClient,
    prefixes: Vec<String>,
}

impl PrefixNetworkOracle {
    /// Creates an oracle resolving network names through `client`.
    #[must_use]
    pub fn new(client: SlbClient, prefixes: Vec<String>) -> Self {
        Self { client, prefixes }
    }
}

#[async_trait]
impl NetworkOracle for PrefixNetworkOracle {
    async fn needs_sweep(&self, vpc_id: Option<&str>, vswitch_id: Option<&str>) -> Result<bool> {
        let names = self.client.network_names(vpc_id, vswitch_id).await?;
        Ok(names.iter().any(|name| matches_prefix(name, &self.prefixes)))
    }
}
