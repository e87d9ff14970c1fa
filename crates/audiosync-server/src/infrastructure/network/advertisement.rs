//! Service advertisement metadata.
//!
//! The server announces itself under a fixed DNS-SD identity so receivers on
//! the LAN can find it:
//!
//! ```text
//! AudioSyncService._audiosync._tcp.local.   port 12345
//! ```
//!
//! Only the metadata lives here.  It is logged when the listener comes up and
//! exposed to the UI; publishing it on the network is left to the platform's
//! mDNS responder.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Default service instance name.
pub const SERVICE_NAME: &str = "AudioSyncService";
/// Default DNS-SD service type.
pub const SERVICE_TYPE: &str = "_audiosync._tcp";
/// DNS-SD domain for link-local advertisement.
pub const SERVICE_DOMAIN: &str = "local.";

/// What the server announces alongside its listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAdvertisement {
    pub name: String,
    pub service_type: String,
    pub domain: String,
    pub port: u16,
}

impl ServiceAdvertisement {
    pub fn new(name: impl Into<String>, service_type: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            domain: SERVICE_DOMAIN.to_string(),
            port,
        }
    }

    /// Fully qualified DNS-SD instance name, e.g.
    /// `AudioSyncService._audiosync._tcp.local.`.
    pub fn instance_name(&self) -> String {
        format!("{}.{}.{}", self.name, self.service_type, self.domain)
    }

    pub fn announce(&self) {
        info!("advertising {} on port {}", self.instance_name(), self.port);
    }

    pub fn withdraw(&self) {
        info!("withdrawing {}", self.instance_name());
    }
}
