use super::*;

pub const DEFAULT_OFFER_DISCOVERY_PERIOD: Duration = Duration::from_millis(1000);
pub const DEFAULT_OFFER_DISCOVERY_STEPS: u32 = 20;

/// How long a fetching joiner waits for an offer to show up
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverySettings {
    pub period: Duration,
    /// Steps before giving up, the first step runs right away
    pub step_count: u32,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            period: DEFAULT_OFFER_DISCOVERY_PERIOD,
            step_count: DEFAULT_OFFER_DISCOVERY_STEPS,
        }
    }
}

/// Ids used when a lookup names no category or space
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceDefaults {
    pub category: String,
    pub space: String,
}

impl Default for SpaceDefaults {
    fn default() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            space: DEFAULT_SPACE.to_string(),
        }
    }
}

/// A published offer waiting in a space for a joiner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRecord {
    pub offer: Value,
    pub id_offer: u64,
    /// Stamped when the offer is fetched
    #[serde(default)]
    pub id_somebody_creator: String,
}

/// What a signaling pipe is bound to, sent back on impersonation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingAuthInfo {
    pub is_authorized: bool,
    pub id_category: Option<String>,
    pub id_space_space: Option<String>,
    pub id_rtc_participant: Option<String>,
}
