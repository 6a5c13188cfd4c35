use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable online flag for a display device, owned by the clients table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DevicePresenceRecord {
    #[sqlx(rename = "id")]
    pub device_id: String,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl DevicePresenceRecord {
    /// Whether the sweep would flip this record offline for the given cutoff.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_online && self.last_seen.map_or(true, |seen| seen < cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_staleness_rules() {
        let now = Utc::now();
        let cutoff = now - Duration::seconds(60);

        let fresh = DevicePresenceRecord {
            device_id: "a".into(),
            is_online: true,
            last_seen: Some(now),
        };
        let old = DevicePresenceRecord {
            last_seen: Some(now - Duration::seconds(120)),
            ..fresh.clone()
        };
        let never_seen = DevicePresenceRecord {
            last_seen: None,
            ..fresh.clone()
        };
        let offline = DevicePresenceRecord {
            is_online: false,
            ..old.clone()
        };

        assert!(!fresh.is_stale(cutoff));
        assert!(old.is_stale(cutoff));
        assert!(never_seen.is_stale(cutoff));
        assert!(!offline.is_stale(cutoff));
    }
}
