//! Usage audit records
//!
//! One append-only row per authenticated call. Records are written after the
//! admission decision and are never consulted on the hot authorization path.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single usage record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// The key that made the call
    pub api_key_id: String,
    /// Request path
    pub endpoint: String,
    /// HTTP method
    pub method: String,
    /// Response status code
    pub status: i32,
    /// When the call was made
    pub timestamp: DateTime<Utc>,
    /// Source address
    pub ip_address: String,
    /// Caller user agent
    pub user_agent: String,
}

impl UsageRecord {
    pub fn new(
        api_key_id: impl Into<String>,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        status: i32,
    ) -> Self {
        Self {
            api_key_id: api_key_id.into(),
            endpoint: endpoint.into(),
            method: method.into(),
            status,
            timestamp: Utc::now(),
            ip_address: String::new(),
            user_agent: String::new(),
        }
    }

    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = ip.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Per-endpoint request count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStat {
    pub endpoint: String,
    pub count: i64,
}

/// Aggregated statistics for one key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_requests: i64,
    pub requests_today: i64,
    pub requests_this_week: i64,
    pub requests_this_month: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    pub top_endpoints: Vec<EndpointStat>,
    pub status_codes: HashMap<String, i64>,
}

impl UsageStats {
    /// Build stats from raw records (used by the in-memory repository; the
    /// PostgreSQL repository aggregates in SQL).
    pub fn from_records(records: &[UsageRecord]) -> Self {
        let now = Utc::now();
        let day_ago = now - chrono::Duration::days(1);
        let week_ago = now - chrono::Duration::weeks(1);
        let month_ago = now - chrono::Duration::days(30);

        let mut stats = Self {
            total_requests: records.len() as i64,
            ..Self::default()
        };

        let mut by_endpoint: HashMap<&str, i64> = HashMap::new();

        for record in records {
            if record.timestamp >= day_ago {
                stats.requests_today += 1;
            }
            if record.timestamp >= week_ago {
                stats.requests_this_week += 1;
            }
            if record.timestamp >= month_ago {
                stats.requests_this_month += 1;
            }

            stats.last_used = match stats.last_used {
                Some(last) if last >= record.timestamp => Some(last),
                _ => Some(record.timestamp),
            };

            *by_endpoint.entry(record.endpoint.as_str()).or_insert(0) += 1;
            *stats
                .status_codes
                .entry(record.status.to_string())
                .or_insert(0) += 1;
        }

        let mut endpoints: Vec<EndpointStat> = by_endpoint
            .into_iter()
            .map(|(endpoint, count)| EndpointStat {
                endpoint: endpoint.to_string(),
                count,
            })
            .collect();
        endpoints.sort_by(|a, b| b.count.cmp(&a.count).then(a.endpoint.cmp(&b.endpoint)));
        endpoints.truncate(10);
        stats.top_endpoints = endpoints;

        stats
    }
}
