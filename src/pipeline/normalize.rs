use std::collections::HashSet;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::common::error::{EtlError, Result};
use crate::domain::{Session, SessionRow, TIMESTAMP_FORMAT};
use crate::pipeline::config::TimestampPolicy;

pub const ORGANIC: &str = "organic";
pub const DIRECT: &str = "direct";
pub const UNKNOWN: &str = "unknown";
pub const UNCATEGORIZED: &str = "uncategorized";

/// Normalized sessions together with the counts the cleaning produced.
#[derive(Debug)]
pub struct NormalizedSessions {
    pub sessions: Vec<Session>,
    pub report: NormalizeReport,
}

#[derive(Debug, Default, Clone)]
pub struct NormalizeReport {
    pub duplicates_removed: usize,
    pub organic_filled: usize,
    pub direct_filled: usize,
    pub campaigns_filled: usize,
    pub rows_skipped: usize,
}

/// Fallback policy for missing attribution: referred traffic counts as
/// organic search, everything else as direct type-in. A heuristic, applied
/// per row with no cross-row state.
pub fn fallback_utm_source(http_referer: Option<&str>) -> &'static str {
    if http_referer.is_some() {
        ORGANIC
    } else {
        DIRECT
    }
}

fn lowercase(field: Option<String>) -> Option<String> {
    field.map(|v| v.to_lowercase())
}

/// Clean the raw session table: dedup, parse timestamps, standardize and
/// backfill attribution. Output rows satisfy the non-null attribution
/// invariants.
pub fn normalize_sessions(
    rows: Vec<SessionRow>,
    policy: TimestampPolicy,
) -> Result<NormalizedSessions> {
    let raw_count = rows.len();

    // Exact-duplicate removal on full row equality, keeping first occurrence
    let mut seen = HashSet::new();
    let mut deduped = Vec::with_capacity(rows.len());
    for row in rows {
        if seen.insert(row.clone()) {
            deduped.push(row);
        }
    }
    let mut report = NormalizeReport {
        duplicates_removed: raw_count - deduped.len(),
        ..NormalizeReport::default()
    };

    let mut sessions = Vec::with_capacity(deduped.len());
    for row in deduped {
        let created_at = match NaiveDateTime::parse_from_str(&row.created_at, TIMESTAMP_FORMAT) {
            Ok(ts) => ts,
            Err(_) => match policy {
                TimestampPolicy::Strict => {
                    return Err(EtlError::Timestamp {
                        entity: "session",
                        id: row.session_id,
                        value: row.created_at,
                    })
                }
                TimestampPolicy::SkipAndReport => {
                    debug!(
                        "dropping session {} with unparseable timestamp {:?}",
                        row.session_id, row.created_at
                    );
                    report.rows_skipped += 1;
                    continue;
                }
            },
        };

        let utm_source = lowercase(row.utm_source);
        let utm_campaign = lowercase(row.utm_campaign);
        let utm_content = lowercase(row.utm_content);

        let utm_source = match utm_source {
            Some(source) => Some(source),
            None => {
                let filled = fallback_utm_source(row.http_referer.as_deref());
                if filled == ORGANIC {
                    report.organic_filled += 1;
                } else {
                    report.direct_filled += 1;
                }
                Some(filled.to_string())
            }
        };
        // Defensive fill; the referer fallback above already covers every row
        let utm_source = utm_source.unwrap_or_else(|| UNKNOWN.to_string());

        let utm_campaign = match utm_campaign {
            Some(campaign) => campaign,
            None => {
                report.campaigns_filled += 1;
                UNCATEGORIZED.to_string()
            }
        };

        sessions.push(Session {
            session_id: row.session_id,
            user_id: row.user_id,
            created_at,
            device_type: row.device_type,
            http_referer: row.http_referer,
            utm_source,
            utm_campaign,
            utm_content,
        });
    }

    info!(
        "normalized {} sessions ({} duplicates removed, {} organic, {} direct, {} campaigns filled, {} skipped)",
        sessions.len(),
        report.duplicates_removed,
        report.organic_filled,
        report.direct_filled,
        report.campaigns_filled,
        report.rows_skipped
    );

    Ok(NormalizedSessions { sessions, report })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_session(session_id: u64) -> SessionRow {
        SessionRow {
            session_id,
            user_id: Some(session_id + 100),
            created_at: "2012-03-19 08:04:16".to_string(),
            device_type: "desktop".to_string(),
            http_referer: None,
            utm_source: Some("Gsearch".to_string()),
            utm_campaign: Some("Nonbrand".to_string()),
            utm_content: Some("g_ad_1".to_string()),
        }
    }

    fn into_row(session: &Session) -> SessionRow {
        SessionRow {
            session_id: session.session_id,
            user_id: session.user_id,
            created_at: session.created_at.format(TIMESTAMP_FORMAT).to_string(),
            device_type: session.device_type.clone(),
            http_referer: session.http_referer.clone(),
            utm_source: Some(session.utm_source.clone()),
            utm_campaign: Some(session.utm_campaign.clone()),
            utm_content: session.utm_content.clone(),
        }
    }

    #[test]
    fn exact_duplicates_are_removed() {
        let rows = vec![raw_session(1), raw_session(1), raw_session(2)];
        let normalized = normalize_sessions(rows, TimestampPolicy::Strict).unwrap();
        assert_eq!(normalized.sessions.len(), 2);
        assert_eq!(normalized.report.duplicates_removed, 1);
    }

    #[test]
    fn utm_fields_collapse_to_lowercase() {
        let normalized = normalize_sessions(vec![raw_session(1)], TimestampPolicy::Strict).unwrap();
        let session = &normalized.sessions[0];
        assert_eq!(session.utm_source, "gsearch");
        assert_eq!(session.utm_campaign, "nonbrand");
        assert_eq!(session.utm_content.as_deref(), Some("g_ad_1"));
    }

    #[test]
    fn missing_source_with_referer_becomes_organic() {
        let mut row = raw_session(1);
        row.utm_source = None;
        row.http_referer = Some("http://google.com".to_string());
        let normalized = normalize_sessions(vec![row], TimestampPolicy::Strict).unwrap();
        assert_eq!(normalized.sessions[0].utm_source, ORGANIC);
        assert_eq!(normalized.report.organic_filled, 1);
    }

    #[test]
    fn missing_source_without_referer_becomes_direct() {
        let mut row = raw_session(1);
        row.utm_source = None;
        row.http_referer = None;
        let normalized = normalize_sessions(vec![row], TimestampPolicy::Strict).unwrap();
        assert_eq!(normalized.sessions[0].utm_source, DIRECT);
        assert_eq!(normalized.report.direct_filled, 1);
    }

    #[test]
    fn missing_campaign_becomes_uncategorized() {
        let mut row = raw_session(1);
        row.utm_campaign = None;
        let normalized = normalize_sessions(vec![row], TimestampPolicy::Strict).unwrap();
        assert_eq!(normalized.sessions[0].utm_campaign, UNCATEGORIZED);
        assert_eq!(normalized.report.campaigns_filled, 1);
    }

    #[test]
    fn attribution_is_never_null_after_normalization() {
        let mut rows = Vec::new();
        for (i, (source, referer)) in [
            (Some("Gsearch"), None),
            (None, Some("http://google.com")),
            (None, None),
        ]
        .iter()
        .enumerate()
        {
            let mut row = raw_session(i as u64 + 1);
            row.utm_source = source.map(str::to_string);
            row.http_referer = referer.map(str::to_string);
            row.utm_campaign = None;
            rows.push(row);
        }
        let normalized = normalize_sessions(rows, TimestampPolicy::Strict).unwrap();
        for session in &normalized.sessions {
            assert!(!session.utm_source.is_empty());
            assert_eq!(session.utm_campaign, UNCATEGORIZED);
        }
    }

    #[test]
    fn bad_timestamp_fails_under_strict_policy() {
        let mut row = raw_session(1);
        row.created_at = "19/03/2012".to_string();
        let err = normalize_sessions(vec![row], TimestampPolicy::Strict).unwrap_err();
        match err {
            EtlError::Timestamp { entity, id, .. } => {
                assert_eq!(entity, "session");
                assert_eq!(id, 1);
            }
            other => panic!("expected Timestamp error, got {other}"),
        }
    }

    #[test]
    fn bad_timestamp_is_counted_under_skip_policy() {
        let mut bad = raw_session(1);
        bad.created_at = "not a date".to_string();
        let rows = vec![bad, raw_session(2)];
        let normalized = normalize_sessions(rows, TimestampPolicy::SkipAndReport).unwrap();
        assert_eq!(normalized.sessions.len(), 1);
        assert_eq!(normalized.report.rows_skipped, 1);
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut with_fallback = raw_session(2);
        with_fallback.utm_source = None;
        with_fallback.http_referer = Some("http://bing.com".to_string());
        let rows = vec![raw_session(1), raw_session(1), with_fallback];

        let first = normalize_sessions(rows, TimestampPolicy::Strict).unwrap();
        let again: Vec<SessionRow> = first.sessions.iter().map(into_row).collect();
        let second = normalize_sessions(again, TimestampPolicy::Strict).unwrap();

        assert_eq!(second.report.duplicates_removed, 0);
        assert_eq!(second.report.organic_filled, 0);
        assert_eq!(second.report.direct_filled, 0);
        assert_eq!(second.report.campaigns_filled, 0);
        assert_eq!(first.sessions.len(), second.sessions.len());
        for (a, b) in first.sessions.iter().zip(second.sessions.iter()) {
            assert_eq!(into_row(a), into_row(b));
        }
    }
}
