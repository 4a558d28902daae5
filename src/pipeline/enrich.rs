use std::collections::HashMap;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::common::error::{EtlError, Result};
use crate::domain::{Order, OrderRow, RefundLine, Session, TIMESTAMP_FORMAT};
use crate::pipeline::config::TimestampPolicy;

/// Enriched orders together with the counts the repairs produced.
#[derive(Debug)]
pub struct EnrichedOrders {
    pub orders: Vec<Order>,
    pub report: EnrichReport,
}

#[derive(Debug, Default, Clone)]
pub struct EnrichReport {
    pub users_backfilled: usize,
    pub users_unresolved: usize,
    pub prices_imputed: usize,
    pub cogs_imputed: usize,
    pub refund_lines_skipped: usize,
    pub refunded_orders: usize,
    pub rows_skipped: usize,
}

/// Arithmetic mean over the non-null population, computed once up front so
/// imputed values never feed back into it. `None` when the column has no
/// non-null values.
fn column_mean<I: Iterator<Item = Option<f64>>>(values: I) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values.flatten() {
        sum += value;
        count += 1;
    }
    (count > 0).then(|| sum / count as f64)
}

/// Sum item-level refund lines to order granularity. Negative lines would
/// break the refund >= 0 invariant and are dropped with a count.
fn rollup_refunds(lines: &[RefundLine]) -> (HashMap<u64, f64>, usize) {
    let mut totals: HashMap<u64, f64> = HashMap::new();
    let mut skipped = 0usize;
    for line in lines {
        if line.refund_amount_usd < 0.0 {
            warn!(
                "dropping refund line for order {} with negative amount {}",
                line.order_id, line.refund_amount_usd
            );
            skipped += 1;
            continue;
        }
        *totals.entry(line.order_id).or_insert(0.0) += line.refund_amount_usd;
    }
    (totals, skipped)
}

/// Repair the raw order table: backfill user ids from the originating
/// session, mean-impute missing financials, attach refund totals. Output
/// rows have no null price, cogs or refund amount.
pub fn enrich_orders(
    rows: Vec<OrderRow>,
    sessions: &[Session],
    refund_lines: &[RefundLine],
    policy: TimestampPolicy,
) -> Result<EnrichedOrders> {
    let session_users: HashMap<u64, Option<u64>> = sessions
        .iter()
        .map(|s| (s.session_id, s.user_id))
        .collect();

    let price_mean = column_mean(rows.iter().map(|r| r.price_usd));
    let cogs_mean = column_mean(rows.iter().map(|r| r.cogs_usd));
    let (refund_totals, refund_lines_skipped) = rollup_refunds(refund_lines);

    let mut report = EnrichReport {
        refund_lines_skipped,
        ..EnrichReport::default()
    };

    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let created_at = match NaiveDateTime::parse_from_str(&row.created_at, TIMESTAMP_FORMAT) {
            Ok(ts) => ts,
            Err(_) => match policy {
                TimestampPolicy::Strict => {
                    return Err(EtlError::Timestamp {
                        entity: "order",
                        id: row.order_id,
                        value: row.created_at,
                    })
                }
                TimestampPolicy::SkipAndReport => {
                    debug!(
                        "dropping order {} with unparseable timestamp {:?}",
                        row.order_id, row.created_at
                    );
                    report.rows_skipped += 1;
                    continue;
                }
            },
        };

        let user_id = match row.user_id {
            Some(user_id) => Some(user_id),
            None => match session_users.get(&row.session_id).copied().flatten() {
                Some(user_id) => {
                    report.users_backfilled += 1;
                    Some(user_id)
                }
                // The session has no user either; not an error
                None => {
                    report.users_unresolved += 1;
                    None
                }
            },
        };

        let price_usd = match row.price_usd {
            Some(price) => price,
            None => {
                report.prices_imputed += 1;
                price_mean.ok_or(EtlError::EmptyImputation { column: "price_usd" })?
            }
        };
        let cogs_usd = match row.cogs_usd {
            Some(cogs) => cogs,
            None => {
                report.cogs_imputed += 1;
                cogs_mean.ok_or(EtlError::EmptyImputation { column: "cogs_usd" })?
            }
        };

        let refund_amount_usd = refund_totals.get(&row.order_id).copied().unwrap_or(0.0);
        let is_refunded = refund_amount_usd > 0.0;
        if is_refunded {
            report.refunded_orders += 1;
        }

        orders.push(Order {
            order_id: row.order_id,
            created_at,
            session_id: row.session_id,
            user_id,
            primary_product_id: row.primary_product_id,
            items_purchased: row.items_purchased,
            price_usd,
            cogs_usd,
            refund_amount_usd,
            is_refunded,
        });
    }

    info!(
        "enriched {} orders ({} users backfilled, {} unresolved, {} prices and {} cogs imputed, {} refunded, {} skipped)",
        orders.len(),
        report.users_backfilled,
        report.users_unresolved,
        report.prices_imputed,
        report.cogs_imputed,
        report.refunded_orders,
        report.rows_skipped
    );

    Ok(EnrichedOrders { orders, report })
}
