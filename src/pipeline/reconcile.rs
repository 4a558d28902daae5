use std::collections::HashMap;

use tracing::info;

use crate::common::error::{EtlError, Result};
use crate::domain::{Order, Product, ReconciledRecord, Session, NO_PURCHASE};
use crate::pipeline::config::ProfitFormula;

/// The master-sheet rows together with join statistics.
#[derive(Debug)]
pub struct ReconciledSet {
    pub records: Vec<ReconciledRecord>,
    pub report: ReconcileReport,
}

#[derive(Debug, Default, Clone)]
pub struct ReconcileReport {
    pub sessions_in: usize,
    pub conversions: usize,
    pub rows_out: usize,
}

/// Left-outer join sessions to their order (at most one) and the order's
/// product, then derive the dashboard columns. Emits exactly one row per
/// input session, in input order; a second order for the same session is
/// a fatal error rather than a silent fan-out.
pub fn reconcile(
    sessions: &[Session],
    orders: Vec<Order>,
    products: &[Product],
    profit_formula: ProfitFormula,
) -> Result<ReconciledSet> {
    let mut orders_by_session: HashMap<u64, Order> = HashMap::with_capacity(orders.len());
    for order in orders {
        let session_id = order.session_id;
        let order_id = order.order_id;
        if let Some(existing) = orders_by_session.insert(session_id, order) {
            return Err(EtlError::AmbiguousConversion {
                session_id,
                first: existing.order_id,
                second: order_id,
            });
        }
    }

    let product_names: HashMap<u64, &str> = products
        .iter()
        .map(|p| (p.product_id, p.product_name.as_str()))
        .collect();

    let mut report = ReconcileReport {
        sessions_in: sessions.len(),
        ..ReconcileReport::default()
    };

    let mut records = Vec::with_capacity(sessions.len());
    for session in sessions {
        let record = match orders_by_session.get(&session.session_id) {
            Some(order) => {
                report.conversions += 1;
                let adjusted_net_profit = match profit_formula {
                    ProfitFormula::Net => order.price_usd - order.cogs_usd,
                    ProfitFormula::AdjustedNet => {
                        order.price_usd - order.cogs_usd - order.refund_amount_usd
                    }
                };
                ReconciledRecord {
                    session_id: session.session_id,
                    user_id: session.user_id,
                    created_at: session.created_at,
                    device_type: session.device_type.clone(),
                    http_referer: session.http_referer.clone(),
                    utm_source: session.utm_source.clone(),
                    utm_campaign: session.utm_campaign.clone(),
                    utm_content: session.utm_content.clone(),
                    order_id: Some(order.order_id),
                    price_usd: order.price_usd,
                    cogs_usd: order.cogs_usd,
                    refund_amount_usd: order.refund_amount_usd,
                    is_refunded: order.is_refunded,
                    items_purchased: order.items_purchased,
                    product_name: product_names
                        .get(&order.primary_product_id)
                        .map(|name| name.to_string())
                        .unwrap_or_else(|| NO_PURCHASE.to_string()),
                    is_conversion: true,
                    adjusted_net_profit,
                    month_year: session.created_at.format("%Y-%m").to_string(),
                }
            }
            None => ReconciledRecord {
                session_id: session.session_id,
                user_id: session.user_id,
                created_at: session.created_at,
                device_type: session.device_type.clone(),
                http_referer: session.http_referer.clone(),
                utm_source: session.utm_source.clone(),
                utm_campaign: session.utm_campaign.clone(),
                utm_content: session.utm_content.clone(),
                order_id: None,
                price_usd: 0.0,
                cogs_usd: 0.0,
                refund_amount_usd: 0.0,
                is_refunded: false,
                items_purchased: 0,
                product_name: NO_PURCHASE.to_string(),
                is_conversion: false,
                adjusted_net_profit: 0.0,
                month_year: session.created_at.format("%Y-%m").to_string(),
            },
        };
        records.push(record);
    }

    report.rows_out = records.len();
    info!(
        "reconciled {} sessions into {} rows ({} conversions)",
        report.sessions_in, report.rows_out, report.conversions
    );

    Ok(ReconciledSet { records, report })
}
