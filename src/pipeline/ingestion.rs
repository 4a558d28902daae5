use std::fs::File;
use std::path::Path;

use csv::Reader;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::common::error::{EtlError, Result};
use crate::domain::{OrderRow, Product, RefundLine, SessionRow};
use crate::pipeline::config::JobConfig;

/// All four input tables, loaded and typed.
#[derive(Debug)]
pub struct LoadedTables {
    pub sessions: Vec<SessionRow>,
    pub orders: Vec<OrderRow>,
    pub products: Vec<Product>,
    pub refund_lines: Vec<RefundLine>,
    pub report: LoadReport,
}

/// Row counts observed during load, including recovered order rows.
#[derive(Debug, Default, Clone)]
pub struct LoadReport {
    pub sessions_read: usize,
    pub orders_read: usize,
    pub orders_skipped: usize,
    pub products_read: usize,
    pub refund_lines_read: usize,
}

fn open_reader(name: &'static str, path: &Path) -> Result<Reader<File>> {
    Reader::from_path(path).map_err(|_| EtlError::MissingSource {
        name,
        path: path.to_path_buf(),
    })
}

/// Strict load for sources assumed well-formed: any row that fails to
/// deserialize aborts the load.
fn load_strict<T: DeserializeOwned>(name: &'static str, path: &Path) -> Result<Vec<T>> {
    let mut reader = open_reader(name, path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn load_sessions(path: &Path) -> Result<Vec<SessionRow>> {
    load_strict("sessions", path)
}

pub fn load_products(path: &Path) -> Result<Vec<Product>> {
    load_strict("products", path)
}

pub fn load_refund_lines(path: &Path) -> Result<Vec<RefundLine>> {
    load_strict("refunds", path)
}

/// Load the orders export, skipping rows that cannot be parsed into the
/// expected shape (ragged field counts, unparseable numerics). Returns
/// the surviving rows and the skip count.
pub fn load_orders(path: &Path) -> Result<(Vec<OrderRow>, usize)> {
    let mut reader = open_reader("orders", path)?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                debug!("skipping malformed order row: {}", e);
                skipped += 1;
                continue;
            }
        };
        match record.deserialize::<OrderRow>(Some(&headers)) {
            Ok(row) => rows.push(row),
            Err(e) => {
                debug!("skipping malformed order row: {}", e);
                skipped += 1;
            }
        }
    }
    Ok((rows, skipped))
}

/// Load every input named by the job. The refunds source is only read
/// when rollup is enabled and a path is configured; all other sources
/// are required.
pub fn load_inputs(job: &JobConfig, refund_rollup: bool) -> Result<LoadedTables> {
    let sessions = load_sessions(&job.sessions)?;
    let (orders, orders_skipped) = load_orders(&job.orders)?;
    let products = load_products(&job.products)?;

    let refund_lines = match (&job.refunds, refund_rollup) {
        (Some(path), true) => load_refund_lines(path)?,
        _ => Vec::new(),
    };

    let report = LoadReport {
        sessions_read: sessions.len(),
        orders_read: orders.len(),
        orders_skipped,
        products_read: products.len(),
        refund_lines_read: refund_lines.len(),
    };
    info!(
        "loaded {} sessions, {} orders ({} skipped), {} products, {} refund lines",
        report.sessions_read,
        report.orders_read,
        report.orders_skipped,
        report.products_read,
        report.refund_lines_read
    );

    Ok(LoadedTables {
        sessions,
        orders,
        products,
        refund_lines,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const ORDERS_HEADER: &str =
        "order_id,created_at,session_id,user_id,primary_product_id,items_purchased,price_usd,cogs_usd\n";

    #[test]
    fn missing_source_is_fatal_and_named() {
        let err = load_sessions(Path::new("no/such/sessions.csv")).unwrap_err();
        match err {
            EtlError::MissingSource { name, .. } => assert_eq!(name, "sessions"),
            other => panic!("expected MissingSource, got {other}"),
        }
    }

    #[test]
    fn ragged_order_rows_are_skipped_and_counted() {
        let file = write_csv(&format!(
            "{ORDERS_HEADER}\
             1,2012-03-19 10:42:46,10,100,1,1,49.99,19.49\n\
             2,2012-03-20 04:15:05,11\n\
             3,2012-03-21 11:20:59,12,102,1,2,99.98,38.98\n"
        ));

        let (orders, skipped) = load_orders(file.path()).unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(skipped, 1);
        assert_eq!(orders[0].order_id, 1);
        assert_eq!(orders[1].order_id, 3);
    }

    #[test]
    fn orders_with_unparseable_numerics_are_skipped() {
        let file = write_csv(&format!(
            "{ORDERS_HEADER}\
             1,2012-03-19 10:42:46,10,100,1,one,49.99,19.49\n\
             2,2012-03-20 04:15:05,11,101,1,1,49.99,19.49\n"
        ));

        let (orders, skipped) = load_orders(file.path()).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(skipped, 1);
        assert_eq!(orders[0].order_id, 2);
    }

    #[test]
    fn null_monetary_fields_load_as_none() {
        let file = write_csv(&format!(
            "{ORDERS_HEADER}\
             1,2012-03-19 10:42:46,10,,1,1,,19.49\n"
        ));

        let (orders, skipped) = load_orders(file.path()).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(orders[0].user_id, None);
        assert_eq!(orders[0].price_usd, None);
        assert_eq!(orders[0].cogs_usd, Some(19.49));
    }

    #[test]
    fn sessions_load_with_nullable_attribution() {
        let file = write_csv(
            "session_id,user_id,created_at,device_type,http_referer,utm_source,utm_campaign,utm_content\n\
             1,100,2012-03-19 08:04:16,mobile,https://www.gsearch.com,Gsearch,nonbrand,g_ad_1\n\
             2,101,2012-03-19 09:00:00,desktop,,,,\n",
        );

        let sessions = load_sessions(file.path()).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].utm_source.as_deref(), Some("Gsearch"));
        assert_eq!(sessions[1].utm_source, None);
        assert_eq!(sessions[1].http_referer, None);
    }
}
