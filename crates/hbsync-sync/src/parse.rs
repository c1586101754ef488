//! Decomposition of an order batch into library records
//!
//! A batch response is an object keyed by gamekey. Each order yields one
//! [`BundleRecord`], one [`ProductRecord`] per subproduct, and one
//! [`DownloadRecord`] per downloadable file. Problems confined to one record
//! are collected as failures; only a response whose top level is not an
//! object fails the whole batch.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use hbsync_core::domain::{BundleRecord, DownloadRecord, Gamekey, ProductRecord, SyncError};

/// Platform reported when a download entry names none
const DEFAULT_PLATFORM: &str = "universal";

/// Records decoded from one batch response
#[derive(Debug, Default)]
pub struct BatchRecords {
    pub orders: Vec<OrderRecords>,
    /// One message per record that could not be decoded
    pub failures: Vec<String>,
}

impl BatchRecords {
    pub fn product_count(&self) -> usize {
        self.orders.iter().map(|o| o.products.len()).sum()
    }
}

/// One order and everything it delivers
#[derive(Debug)]
pub struct OrderRecords {
    pub bundle: BundleRecord,
    pub products: Vec<ProductEntry>,
}

/// One product and its downloadable files
#[derive(Debug)]
pub struct ProductEntry {
    pub product: ProductRecord,
    pub downloads: Vec<DownloadRecord>,
}

/// Stable product identifier: hex SHA-256 of `gamekey/machine_name`
pub fn product_id(gamekey: &Gamekey, machine_name: &str) -> String {
    let digest = Sha256::new()
        .chain_update(gamekey.as_str())
        .chain_update(b"/")
        .chain_update(machine_name)
        .finalize();
    hex::encode(digest)
}

/// Decomposes a batch response for `requested` gamekeys
///
/// Requested gamekeys missing from the response, or present with a `null`
/// order, are reported as failures.
///
/// # Errors
///
/// Returns `SyncError::Parse` if the response is not a JSON object.
pub fn decompose_batch(response: &Value, requested: &[Gamekey]) -> Result<BatchRecords, SyncError> {
    let orders = response
        .as_object()
        .ok_or_else(|| SyncError::Parse("batch response is not an object".into()))?;

    let mut records = BatchRecords::default();

    for key in requested {
        if !orders.contains_key(key.as_str()) {
            records
                .failures
                .push(format!("order {key} missing from response"));
        }
    }

    for (raw_key, order) in orders {
        let gamekey = match Gamekey::new(raw_key.as_str()) {
            Ok(key) => key,
            Err(e) => {
                records.failures.push(format!("unusable order key: {e}"));
                continue;
            }
        };
        let Some(order) = order.as_object() else {
            records
                .failures
                .push(format!("order {gamekey} is not an object"));
            continue;
        };
        decompose_order(gamekey, order, &mut records);
    }

    Ok(records)
}

fn decompose_order(gamekey: Gamekey, order: &Map<String, Value>, records: &mut BatchRecords) {
    let product = order.get("product").and_then(Value::as_object);
    let field = |name: &str| product.and_then(|p| text(p.get(name)));

    let bundle = BundleRecord {
        name: field("human_name").unwrap_or_else(|| format!("Order {gamekey}")),
        machine_name: field("machine_name"),
        bundle_type: field("category"),
        purchased_at: order.get("created").and_then(Value::as_str).and_then(parse_timestamp),
        amount_spent: order.get("amount_spent").and_then(number),
        currency: text(order.get("currency")),
        gamekey: gamekey.clone(),
    };

    let mut products = Vec::new();
    match order.get("subproducts") {
        None | Some(Value::Null) => {}
        Some(Value::Array(subproducts)) => {
            for (i, sub) in subproducts.iter().enumerate() {
                match decompose_subproduct(&gamekey, sub, records) {
                    Ok(entry) => products.push(entry),
                    Err(reason) => records
                        .failures
                        .push(format!("order {gamekey} subproduct {i}: {reason}")),
                }
            }
        }
        Some(_) => records
            .failures
            .push(format!("order {gamekey}: subproducts is not an array")),
    }

    records.orders.push(OrderRecords { bundle, products });
}

fn decompose_subproduct(
    gamekey: &Gamekey,
    sub: &Value,
    records: &mut BatchRecords,
) -> Result<ProductEntry, String> {
    let sub = sub.as_object().ok_or("not an object")?;
    let name = text(sub.get("human_name")).ok_or("no human name")?;
    // Identity falls back to the display name when the platform omits it
    let machine_name = text(sub.get("machine_name")).unwrap_or_else(|| name.clone());
    let url = text(sub.get("url"));

    let product = ProductRecord {
        id: product_id(gamekey, &machine_name),
        gamekey: gamekey.clone(),
        developer: sub
            .get("payee")
            .and_then(|p| text(p.get("human_name"))),
        icon: text(sub.get("icon")),
        is_subscription: is_subscription_content(&machine_name, &name, url.as_deref()),
        tags: tags_for(&machine_name),
        url,
        machine_name,
        name,
    };

    let mut downloads = Vec::new();
    if let Some(entries) = sub.get("downloads").and_then(Value::as_array) {
        for entry in entries {
            match decompose_download(&product, entry) {
                Ok(mut files) => downloads.append(&mut files),
                Err(reason) => records
                    .failures
                    .push(format!("product {}: download {reason}", product.name)),
            }
        }
    }

    Ok(ProductEntry { product, downloads })
}

/// One record per file of a platform download entry
fn decompose_download(product: &ProductRecord, entry: &Value) -> Result<Vec<DownloadRecord>, String> {
    let entry = entry.as_object().ok_or("entry is not an object")?;
    let platform = text(entry.get("platform")).unwrap_or_else(|| DEFAULT_PLATFORM.to_string());

    let Some(files) = entry.get("download_struct").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    files
        .iter()
        .enumerate()
        .map(|(i, file)| -> Result<DownloadRecord, String> {
            let file = file
                .as_object()
                .ok_or_else(|| format!("{platform} file {i} is not an object"))?;
            let url = file
                .get("url")
                .and_then(|u| text(u.get("web")).or_else(|| text(Some(u))));
            let file_name = url.as_deref().and_then(file_name_from_url);
            Ok(DownloadRecord {
                product_id: product.id.clone(),
                platform: platform.clone(),
                name: text(file.get("name"))
                    .or_else(|| file_name.clone())
                    .unwrap_or_else(|| format!("{platform}-{i}")),
                file_name,
                size_bytes: file.get("file_size").and_then(Value::as_u64),
                md5: text(file.get("md5")),
                sha1: text(file.get("sha1")),
                url,
            })
        })
        .collect()
}

/// Coupons, Choice months and "% off" offers
pub fn is_subscription_content(machine_name: &str, human_name: &str, url: Option<&str>) -> bool {
    let machine = machine_name.to_lowercase();
    machine.contains("coupon")
        || machine.contains("choice")
        || url.is_some_and(|u| u.to_lowercase().contains("coupons"))
        || human_name.to_lowercase().contains("% off")
}

/// Tags derived from the machine name
pub fn tags_for(machine_name: &str) -> Vec<String> {
    let machine = machine_name.to_lowercase();
    [("coupon", "coupon"), ("choice", "humble_choice"), ("dlc", "dlc")]
        .into_iter()
        .filter(|(needle, _)| machine.contains(needle))
        .map(|(_, tag)| tag.to_string())
        .collect()
}

/// Accepts RFC 3339 and the platform's zone-less `YYYY-MM-DDTHH:MM:SS[.ffffff]` (UTC)
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Non-empty string value
fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numbers and numeric strings
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn file_name_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
