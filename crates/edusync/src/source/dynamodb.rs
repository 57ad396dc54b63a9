//! DynamoDB-backed paged scan

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::{
    error::{DisplayErrorContext, SdkError},
    operation::scan::ScanError,
    types::AttributeValue,
    Client,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edusync_common::{Result, SyncError};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use super::{PagedScan, ScanPage, SourceReader};
use crate::config::SourceConfig;
use crate::record::RawRecord;

/// Scan cursor: DynamoDB's `LastEvaluatedKey`.
pub type ScanKey = HashMap<String, AttributeValue>;

/// Paged scan over one DynamoDB table.
#[derive(Clone)]
pub struct DynamoDbScan {
    client: Client,
    table: String,
}

/// Full-collection reader over DynamoDB.
pub type DynamoDbSource = SourceReader<DynamoDbScan>;

impl DynamoDbScan {
    /// Build a client with the static credentials from `config`.
    pub async fn connect(config: &SourceConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "edusync-source",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;

        info!(
            region = %config.region,
            table = %config.table,
            "DynamoDB client initialized"
        );

        Self::from_client(Client::new(&sdk_config), config.table.clone())
    }

    pub fn from_client(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

impl DynamoDbSource {
    pub async fn from_config(config: &SourceConfig) -> Self {
        SourceReader::new(DynamoDbScan::connect(config).await)
    }
}

#[async_trait]
impl PagedScan for DynamoDbScan {
    type Cursor = ScanKey;

    fn collection(&self) -> &str {
        &self.table
    }

    #[instrument(skip(self, cursor), fields(table = %self.table, resumed = cursor.is_some()))]
    async fn scan_page(&self, cursor: Option<ScanKey>) -> Result<ScanPage<ScanKey>> {
        let response = self
            .client
            .scan()
            .table_name(&self.table)
            .set_exclusive_start_key(cursor)
            .send()
            .await
            .map_err(|e| scan_error(&self.table, e))?;

        let items: Vec<RawRecord> = response
            .items
            .unwrap_or_default()
            .into_iter()
            .map(item_to_record)
            .collect();

        debug!(items = items.len(), "DynamoDB page received");

        Ok(ScanPage {
            items,
            next: response.last_evaluated_key.filter(|key| !key.is_empty()),
        })
    }
}

fn scan_error(table: &str, err: SdkError<ScanError>) -> SyncError {
    let detail = DisplayErrorContext(&err).to_string();
    match err.as_service_error() {
        Some(ScanError::ResourceNotFoundException(_)) => {
            SyncError::SourceUnavailable(format!("table {} does not exist: {}", table, detail))
        },
        _ => SyncError::SourceUnavailable(format!("scan of {} failed: {}", table, detail)),
    }
}

/// Convert one DynamoDB item into a JSON-shaped record.
pub fn item_to_record(item: HashMap<String, AttributeValue>) -> RawRecord {
    let fields: Map<String, Value> = item
        .into_iter()
        .map(|(name, value)| (name, attribute_to_json(value)))
        .collect();
    RawRecord::new(fields)
}

/// Binary values become base64 strings; sets become arrays.
pub fn attribute_to_json(value: AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s),
        AttributeValue::N(n) => number_to_json(n),
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::M(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, attribute_to_json(v)))
                .collect(),
        ),
        AttributeValue::L(list) => Value::Array(list.into_iter().map(attribute_to_json).collect()),
        AttributeValue::Ss(set) => Value::Array(set.into_iter().map(Value::String).collect()),
        AttributeValue::Ns(set) => Value::Array(set.into_iter().map(number_to_json).collect()),
        AttributeValue::B(blob) => Value::String(STANDARD.encode(blob.as_ref())),
        AttributeValue::Bs(blobs) => Value::Array(
            blobs
                .into_iter()
                .map(|b| Value::String(STANDARD.encode(b.as_ref())))
                .collect(),
        ),
        _ => Value::Null,
    }
}

/// Decimal digits an `f64` is guaranteed to carry through a round trip.
const F64_EXACT_DIGITS: usize = 15;

/// DynamoDB numbers are decimal strings of up to 38 digits. Anything a JSON
/// number can't hold without losing digits stays as the original text.
fn number_to_json(n: String) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(u) = n.parse::<u64>() {
        return Value::from(u);
    }

    let digits = significant_digits(&n);
    let exact = n
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_normal() || (*f == 0.0 && digits == 0))
        .filter(|_| digits <= F64_EXACT_DIGITS)
        .and_then(Number::from_f64);

    match exact {
        Some(number) => Value::Number(number),
        None => Value::String(n),
    }
}

/// Significant digits in the mantissa of a decimal literal.
fn significant_digits(n: &str) -> usize {
    let mantissa = n.split(['e', 'E']).next().unwrap_or_default();
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    digits.trim_start_matches('0').trim_end_matches('0').len()
}
