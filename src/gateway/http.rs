use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::retry::{is_retryable, retry_after, wait_with_backoff, BASE_DELAY};
use super::{
    CardExtraction, Categorization, GatewayFuture, Grouping, OcrGateway, PageInfo,
    RegionExtraction,
};
use crate::compositor::{Point, Polygon};
use crate::folders::ImageFile;
use crate::validator::digits_only;

const EXTRACT_PATH: &str = "extract-card";
const CATEGORIZE_PATH: &str = "categorize";
const GROUP_PATH: &str = "group-cards";
const REGIONS_PATH: &str = "extract-card-regions";

/// JSON-over-HTTP client for the extraction service. Images travel base64
/// encoded inside the request body.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    key: Option<String>,
    max_attempts: usize,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow!("gateway base url is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "failed to build http client")?;
        Ok(Self {
            client,
            base_url,
            key: None,
            max_attempts: 5,
        })
    }

    pub fn with_key(mut self, key: Option<String>) -> Self {
        self.key = key.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    async fn post(&self, path: &str, body: &Value) -> Result<String> {
        let url = format!("{}/{}", self.base_url, path);
        let mut attempt = 0usize;
        let mut delay = BASE_DELAY;
        loop {
            attempt += 1;
            let mut request = self.client.post(&url).json(body);
            if let Some(key) = &self.key {
                request = request.bearer_auth(key);
            }
            let response = request
                .send()
                .await
                .with_context(|| format!("request to {} failed", url))?;

            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                debug!("{} -> {}", path, status);
                return Ok(text);
            }
            if is_retryable(status, &text) && attempt < self.max_attempts {
                delay = wait_with_backoff(path, attempt, self.max_attempts, delay, retry_after)
                    .await;
                continue;
            }
            return Err(anyhow!(
                "extraction service error on {} ({}): {}",
                path,
                status,
                extract_service_error(&text).unwrap_or(text)
            ));
        }
    }
}

impl OcrGateway for HttpGateway {
    fn extract_card<'a>(&'a self, image: &'a ImageFile) -> GatewayFuture<'a, CardExtraction> {
        Box::pin(async move {
            let body = json!({ "image": image_payload(image) });
            let text = self.post(EXTRACT_PATH, &body).await?;
            parse_extraction(&text)
        })
    }

    fn categorize<'a>(&'a self, images: &'a [ImageFile]) -> GatewayFuture<'a, Categorization> {
        Box::pin(async move {
            let body = json!({ "images": images.iter().map(image_payload).collect::<Vec<_>>() });
            let text = self.post(CATEGORIZE_PATH, &body).await?;
            parse_success_body(&text, "categorization")
        })
    }

    fn group_cards<'a>(
        &'a self,
        images: &'a [ImageFile],
        categorization: &'a Categorization,
    ) -> GatewayFuture<'a, Grouping> {
        Box::pin(async move {
            let body = json!({
                "images": images.iter().map(image_payload).collect::<Vec<_>>(),
                "categorization": categorization,
            });
            let text = self.post(GROUP_PATH, &body).await?;
            parse_success_body(&text, "grouping")
        })
    }

    fn extract_card_with_regions<'a>(
        &'a self,
        image: &'a ImageFile,
    ) -> GatewayFuture<'a, RegionExtraction> {
        Box::pin(async move {
            let body = json!({ "image": image_payload(image) });
            let text = self.post(REGIONS_PATH, &body).await?;
            parse_region_extraction(&text)
        })
    }
}

fn image_payload(image: &ImageFile) -> Value {
    json!({
        "name": image.name,
        "mimeType": image.mime,
        "data": BASE64.encode(&image.bytes),
    })
}

pub(super) fn parse_extraction(text: &str) -> Result<CardExtraction> {
    let response: ExtractResponse =
        serde_json::from_str(text).with_context(|| "failed to parse extraction response")?;
    ensure_success(response.status.as_deref(), response.message.as_deref())?;
    let raw = match response.card_number {
        Some(Value::String(value)) => value,
        Some(Value::Number(value)) => value.to_string(),
        _ => String::new(),
    };
    let card_number = digits_only(&raw);
    if card_number.is_empty() {
        return Err(anyhow!("no card number in extraction response"));
    }
    Ok(CardExtraction { card_number })
}

pub(super) fn parse_region_extraction(text: &str) -> Result<RegionExtraction> {
    let response: RegionResponse =
        serde_json::from_str(text).with_context(|| "failed to parse region response")?;
    ensure_success(response.status.as_deref(), response.message.as_deref())?;
    Ok(RegionExtraction {
        document_type: response.document_type.unwrap_or_default(),
        pages: response.pages,
        card_number_regions: response
            .card_number_regions
            .into_iter()
            .map(WirePolygon::into_polygon)
            .collect(),
        cvc_regions: response
            .cvc_regions
            .into_iter()
            .map(WirePolygon::into_polygon)
            .collect(),
    })
}

fn parse_success_body<T: for<'de> Deserialize<'de>>(text: &str, what: &str) -> Result<T> {
    let status: StatusEnvelope = serde_json::from_str(text)
        .with_context(|| format!("failed to parse {} response", what))?;
    ensure_success(status.status.as_deref(), status.message.as_deref())?;
    serde_json::from_str(text).with_context(|| format!("failed to parse {} response", what))
}

fn ensure_success(status: Option<&str>, message: Option<&str>) -> Result<()> {
    let Some(status) = status else {
        return Ok(());
    };
    let status = status.trim();
    if status.eq_ignore_ascii_case("success") || status.eq_ignore_ascii_case("ok") {
        return Ok(());
    }
    Err(anyhow!(
        "extraction service reported status '{}'{}",
        status,
        message
            .filter(|value| !value.trim().is_empty())
            .map(|value| format!(": {}", value))
            .unwrap_or_default()
    ))
}

fn extract_service_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<Value>,
        message: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.error {
        Some(Value::String(message)) => Some(message),
        Some(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .map(|value| value.to_string()),
        _ => parsed.message,
    }
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    status: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractResponse {
    status: Option<String>,
    message: Option<String>,
    #[serde(alias = "cardNumberDigits", alias = "card_number")]
    card_number: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionResponse {
    status: Option<String>,
    message: Option<String>,
    document_type: Option<String>,
    #[serde(default)]
    pages: Vec<PageInfo>,
    #[serde(default)]
    card_number_regions: Vec<WirePolygon>,
    #[serde(default)]
    cvc_regions: Vec<WirePolygon>,
}

/// Services report polygons either as `[x0, y0, x1, y1, ...]` or as a list
/// of `{x, y}` points.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePolygon {
    Flat(Vec<f32>),
    Points(Vec<Point>),
}

impl WirePolygon {
    fn into_polygon(self) -> Polygon {
        match self {
            WirePolygon::Flat(coords) => Polygon::from_flat(&coords),
            WirePolygon::Points(points) => Polygon::new(points),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
        std::fs::read_to_string(&path).expect("fixture")
    }

    #[test]
    fn extraction_strips_separators() {
        let response = parse_extraction(&fixture("extract_card_response.json")).unwrap();
        assert_eq!(response.card_number, "4532015112830366");
    }

    #[test]
    fn numeric_card_number_is_accepted() {
        let response =
            parse_extraction(r#"{"status":"success","cardNumber":4532015112830366}"#).unwrap();
        assert_eq!(response.card_number, "4532015112830366");
    }

    #[test]
    fn failed_or_empty_extraction_is_an_error() {
        let err = parse_extraction(&fixture("extract_card_failure.json")).unwrap_err();
        assert!(err.to_string().contains("failed"));
        assert!(parse_extraction(r#"{"status":"success","cardNumber":"  -- "}"#).is_err());
        assert!(parse_extraction(r#"{"status":"success"}"#).is_err());
    }

    #[test]
    fn grouping_response_is_parsed() {
        let grouping: Grouping =
            parse_success_body(&fixture("group_cards_response.json"), "grouping").unwrap();
        let pairs = grouping.pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].front, "card1_front.jpg");
        assert_eq!(pairs[0].back, "card1_back.jpg");
        assert_eq!(pairs[1].names(), vec!["card2.jpg"]);
    }

    #[test]
    fn region_response_accepts_both_polygon_shapes() {
        let regions = parse_region_extraction(&fixture("card_regions_response.json")).unwrap();
        assert_eq!(regions.document_type, "creditCard");
        assert_eq!(regions.pages.len(), 1);
        assert_eq!(regions.pages[0].unit, "inch");
        assert_eq!(regions.card_number_regions.len(), 1);
        assert_eq!(regions.card_number_regions[0].points.len(), 4);
        assert_eq!(regions.cvc_regions[0].points[2], Point::new(6.2, 8.4));
    }

    #[test]
    fn service_error_message_is_extracted() {
        assert_eq!(
            extract_service_error(r#"{"error":{"message":"image too large"}}"#).as_deref(),
            Some("image too large")
        );
        assert_eq!(
            extract_service_error(r#"{"message":"bad key"}"#).as_deref(),
            Some("bad key")
        );
        assert_eq!(extract_service_error("<html>"), None);
    }
}
