//! Field-label and value translation, plus currency normalization.
//!
//! Label mapping tables are static, closed sets reflecting known site
//! markup. A label outside the set is an upstream schema change, not a
//! runtime-recoverable condition, so the lookups fail loudly. Free-text
//! translation and FX rates come from external services behind traits.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::{SchemaError, TranslateError};
use crate::models::PREFECTURES;

/// Map a detail-table field label to its canonical English key.
pub fn table_field_english(label: &str) -> Result<&'static str, SchemaError> {
    let key = match label {
        "物件種別" => "Property Type",
        "売買価格" => "Sale Price",
        "賃貸価格" => "Rental Price",
        "物件所在地" => "Property Location",
        "建物-構造" => "Building - Structure",
        "建物-築年月" => "Building - Construction Date",
        "建物-面積" => "Building - Area",
        "建物-間取" => "Building - Layout",
        "土地-面積" => "Land - Area",
        "土地-地目" => "Land - Land Use",
        "土地-用途地域" => "Land - Zoning",
        "土地-都市計画" => "Land - Urban Planning",
        "土地-接道" => "Land - Road Access",
        "土地-権利" => "Land - Title",
        "駐車場" => "Parking",
        "交通" => "Transportation",
        "生活環境" => "Living Environment",
        "設備-電気" => "Utilities - Electricity",
        "設備-給湯" => "Utilities - Hot Water",
        "設備-水道" => "Utilities - Water Supply",
        "設備-排水" => "Utilities - Drainage",
        "設備-トイレ" => "Utilities - Toilet",
        "増築・リフォーム歴" => "Renovation History",
        "補修必要程度" => "Repair Needs",
        "補修費負担" => "Repair Cost Responsibility",
        "補修必要内容" => "Repair Details",
        "利用状況" => "Usage Status",
        "付帯物件・その他" => "Other Property Features",
        "管理費・自治会費・税金等" => "Management Fees, Local Dues, Taxes, etc.",
        "敷金・礼金・仲介手数料等" => "Deposit, Key Money, Agent Fees, etc.",
        "特記事項" => "Special Notes",
        "備考" => "Remarks",
        "参照URL" => "Reference URL",
        "物件番号" => "Property ID",
        "取引態様" => "Transaction Type",
        "事業者名" => "Business Name",
        "事業者所在地" => "Business Address",
        "事業者連絡先" => "Business Contact",
        "掲載日" => "Listing Date",
        "掲載期限" => "Listing Expiry",
        "直通メールフォーム" => "Direct Contact Form",
        other => {
            return Err(SchemaError {
                table: "detail",
                label: other.to_string(),
            })
        }
    };
    Ok(key)
}

/// Map an enumerated property-type badge to English.
pub fn property_type_english(label: &str) -> Result<&'static str, SchemaError> {
    let key = match label {
        "新築一戸建て" => "Newly Constructed Detached House",
        "中古一戸建て" => "Used Detached House",
        "土地・売地" => "Land for Sale",
        "新築マンション" => "Newly Constructed Apartments",
        "中古マンション" => "Used Apartments",
        other => {
            return Err(SchemaError {
                table: "property type",
                label: other.to_string(),
            })
        }
    };
    Ok(key)
}

/// Map an index-page area badge label to its canonical English key.
pub fn area_label_english(label: &str) -> Result<&'static str, SchemaError> {
    let key = match label {
        "土地面積" => "Land - Area",
        "建ぺい率" => "Building Coverage Ratio",
        "容積率" => "Volume Ratio",
        "間取り" => "Building - Layout",
        "建物面積" => "Building - Area",
        "築年月" => "Building - Construction Date",
        "階建" => "Building - Structure",
        "専有面積" => "Building - Area",
        "所在階" => "Building - Location Floor",
        other => {
            return Err(SchemaError {
                table: "area label",
                label: other.to_string(),
            })
        }
    };
    Ok(key)
}

/// External free-text translation service.
#[async_trait]
pub trait TextTranslator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, TranslateError>;
}

#[derive(Deserialize)]
struct DeeplTranslation {
    text: String,
}

#[derive(Deserialize)]
struct DeeplResponse {
    translations: Vec<DeeplTranslation>,
}

/// DeepL-style translation client, keyed by a configured credential.
pub struct DeeplClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    target_lang: String,
}

impl DeeplClient {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api-free.deepl.com/v2/translate";

    pub fn new(api_key: String) -> Self {
        DeeplClient {
            client: reqwest::Client::new(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            api_key,
            target_lang: "EN-US".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }
}

#[async_trait]
impl TextTranslator for DeeplClient {
    async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .form(&[("text", text), ("target_lang", &self.target_lang)])
            .send()
            .await?
            .error_for_status()?;

        let body: DeeplResponse = response.json().await?;
        body.translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or(TranslateError::EmptyResponse)
    }
}

/// Identity translator for runs without a translation credential and for
/// tests.
pub struct PassthroughTranslator;

#[async_trait]
impl TextTranslator for PassthroughTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        Ok(text.to_string())
    }
}

/// External FX-rate service.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Units of `to` per one unit of `from`.
    async fn rate(&self, from: &str, to: &str) -> Result<f64, TranslateError>;
}

#[derive(Deserialize)]
struct RatesResponse {
    rates: std::collections::HashMap<String, f64>,
}

/// HTTP FX-rate client against an open exchange-rate API.
pub struct ExchangeRateClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ExchangeRateClient {
    pub const DEFAULT_ENDPOINT: &'static str = "https://open.er-api.com/v6/latest";

    pub fn new() -> Self {
        ExchangeRateClient {
            client: reqwest::Client::new(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl Default for ExchangeRateClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateProvider for ExchangeRateClient {
    async fn rate(&self, from: &str, to: &str) -> Result<f64, TranslateError> {
        let url = format!("{}/{}", self.endpoint, from);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: RatesResponse = response.json().await?;
        body.rates
            .get(to)
            .copied()
            .ok_or_else(|| TranslateError::MissingRate(to.to_string()))
    }
}

/// Constant rate, for tests and offline runs.
pub struct FixedRate(pub f64);

#[async_trait]
impl RateProvider for FixedRate {
    async fn rate(&self, _from: &str, _to: &str) -> Result<f64, TranslateError> {
        Ok(self.0)
    }
}

static YEN_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\d.]+)\s*(million|thousand)?\s*yen").expect("yen amount pattern")
});

/// Extract the numeric yen magnitude from a translated display string,
/// e.g. `"30 million yen"` -> `30_000_000`.
pub fn extract_yen_amount(text: &str) -> Option<i64> {
    let cleaned = text.to_lowercase().replace(',', "");
    let captures = YEN_AMOUNT.captures(&cleaned)?;
    let number: f64 = captures.get(1)?.as_str().parse().ok()?;
    let scaled = match captures.get(2).map(|m| m.as_str()) {
        Some("million") => number * 1_000_000.0,
        Some("thousand") => number * 1_000.0,
        _ => number,
    };
    Some(scaled as i64)
}

/// Convert a translated yen display string to USD via the rate provider.
/// Returns `None` when no yen magnitude can be parsed out of the text.
pub async fn convert_to_usd(
    price_text: &str,
    rates: &dyn RateProvider,
) -> Result<Option<f64>, TranslateError> {
    let Some(yen) = extract_yen_amount(price_text) else {
        return Ok(None);
    };
    let rate = rates.rate("JPY", "USD").await?;
    Ok(Some((yen as f64 * rate * 100.0).round() / 100.0))
}

/// Derive the prefecture token from a translated location string: the last
/// comma-separated segment, trimmed and lower-cased, when it is one of the
/// 47 known tokens.
pub fn derive_prefecture(location: &str) -> Option<&'static str> {
    let last = location.rsplit(',').next()?.trim().to_lowercase();
    PREFECTURES.iter().copied().find(|p| *p == last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_labels_map_to_canonical_keys() {
        assert_eq!(table_field_english("物件種別").unwrap(), "Property Type");
        assert_eq!(table_field_english("売買価格").unwrap(), "Sale Price");
        assert_eq!(area_label_english("間取り").unwrap(), "Building - Layout");
        assert_eq!(
            property_type_english("中古一戸建て").unwrap(),
            "Used Detached House"
        );
    }

    #[test]
    fn unknown_label_is_a_hard_error() {
        let err = table_field_english("新しいラベル").unwrap_err();
        assert_eq!(err.label, "新しいラベル");
        assert!(property_type_english("別荘").is_err());
        assert!(area_label_english("unknown").is_err());
    }

    #[test]
    fn yen_amounts_parse_with_unit_words() {
        assert_eq!(extract_yen_amount("30 million yen"), Some(30_000_000));
        assert_eq!(extract_yen_amount("4.8 million yen"), Some(4_800_000));
        assert_eq!(extract_yen_amount("980 thousand yen"), Some(980_000));
        assert_eq!(extract_yen_amount("1,500,000 yen"), Some(1_500_000));
        assert_eq!(extract_yen_amount("price on request"), None);
    }

    #[tokio::test]
    async fn usd_conversion_applies_rate_to_magnitude() {
        let usd = convert_to_usd("30 million yen", &FixedRate(0.0066))
            .await
            .unwrap();
        assert_eq!(usd, Some(198_000.0));

        let none = convert_to_usd("ask the agent", &FixedRate(0.0066))
            .await
            .unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn prefecture_is_last_segment_lowercased() {
        assert_eq!(derive_prefecture("Shibuya, Tokyo"), Some("tokyo"));
        assert_eq!(
            derive_prefecture("1-2-3 Chuo, Sapporo, Hokkaido "),
            Some("hokkaido")
        );
        assert_eq!(derive_prefecture("Somewhere, Atlantis"), None);
    }
}
