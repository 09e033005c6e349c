use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Client for the LinkSynergy (Rakuten Advertising) publisher APIs.
#[derive(Clone)]
pub struct LinkSynergyClient {
    http: Client,
    base_url: Url,
}

impl LinkSynergyClient {
    pub fn new(base_url: Url, http: Client) -> Self {
        Self { http, base_url }
    }

    /// Exchanges the account credential for a short lived access token.
    pub async fn access_token(&self, credential: &str, scope: &str) -> Result<String, LinkSynergyError> {
        let url = self.base_url.join("token")?;
        let response = self
            .http
            .post(url)
            .header("Authorization", format!("Basic {credential}"))
            .form(&[("grant_type", "password"), ("scope", scope)])
            .send()
            .await?;

        let token: TokenResponse = parse_json(response).await?;
        token
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(LinkSynergyError::MissingToken)
    }

    /// Lists the advertisers the account is partnered with.
    pub async fn list_merchants(&self, access_token: &str) -> Result<Vec<MerchantSummary>, LinkSynergyError> {
        let url = self.base_url.join("advertisersearch/1.0")?;
        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await?;

        let body = ensure_success(response).await?.text().await?;
        let parsed: SearchResult = quick_xml::de::from_str(&body)?;
        Ok(parsed
            .midlist
            .map(|list| list.merchant)
            .unwrap_or_default())
    }

    /// Fetches the detail document of one advertiser; `None` when the envelope is empty.
    pub async fn merchant_details(
        &self,
        access_token: &str,
        advertiser_id: i64,
    ) -> Result<Option<Advertiser>, LinkSynergyError> {
        let url = self
            .base_url
            .join(&format!("v2/advertisers/{advertiser_id}"))?;
        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {access_token}"))
            .header("Accept", "application/json")
            .send()
            .await?;

        let envelope: AdvertiserEnvelope = parse_json(response).await?;
        Ok(envelope
            .advertiser
            .filter(|value| value.is_object())
            .map(Advertiser::from_value))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    midlist: Option<MidList>,
}

#[derive(Debug, Deserialize)]
struct MidList {
    #[serde(default)]
    merchant: Vec<MerchantSummary>,
}

/// Listing entry of the advertiser search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MerchantSummary {
    pub mid: i64,
    #[serde(default, rename = "merchantname")]
    pub merchant_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdvertiserEnvelope {
    #[serde(default)]
    advertiser: Option<Value>,
}

/// Advertiser details with the commonly used fields lifted out of the raw document.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertiser {
    pub name: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub raw: Value,
}

impl Advertiser {
    fn from_value(raw: Value) -> Self {
        let text = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Self {
            name: text("name"),
            url: text("url"),
            description: text("description"),
            raw,
        }
    }
}

/// Errors produced by the LinkSynergy client.
#[derive(Debug, Error)]
pub enum LinkSynergyError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode advertiser listing: {0}")]
    Xml(#[from] quick_xml::de::DeError),
    #[error("token response did not contain an access token")]
    MissingToken,
}

async fn ensure_success(response: Response) -> Result<Response, LinkSynergyError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(LinkSynergyError::Status { status, body });
    }
    Ok(response)
}

async fn parse_json<T>(response: Response) -> Result<T, LinkSynergyError>
where
    T: DeserializeOwned,
{
    Ok(ensure_success(response).await?.json().await?)
}
