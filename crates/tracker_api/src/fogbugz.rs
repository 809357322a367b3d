//! FogBugz JSON API client. Every call is a POST of `{cmd, token, ...}`.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::config::{Auth, ClientConfig};
use crate::error::{ApiError, Result};
use crate::http::HttpClient;
use crate::models::{FogBugzCase, FogBugzEnvelope, FogBugzSearchData};

pub const FOGBUGZ_API_PATH: &str = "f/api/0/jsonapi";

/// FogBugz error code for an invalid or expired token.
const NOT_LOGGED_ON: i64 = 3;

#[derive(Clone)]
pub struct FogBugzClient {
    http: HttpClient,
    token: String,
}

impl FogBugzClient {
    pub fn new(site_url: &str, token: &str) -> Result<Self> {
        let config = ClientConfig::new(
            format!("{}/{}", site_url.trim_end_matches('/'), FOGBUGZ_API_PATH),
            Auth::None,
        );
        Self::with_config(config, token)
    }

    pub fn with_config(config: ClientConfig, token: &str) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
            token: token.to_string(),
        })
    }

    /// Looks up one case by number. `cols` selects the returned columns.
    pub async fn find_case(&self, case_id: u64, cols: &[&str]) -> Result<Option<FogBugzCase>> {
        let mut params = Map::new();
        params.insert("q".into(), json!(case_id.to_string()));
        params.insert("cols".into(), json!(cols));
        params.insert("max".into(), json!(1));
        let data: FogBugzSearchData = self.call("search", params).await?;
        Ok(data.cases.into_iter().find(|case| case.ix_bug == case_id))
    }

    /// Appends an event to the case and sets its elapsed hours. FogBugz
    /// expects a comma as decimal separator.
    pub async fn edit_case(&self, case_id: u64, event_text: &str, elapsed_hours: f64) -> Result<()> {
        let mut params = Map::new();
        params.insert("ixBug".into(), json!(case_id));
        params.insert("sEvent".into(), json!(event_text));
        params.insert(
            "hrsElapsedExtra".into(),
            json!(format!("{:.2}", elapsed_hours).replace('.', ",")),
        );
        let _: Value = self.call("edit", params).await?;
        Ok(())
    }

    async fn call<T>(&self, cmd: &str, mut params: Map<String, Value>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        params.insert("cmd".into(), json!(cmd));
        params.insert("token".into(), json!(self.token));
        let envelope: FogBugzEnvelope<T> = self.http.post("", &Value::Object(params)).await?;

        if let Some(error) = envelope.errors.into_iter().next() {
            let code = error.code.as_ref().and_then(Value::as_i64);
            if code == Some(NOT_LOGGED_ON) {
                return Err(ApiError::Authentication(error.message));
            }
            return Err(ApiError::Other(format!("FogBugz {}: {}", cmd, error.message)));
        }

        envelope
            .data
            .ok_or_else(|| ApiError::Serialization(format!("FogBugz {} returned no data", cmd)))
    }
}
