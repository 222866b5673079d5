use reqwest::header::{HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::config::TnsSettings;
use crate::util::*;

/// User agent identifying a registered TNS bot
pub fn bot_marker(bot_id: &str, bot_name: &str) -> String {
    format!(
        r#"tns_marker{{"tns_id": "{}", "type": "bot", "name": "{}"}}"#,
        bot_id, bot_name
    )
}

#[derive(Deserialize)]
struct SearchReply {
    data: SearchData,
}

#[derive(Deserialize)]
struct SearchData {
    #[serde(default)]
    reply: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    objname: String,
}

fn parse_search(body: &str) -> Result<Option<String>> {
    let reply: SearchReply = serde_json::from_str(body)?;
    match reply.data.reply.into_iter().next() {
        Some(hit) if is_tns_name(&hit.objname) => Ok(Some(hit.objname)),
        Some(hit) => Err(Error::malformed("TNS name", hit.objname)),
        None => Ok(None),
    }
}

/// Cone searches against the Transient Name Server
pub struct TnsClient {
    http: reqwest::Client,
    search_url: String,
    api_key: String,
    radius: f64,
}

impl TnsClient {
    pub fn new(settings: &TnsSettings, api_key: &str) -> Result<Self> {
        let marker = bot_marker(&settings.bot_id, &settings.bot_name);
        let http = reqwest::Client::builder()
            .default_headers(
                [(
                    USER_AGENT,
                    HeaderValue::from_str(&marker)
                        .map_err(|_| Error::malformed("TNS bot marker", marker.clone()))?,
                )]
                .into_iter()
                .collect(),
            )
            .build()?;

        Ok(Self {
            http,
            search_url: settings.search_url.clone(),
            api_key: api_key.to_string(),
            radius: settings.search_radius_arcsec,
        })
    }

    /// Name of the first object registered within the search radius, if any
    pub async fn search(&self, ra: Degrees, dec: Degrees) -> Result<Option<String>> {
        let query = json!({
            "ra": ra,
            "dec": dec,
            "radius": self.radius,
            "units": "arcsec",
        });
        let response = self
            .http
            .post(&self.search_url)
            .form(&[
                ("api_key", self.api_key.as_str()),
                ("data", query.to_string().as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Status {
                url: self.search_url.clone(),
                status,
                body,
            });
        }

        let name = parse_search(&body)?;
        match &name {
            Some(name) => info!("Found match on TNS: {}", name),
            None => info!("Found no match on TNS"),
        }
        Ok(name)
    }
}
