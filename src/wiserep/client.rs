use reqwest::header::{HeaderValue, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::report::Report;
use crate::config::WiserepSettings;
use crate::util::*;

const API_KEY_FIELD: &str = "bot_api_key";

/// Outcome of a WISeREP call
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyStatus {
    Ok,
    BadRequest,
    /// Answered, but not processed (yet)
    Pending,
    Failed(String),
}

fn http_error(status: StatusCode) -> &'static str {
    match status.as_u16() {
        304 => "Error 304: Not Modified: There was no new data to return.",
        400 => "Error 400: Bad Request: The request was invalid. An accompanying error message will explain why.",
        403 => "Error 403: Forbidden: The request is understood, but it has been refused. An accompanying error message will explain why.",
        404 => "Error 404: Not Found: The URI requested is invalid or the resource requested, such as a category, does not exists.",
        500 => "Error 500: Internal Server Error: Something is broken.",
        503 => "Error 503: Service Unavailable.",
        _ => "Undocumented error",
    }
}

#[derive(Debug, Default, Deserialize)]
struct Reply {
    #[serde(default)]
    id_code: Value,
    #[serde(default)]
    id_message: Value,
    #[serde(default)]
    data: Value,
}

/// Codes come back both as numbers and as strings
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn check_response(status: StatusCode, body: &str) -> ReplyStatus {
    if status != StatusCode::OK {
        return ReplyStatus::Failed(http_error(status).to_string());
    }
    let reply: Reply = match serde_json::from_str(body) {
        Ok(reply) => reply,
        Err(e) => return ReplyStatus::Failed(format!("Undecodable reply: {}", e)),
    };

    let (code, message) = (text(&reply.id_code), text(&reply.id_message));
    debug!("ID code = {}, ID message = {}", code, message);
    match (code.as_str(), message.as_str()) {
        ("200", "OK") => ReplyStatus::Ok,
        ("400", "Bad request") => ReplyStatus::BadRequest,
        _ => ReplyStatus::Pending,
    }
}

pub struct WiserepClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl WiserepClient {
    /// Talks to the sandbox unless `production` is set
    pub fn new(settings: &WiserepSettings, api_key: &str, production: bool) -> Result<Self> {
        let marker = format!(
            r#"tns_marker{{"tns_id":{}, "type":"bot", "name":"{}"}}"#,
            settings.bot_id, settings.bot_name
        );
        let http = reqwest::Client::builder()
            .default_headers(
                [(
                    USER_AGENT,
                    HeaderValue::from_str(&marker)
                        .map_err(|_| Error::malformed("WISeREP bot marker", marker.clone()))?,
                )]
                .into_iter()
                .collect(),
            )
            .build()?;

        let endpoint = if production {
            &settings.production_url
        } else {
            &settings.sandbox_url
        };

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            poll_attempts: settings.poll_attempts,
        })
    }

    async fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> Result<(ReplyStatus, Reply)> {
        let mut form = vec![(API_KEY_FIELD, self.api_key.as_str())];
        form.extend_from_slice(fields);

        let response = self
            .http
            .post(format!("{}{}", self.endpoint, path))
            .form(&form)
            .send()
            .await?;
        Self::read_reply(response).await
    }

    async fn read_reply(response: reqwest::Response) -> Result<(ReplyStatus, Reply)> {
        let status = response.status();
        let body = response.text().await?;
        let reply_status = check_response(status, &body);
        let reply = serde_json::from_str(&body).unwrap_or_default();
        Ok((reply_status, reply))
    }

    fn reject(action: &str, status: ReplyStatus, reply: &Reply) -> Error {
        let reason = match status {
            ReplyStatus::Failed(reason) => reason,
            _ => format!("{} ({})", text(&reply.id_message), text(&reply.id_code)),
        };
        Error::Wiserep(format!("{}: {}", action, reason))
    }

    /// Uploads spectrum files, returning the names they were stored under
    pub async fn upload_files(&self, paths: &[PathBuf]) -> Result<Vec<String>> {
        let mut form = Form::new().text(API_KEY_FIELD, self.api_key.clone());
        for (i, path) in paths.iter().enumerate() {
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let lowercase = file_name.to_lowercase();
            let mime = if lowercase.ends_with(".ascii") || lowercase.ends_with(".asci") {
                "text/plain"
            } else {
                "application/fits"
            };
            let part = Part::bytes(tokio::fs::read(path).await?)
                .file_name(file_name)
                .mime_str(mime)?;
            form = form.part(format!("files[{}]", i), part);
        }

        info!(
            "Uploading {} to WISeREP",
            paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let response = self
            .http
            .post(format!("{}/file-upload", self.endpoint))
            .multipart(form)
            .send()
            .await?;

        match Self::read_reply(response).await? {
            (ReplyStatus::Ok, reply) => {
                let names: Vec<String> = serde_json::from_value(reply.data)?;
                info!("Received and saved as {:?} on the WISeREP server", names);
                Ok(names)
            }
            (status, reply) => Err(Self::reject("File upload failed", status, &reply)),
        }
    }

    /// Submits a bulk report, returning its report id
    pub async fn send_report(&self, report: &Report) -> Result<String> {
        let json = report.to_json()?;
        match self.post_form("/bulk-report", &[("data", json.as_str())]).await? {
            (ReplyStatus::Ok, reply) => {
                let id = reply
                    .data
                    .get("report_id")
                    .map(text)
                    .ok_or(Error::MissingField {
                        service: "WISeREP",
                        field: "report_id",
                    })?;
                info!("Sent metadata to WISeREP, report ID = {}", id);
                Ok(id)
            }
            (status, reply) => Err(Self::reject("Metadata was not sent", status, &reply)),
        }
    }

    /// Status and feedback of a previously sent report
    pub async fn report_reply(&self, report_id: &str) -> Result<(ReplyStatus, Value)> {
        let (status, reply) = self
            .post_form("/bulk-report-reply", &[("report_id", report_id)])
            .await?;
        let feedback = reply.data.get("feedback").cloned().unwrap_or(Value::Null);
        Ok((status, feedback))
    }

    /// Polls until the report is processed, returning the feedback
    pub async fn await_reply(&self, report_id: &str) -> Result<Value> {
        let mut last = ReplyStatus::Pending;
        for attempt in 1..=self.poll_attempts {
            tokio::time::sleep(self.poll_interval).await;

            let (status, feedback) = match self.report_reply(report_id).await {
                Ok(reply) => reply,
                Err(Error::Http(e)) => {
                    warn!("Polling report {} failed (attempt {}): {}", report_id, attempt, e);
                    last = ReplyStatus::Failed(e.to_string());
                    continue;
                }
                Err(e) => return Err(e),
            };
            match status {
                ReplyStatus::Ok => {
                    info!("The report was successfully processed on WISeREP");
                    return Ok(feedback);
                }
                ReplyStatus::BadRequest => {
                    return Err(Error::Wiserep(format!(
                        "report {} was not processed because of bad request(s): {}",
                        report_id, feedback
                    )))
                }
                other => {
                    debug!("Report {} not processed yet (attempt {}): {:?}", report_id, attempt, other);
                    last = other;
                }
            }
        }

        warn!("No reply for report {} after {} attempts", report_id, self.poll_attempts);
        Err(Error::Wiserep(format!(
            "report {} was not processed in time, last status {:?}",
            report_id, last
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{serve, CannedResponse};
    use crate::wiserep::spectrum::SpectrumMetadata;
    use std::io::Write;

    fn client(url: &str, poll_attempts: u32) -> WiserepClient {
        let settings = WiserepSettings {
            sandbox_url: url.to_string(),
            poll_interval_secs: 0,
            poll_attempts,
            ..Default::default()
        };
        WiserepClient::new(&settings, "wiskey", false).unwrap()
    }

    #[test]
    fn test_check_response() {
        assert_eq!(
            check_response(StatusCode::OK, r#"{"id_code": 200, "id_message": "OK"}"#),
            ReplyStatus::Ok
        );
        assert_eq!(
            check_response(StatusCode::OK, r#"{"id_code": "200", "id_message": "OK"}"#),
            ReplyStatus::Ok
        );
        assert_eq!(
            check_response(
                StatusCode::OK,
                r#"{"id_code": 400, "id_message": "Bad request"}"#
            ),
            ReplyStatus::BadRequest
        );
        assert_eq!(
            check_response(
                StatusCode::OK,
                r#"{"id_code": 404, "id_message": "Report not found"}"#
            ),
            ReplyStatus::Pending
        );
        assert_eq!(
            check_response(StatusCode::FORBIDDEN, ""),
            ReplyStatus::Failed(
                "Error 403: Forbidden: The request is understood, but it has been refused. An accompanying error message will explain why.".to_string()
            )
        );
        assert_eq!(
            check_response(StatusCode::IM_A_TEAPOT, ""),
            ReplyStatus::Failed("Undocumented error".to_string())
        );
        assert!(matches!(
            check_response(StatusCode::OK, "<html>"),
            ReplyStatus::Failed(_)
        ));
    }

    #[test]
    fn test_endpoints() {
        let settings = WiserepSettings::default();
        let sandbox = WiserepClient::new(&settings, "key", false).unwrap();
        let production = WiserepClient::new(&settings, "key", true).unwrap();
        assert_eq!(sandbox.endpoint, "https://sandbox.wiserep.org/api");
        assert_eq!(production.endpoint, "https://www.wiserep.org/api");
    }

    #[tokio::test]
    async fn test_upload_files() {
        let (url, server) = serve(vec![CannedResponse::json(
            200,
            r#"{"id_code": 200, "id_message": "OK", "data": ["2023-09-11_spec.ascii", "2023-09-11_spec.fits"]}"#,
        )])
        .await;

        let dir = tempfile::tempdir().unwrap();
        let ascii = dir.path().join("spec.ascii");
        let fits = dir.path().join("spec.fits");
        std::fs::File::create(&ascii)
            .unwrap()
            .write_all(b"3850.0 1.2e-16 3.0e-18\n")
            .unwrap();
        std::fs::File::create(&fits)
            .unwrap()
            .write_all(b"SIMPLE  =                    T")
            .unwrap();

        let names = client(&url, 1)
            .upload_files(&[ascii, fits])
            .await
            .unwrap();
        assert_eq!(names, vec!["2023-09-11_spec.ascii", "2023-09-11_spec.fits"]);

        let request = &server.await.unwrap()[0];
        assert!(request.starts_with("POST /file-upload HTTP/1.1"));
        assert!(request.contains(r#"tns_marker{"tns_id":1234, "type":"bot", "name":"OKC_ZTF"}"#));

        let request = request.to_lowercase();
        assert!(request.contains("name=\"bot_api_key\"\r\n\r\nwiskey"));
        assert!(request.contains("filename=\"spec.ascii\"\r\ncontent-type: text/plain"));
        assert!(request.contains("filename=\"spec.fits\"\r\ncontent-type: application/fits"));
    }

    #[tokio::test]
    async fn test_send_report_rejected() {
        let (url, _server) = serve(vec![CannedResponse::json(503, "")]).await;
        let report = Report::new(
            &Default::default(),
            &SpectrumMetadata {
                observer: None,
                reducer: None,
                obsdate: None,
                exptime: 0,
                ascii_file: "spec.ascii".to_string(),
                reduction_date: "2023-09-12 10:00:00.000000".to_string(),
            },
            "2023aew",
            1.,
            2.,
            Quality::Medium,
        )
        .unwrap();

        match client(&url, 1).send_report(&report).await {
            Err(Error::Wiserep(message)) => {
                assert_eq!(message, "Metadata was not sent: Error 503: Service Unavailable.")
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_await_reply() {
        let (url, server) = serve(vec![
            CannedResponse::json(404, ""),
            CannedResponse::json(200, r#"{"id_code": 404, "id_message": "Not processed yet"}"#),
            CannedResponse::json(
                200,
                r#"{"id_code": 200, "id_message": "OK", "data": {"feedback": {"spectra": "ok"}}}"#,
            ),
        ])
        .await;

        let feedback = client(&url, 5).await_reply("42").await.unwrap();
        assert_eq!(feedback["spectra"], "ok");

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[2].starts_with("POST /bulk-report-reply HTTP/1.1"));
        assert!(requests[2].contains("bot_api_key=wiskey&report_id=42"));
    }

    #[tokio::test]
    async fn test_await_reply_bad_request() {
        let (url, _server) = serve(vec![CannedResponse::json(
            200,
            r#"{"id_code": 400, "id_message": "Bad request", "data": {"feedback": {"obsdate": "missing"}}}"#,
        )])
        .await;

        assert!(matches!(
            client(&url, 5).await_reply("42").await,
            Err(Error::Wiserep(message)) if message.contains("bad request")
        ));
    }

    #[tokio::test]
    async fn test_await_reply_gives_up() {
        let (url, server) = serve(vec![
            CannedResponse::json(200, r#"{"id_code": 404, "id_message": "Not yet"}"#),
            CannedResponse::json(200, r#"{"id_code": 404, "id_message": "Not yet"}"#),
        ])
        .await;

        assert!(matches!(
            client(&url, 2).await_reply("42").await,
            Err(Error::Wiserep(_))
        ));
        assert_eq!(server.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_await_reply_survives_dropped_connection() {
        let (url, server) = serve(vec![
            CannedResponse::hang_up(),
            CannedResponse::json(
                200,
                r#"{"id_code": 200, "id_message": "OK", "data": {"feedback": {"spectra": "ok"}}}"#,
            ),
        ])
        .await;

        let feedback = client(&url, 5).await_reply("42").await.unwrap();
        assert_eq!(feedback["spectra"], "ok");
        assert_eq!(server.await.unwrap().len(), 2);
    }
}
