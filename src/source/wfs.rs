//! GeoServer WFS implementation of [`FeatureSource`].

use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, error};

use super::{FeatureCollection, FeatureSource, QueryParams};
use crate::error::DataSourceError;

const WFS_VERSION: &str = "1.0.0";
const OUTPUT_FORMAT: &str = "application/json";
const DIMENSION_PARAM: &str = "dim";

/// Where the feature source lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSourceConfig {
    /// Internal OGC server base, e.g. `http://localhost:8080/geoserver/`.
    pub location: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Base URL handed to map clients for WMS requests.
    pub public_location: String,
    pub timeout: Duration,
}

impl Default for FeatureSourceConfig {
    fn default() -> Self {
        Self {
            location: "http://localhost:8080/geoserver/".to_string(),
            user: None,
            password: None,
            public_location: "http://localhost:8080/geoserver/".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl FeatureSourceConfig {
    pub fn wfs_url(&self) -> String {
        format!("{}/wfs", self.location.trim_end_matches('/'))
    }
}

pub struct WfsFeatureSource {
    client: Client,
    config: FeatureSourceConfig,
}

impl WfsFeatureSource {
    pub fn new(config: FeatureSourceConfig) -> Result<Self, DataSourceError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Use a preconfigured HTTP client; `config.timeout` is then ignored.
    pub fn with_client(client: Client, config: FeatureSourceConfig) -> Self {
        Self { client, config }
    }

    /// Query string of a `GetFeature` request.
    pub fn request_params(
        &self,
        layer: &str,
        primary_field: &str,
        params: &QueryParams,
    ) -> Vec<(&'static str, String)> {
        let mut view = params.clone();
        view.insert(DIMENSION_PARAM.to_string(), primary_field.to_string());

        vec![
            ("service", "WFS".to_string()),
            ("version", WFS_VERSION.to_string()),
            ("request", "GetFeature".to_string()),
            ("typeName", layer.to_string()),
            ("outputFormat", OUTPUT_FORMAT.to_string()),
            ("viewparams", encode_viewparams(&view)),
        ]
    }
}

impl FeatureSource for WfsFeatureSource {
    fn fetch_features(
        &self,
        layer: &str,
        primary_field: &str,
        params: &QueryParams,
    ) -> Result<FeatureCollection, DataSourceError> {
        let url = self.config.wfs_url();
        let query = self.request_params(layer, primary_field, params);
        debug!("WFS GetFeature {} {:?}", url, query);

        let mut request = self.client.get(&url).query(&query);
        if let Some(user) = &self.config.user {
            request = request.basic_auth(user, self.config.password.as_deref());
        }

        let response = request.send()?;
        let status = response.status();
        let is_xml = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.contains("xml"));
        let body = response.text()?;

        if is_xml || body.trim_start().starts_with('<') {
            if let Some((code, message)) = parse_service_exception(&body) {
                error!("WFS exception from {}: {} {}", url, code, message);
                return Err(DataSourceError::ServiceException { code, message });
            }
        }
        if !status.is_success() {
            error!("WFS request to {} failed with HTTP {}", url, status);
            return Err(DataSourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// `k:v;k:v` with GeoServer's backslash escaping of the separators.
pub fn encode_viewparams(params: &QueryParams) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}:{}", escape_viewparam(k), escape_viewparam(v)))
        .collect::<Vec<_>>()
        .join(";")
}

fn escape_viewparam(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | ';' | ':' | ',') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// First `(code, message)` of an OGC exception report (WFS 1.0 `ServiceException`
/// or OWS `Exception`), if the document is one.
pub fn parse_service_exception(xml: &str) -> Option<(String, String)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut code: Option<String> = None;
    let mut message = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if let Some(attr) = exception_code_attr(e.local_name().as_ref()) {
                    code = Some(attribute(&e, attr).unwrap_or_default());
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(attr) = exception_code_attr(e.local_name().as_ref()) {
                    code = Some(attribute(&e, attr).unwrap_or_default());
                    break;
                }
            }
            Ok(Event::Text(t)) if code.is_some() => {
                let text = t.unescape().ok()?;
                if !message.is_empty() {
                    message.push(' ');
                }
                message.push_str(text.trim());
            }
            Ok(Event::End(e)) => {
                if code.is_some() && exception_code_attr(e.local_name().as_ref()).is_some() {
                    break;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("Body is not a readable exception report: {}", e);
                return None;
            }
            _ => (),
        }
    }

    code.map(|code| (code, message))
}

fn exception_code_attr(local_name: &[u8]) -> Option<&'static str> {
    match local_name {
        b"ServiceException" => Some("code"),
        b"Exception" => Some("exceptionCode"),
        _ => None,
    }
}

fn attribute(element: &quick_xml::events::BytesStart, name: &str) -> Option<String> {
    element
        .try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one canned HTTP response and hand back the request head.
    fn serve_once(status: &str, content_type: &str, body: &str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        );

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                head.push_str(&line);
            }
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            head
        });

        (format!("http://{}/geoserver/", addr), handle)
    }

    fn source_for(location: String) -> WfsFeatureSource {
        source_with(FeatureSourceConfig {
            location,
            ..FeatureSourceConfig::default()
        })
    }

    fn source_with(config: FeatureSourceConfig) -> WfsFeatureSource {
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        WfsFeatureSource::with_client(client, config)
    }

    fn header<'h>(head: &'h str, name: &str) -> Option<&'h str> {
        head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }

    fn params() -> QueryParams {
        let mut params = QueryParams::new();
        params.insert("adm_code".to_string(), "AF".to_string());
        params.insert("risk_analysis".to_string(), "WP6".to_string());
        params
    }

    #[test]
    fn test_wfs_url_trims_trailing_slash() {
        let config = FeatureSourceConfig {
            location: "http://geo.example.org/geoserver//".to_string(),
            ..FeatureSourceConfig::default()
        };
        assert_eq!(config.wfs_url(), "http://geo.example.org/geoserver/wfs");
    }

    #[test]
    fn test_viewparams_include_dimension_and_escape_separators() {
        let source = source_for("http://localhost/geoserver".to_string());
        let mut params = params();
        params.insert("risk_analysis".to_string(), "a;b:c".to_string());

        let query = source.request_params("geonode:risk", "dim1", &params);
        let viewparams = &query.iter().find(|(k, _)| *k == "viewparams").unwrap().1;
        assert_eq!(viewparams, r"adm_code:AF;dim:dim1;risk_analysis:a\;b\:c");
    }

    #[test]
    fn test_parse_wfs_1_0_exception() {
        let xml = r#"<?xml version="1.0" ?>
            <ServiceExceptionReport version="1.2.0" xmlns="http://www.opengis.net/ogc">
              <ServiceException code="InvalidParameterValue" locator="typeName">
                Feature type geonode:missing unknown
              </ServiceException>
            </ServiceExceptionReport>"#;
        let (code, message) = parse_service_exception(xml).unwrap();
        assert_eq!(code, "InvalidParameterValue");
        assert_eq!(message, "Feature type geonode:missing unknown");
    }

    #[test]
    fn test_parse_ows_exception() {
        let xml = r#"<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows">
              <ows:Exception exceptionCode="NoApplicableCode">
                <ows:ExceptionText>Could not execute query</ows:ExceptionText>
              </ows:Exception>
            </ows:ExceptionReport>"#;
        let (code, message) = parse_service_exception(xml).unwrap();
        assert_eq!(code, "NoApplicableCode");
        assert_eq!(message, "Could not execute query");
    }

    #[test]
    fn test_non_exception_xml_is_ignored() {
        assert_eq!(parse_service_exception("<FeatureCollection/>"), None);
    }

    #[test]
    fn test_fetch_decodes_feature_collection() {
        let body = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "id": "f.1", "geometry": null,
             "properties": {"dim1_value": "SSP1", "dim2_value": "10", "value": 4.5}}
        ]}"#;
        let (location, handle) = serve_once("200 OK", "application/json", body);
        let source = source_for(location);

        let features = source
            .fetch_features("geonode:risk", "dim1", &params())
            .unwrap();
        assert_eq!(features.features.len(), 1);
        assert_eq!(
            features.features[0].property("value"),
            Some(&serde_json::json!(4.5))
        );

        let head = handle.join().unwrap();
        let request_line = head.lines().next().unwrap();
        assert!(request_line.starts_with("GET /geoserver/wfs?"));
        assert!(request_line.contains("request=GetFeature"));
        assert!(request_line.contains("typeName=geonode%3Arisk"));
        assert!(request_line.contains("outputFormat=application%2Fjson"));
        assert_eq!(header(&head, "authorization"), None);
    }

    #[test]
    fn test_fetch_sends_basic_auth_for_configured_user() {
        let body = r#"{"type": "FeatureCollection", "features": []}"#;
        let (location, handle) = serve_once("200 OK", "application/json", body);
        let source = source_with(FeatureSourceConfig {
            location,
            user: Some("geo".to_string()),
            password: Some("secret".to_string()),
            ..FeatureSourceConfig::default()
        });

        let features = source
            .fetch_features("geonode:risk", "dim1", &params())
            .unwrap();
        assert!(features.features.is_empty());

        let head = handle.join().unwrap();
        assert_eq!(header(&head, "authorization"), Some("Basic Z2VvOnNlY3JldA=="));
    }

    #[test]
    fn test_fetch_reports_service_exception() {
        let body = r#"<ServiceExceptionReport><ServiceException code="InvalidParameterValue">bad layer</ServiceException></ServiceExceptionReport>"#;
        let (location, handle) = serve_once("200 OK", "text/xml", body);
        let source = source_for(location);

        let err = source
            .fetch_features("geonode:missing", "dim1", &params())
            .unwrap_err();
        match err {
            DataSourceError::ServiceException { code, message } => {
                assert_eq!(code, "InvalidParameterValue");
                assert_eq!(message, "bad layer");
            }
            other => panic!("expected ServiceException, got {:?}", other),
        }
        handle.join().unwrap();
    }

    #[test]
    fn test_fetch_reports_http_status() {
        let (location, handle) = serve_once("500 Internal Server Error", "text/plain", "boom");
        let source = source_for(location);

        let err = source
            .fetch_features("geonode:risk", "dim1", &params())
            .unwrap_err();
        assert!(matches!(err, DataSourceError::Status { status: 500, .. }));
        handle.join().unwrap();
    }
}
