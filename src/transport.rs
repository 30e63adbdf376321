
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::error::ClientError;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 50021;

/// Body of an engine response, read to the end.
#[derive(Debug, Clone)]
pub struct RawResponse {
    status: StatusCode,
    body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Plain HTTP access to one engine. No retries; timeouts are reqwest's defaults.
#[derive(Debug, Clone)]
pub struct TransportClient {
    http: Client,
    origin: String,
}

impl TransportClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            http: Client::new(),
            origin: format!("http://{}:{}", host, port),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn get(&self, path: &str) -> Result<RawResponse, ClientError> {
        let response = self.http.get(self.url(path)).send()?;
        Self::read(response)
    }

    /// POSTs with `query` as URL parameters and, when given, `body` as a JSON document.
    pub fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<RawResponse, ClientError> {
        let mut request = self.http.post(self.url(path)).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        Self::read(request.send()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }

    fn read(response: reqwest::blocking::Response) -> Result<RawResponse, ClientError> {
        let status = response.status();
        let body = response.bytes()?.to_vec();
        Ok(RawResponse::new(status, body))
    }
}

impl Default for TransportClient {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard) -> TransportClient {
        let address = server.socket_address();
        TransportClient::new(&address.ip().to_string(), address.port())
    }

    #[test]
    fn get_reads_status_and_body() {
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/version")
            .with_status(200)
            .with_body("\"0.14.4\"")
            .create();

        let response = client_for(&server).get("/version").unwrap();
        mock.assert();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.json().unwrap(), json!("0.14.4"));
    }

    #[test]
    fn post_sends_query_and_json_body() {
        let mut server = mockito::Server::new();
        let mock = server.mock("POST", "/mora_pitch")
            .match_query(Matcher::UrlEncoded("speaker".into(), "3".into()))
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!([{"accent": 1}])))
            .with_status(200)
            .with_body("[]")
            .create();

        let body = json!([{"accent": 1}]);
        let response = client_for(&server)
            .post("/mora_pitch", &[("speaker", "3".to_string())], Some(&body))
            .unwrap();
        mock.assert();
        assert_eq!(response.text(), "[]");
    }

    #[test]
    fn non_success_status_is_returned_not_raised() {
        let mut server = mockito::Server::new();
        server.mock("POST", "/audio_query")
            .match_query(Matcher::Any)
            .with_status(422)
            .with_body("{\"detail\":[]}")
            .create();

        let response = client_for(&server)
            .post::<Value>("/audio_query", &[("text", "あ".to_string())], None)
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn unreachable_engine_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = TransportClient::new("127.0.0.1", port).get("/version").unwrap_err();
        assert!(matches!(err.as_inner(), crate::error::ClientErrorDescription::Transport(_)));
    }
}
