
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use serde_json::{Map, Value};

use crate::dumper::{DumpPolicy, Dumper};
use crate::error::{ClientError, ClientErrorDescription};
use crate::transport::{RawResponse, TransportClient};
use crate::types::{AccentPhrase, AudioQuery};

pub const TELEMETRY_TARGET: &str = "telemetry";

/// Every engine endpoint this client knows how to drive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum EndpointName {
    Version,
    Speakers,
    Presets,
    AudioQuery,
    AudioQueryFromPreset,
    AccentPhrases,
    MoraData,
    MoraLength,
    MoraPitch,
    Synthesis,
    MultiSynthesis,
    ConnectWaves,
}

impl EndpointName {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Speakers => "speakers",
            Self::Presets => "presets",
            Self::AudioQuery => "audio_query",
            Self::AudioQueryFromPreset => "audio_query_from_preset",
            Self::AccentPhrases => "accent_phrases",
            Self::MoraData => "mora_data",
            Self::MoraLength => "mora_length",
            Self::MoraPitch => "mora_pitch",
            Self::Synthesis => "synthesis",
            Self::MultiSynthesis => "multi_synthesis",
            Self::ConnectWaves => "connect_waves",
        }
    }

    pub fn path(&self) -> String {
        format!("/{}", self.as_str())
    }

    fn descriptor(self, dump: &DumpConfig) -> Box<dyn Endpoint> {
        match self {
            Self::Version | Self::Speakers | Self::Presets => Box::new(InfoEndpoint::new(self, dump)),
            Self::AudioQuery | Self::AudioQueryFromPreset | Self::AccentPhrases => {
                Box::new(TextEndpoint::new(self, dump))
            },
            Self::MoraData | Self::MoraLength | Self::MoraPitch => Box::new(PhraseEndpoint::new(self, dump)),
            Self::Synthesis => Box::new(SynthesisEndpoint::new(self, dump)),
            Self::MultiSynthesis => Box::new(MultiSynthesisEndpoint::new(self, dump)),
            Self::ConnectWaves => Box::new(ConnectWavesEndpoint::new(self, dump)),
        }
    }
}

impl fmt::Display for EndpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments of one endpoint call. Each descriptor accepts only its own shape.
#[derive(Debug, Clone, Copy)]
pub enum Call<'a> {
    Info,
    Text {
        text: &'a str,
        speaker: u32,
        is_kana: Option<bool>,
    },
    Preset {
        text: &'a str,
        preset_id: i32,
    },
    Phrases {
        accent_phrases: &'a [AccentPhrase],
        speaker: u32,
    },
    Synthesis {
        query: &'a AudioQuery,
        speaker: u32,
    },
    MultiSynthesis {
        queries: &'a [AudioQuery],
        speaker: u32,
    },
    ConnectWaves {
        waves: &'a [String],
    },
}

impl<'a> Call<'a> {
    pub fn speaker(&self) -> Option<u32> {
        match self {
            Self::Text { speaker, .. }
            | Self::Phrases { speaker, .. }
            | Self::Synthesis { speaker, .. }
            | Self::MultiSynthesis { speaker, .. } => Some(*speaker),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Text { .. } => "text",
            Self::Preset { .. } => "preset",
            Self::Phrases { .. } => "phrases",
            Self::Synthesis { .. } => "synthesis",
            Self::MultiSynthesis { .. } => "multi_synthesis",
            Self::ConnectWaves { .. } => "connect_waves",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub call: Call<'a>,
    /// Labels dumped artifacts; without one the endpoint name is used.
    pub tag: Option<&'a str>,
}

impl<'a> Request<'a> {
    pub fn new(call: Call<'a>, tag: Option<&'a str>) -> Self {
        Self { call, tag }
    }

    fn unexpected(&self, endpoint: EndpointName) -> ClientError {
        ClientError::new(ClientErrorDescription::UnexpectedCall {
            endpoint: endpoint.as_str(),
            call: self.call.kind(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn into_json(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Binary(_) => empty_object(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Binary(bytes) => bytes,
            Self::Json(value) => value.to_string().into_bytes(),
        }
    }
}

/// A finished call: what the endpoint produced and how long the network took.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub payload: Payload,
    pub elapsed: Duration,
}

/// One engine endpoint: how to call it, what to report, and what to keep.
pub trait Endpoint {
    fn name(&self) -> EndpointName;

    fn request(&self, client: &TransportClient, request: &Request) -> Result<RawResponse, ClientError>;

    /// Reports one telemetry line. Must not fail.
    fn log(&self, elapsed: Duration, _response: &RawResponse, _request: &Request) {
        log_telemetry(self.name(), elapsed, None);
    }

    fn extract(&mut self, response: RawResponse, request: &Request) -> Result<Payload, ClientError>;
}

/// Calls `endpoint`, timing only the HTTP exchange, then logs and extracts.
pub fn run(endpoint: &mut dyn Endpoint, client: &TransportClient, request: &Request) -> Result<Outcome, ClientError> {
    let start = Instant::now();
    let response = endpoint.request(client, request)?;
    let elapsed = start.elapsed();

    endpoint.log(elapsed, &response, request);

    if !response.status().is_success() {
        return Err(ClientError::new(ClientErrorDescription::Status {
            endpoint: endpoint.name().as_str(),
            status: response.status(),
            body: response.text(),
        }));
    }

    let payload = endpoint.extract(response, request)?;
    Ok(Outcome { payload, elapsed })
}

pub fn log_telemetry(name: EndpointName, elapsed: Duration, detail: Option<String>) {
    log::info!(target: TELEMETRY_TARGET, "{}", telemetry_line(name, elapsed, detail.as_deref()));
}

/// `{name:>18}: {secs:7.3} [sec]`, then ` : {detail}` when there is one.
pub fn telemetry_line(name: EndpointName, elapsed: Duration, detail: Option<&str>) -> String {
    let detail = detail.map(|d| format!(" : {}", d)).unwrap_or_default();
    format!("{:>18}: {:7.3} [sec]{}", name.as_str(), elapsed.as_secs_f64(), detail)
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Parses a JSON body, standing in an empty object for anything unparsable.
pub fn decode_json(name: EndpointName, response: &RawResponse) -> Value {
    match response.json() {
        Ok(value) => value,
        Err(e) => {
            log::warn!("{}: response is not JSON ({}), using an empty object", name, e);
            empty_object()
        },
    }
}

fn spoken_text(accent_phrases: &[AccentPhrase]) -> String {
    accent_phrases
        .iter()
        .flat_map(|p| p.moras.iter().chain(p.pause_mora.iter()))
        .map(|m| m.text.as_str())
        .collect()
}

/// The text a query will speak. Streaming splices phrases into a template whose
/// `kana` belongs to the empty text, so the phrases win whenever there are any.
fn synthesis_detail(query: &AudioQuery) -> String {
    let spoken = spoken_text(&query.accent_phrases);
    match query.kana.as_deref() {
        Some(kana) if spoken.is_empty() => kana.to_string(),
        _ => spoken,
    }
}

/// Where descriptors put their artifacts.
#[derive(Debug, Clone, Default)]
pub struct DumpConfig {
    pub dir: Option<PathBuf>,
    pub policy: DumpPolicy,
}

/// A descriptor's dumper, present only when a dump directory is configured.
#[derive(Debug)]
struct Artifacts {
    endpoint: EndpointName,
    dumper: Option<Dumper>,
    policy: DumpPolicy,
    cleared: HashSet<String>,
}

impl Artifacts {
    fn new(endpoint: EndpointName, dump: &DumpConfig, extension: &str, indexed: bool) -> Self {
        let dumper = dump
            .dir
            .as_ref()
            .map(|dir| Dumper::new(dir.join(endpoint.as_str()), extension, indexed));
        Self {
            endpoint,
            dumper,
            policy: dump.policy,
            cleared: HashSet::new(),
        }
    }

    fn name_for(&self, request: &Request) -> String {
        match (request.tag, request.call.speaker()) {
            (Some(tag), Some(speaker)) => format!("{}_s{:02}", tag, speaker),
            (Some(tag), None) => tag.to_string(),
            (None, _) => self.endpoint.as_str().to_string(),
        }
    }

    fn persist(&mut self, request: &Request, content: &[u8]) -> Result<(), ClientError> {
        let name = self.name_for(request);
        let Some(dumper) = self.dumper.as_mut() else {
            return Ok(());
        };
        if self.policy == DumpPolicy::ClearFirst && self.cleared.insert(name.clone()) {
            let removed = dumper.clear(&name)?;
            if removed > 0 {
                log::debug!("{}: cleared {} earlier dumps of {}", self.endpoint, removed, name);
            }
        }
        dumper.dump(&name, content)?;
        Ok(())
    }
}

/// `version`, `speakers`, `presets`: plain GETs.
#[derive(Debug)]
pub struct InfoEndpoint {
    name: EndpointName,
    artifacts: Artifacts,
}

impl InfoEndpoint {
    pub fn new(name: EndpointName, dump: &DumpConfig) -> Self {
        Self {
            name,
            artifacts: Artifacts::new(name, dump, "json", false),
        }
    }
}

impl Endpoint for InfoEndpoint {
    fn name(&self) -> EndpointName {
        self.name
    }

    fn request(&self, client: &TransportClient, request: &Request) -> Result<RawResponse, ClientError> {
        match request.call {
            Call::Info => client.get(&self.name.path()),
            _ => Err(request.unexpected(self.name)),
        }
    }

    fn extract(&mut self, response: RawResponse, request: &Request) -> Result<Payload, ClientError> {
        self.artifacts.persist(request, response.bytes())?;
        Ok(Payload::Json(decode_json(self.name, &response)))
    }
}

/// `audio_query`, `audio_query_from_preset`, `accent_phrases`: text in the query string.
#[derive(Debug)]
pub struct TextEndpoint {
    name: EndpointName,
    artifacts: Artifacts,
}

impl TextEndpoint {
    pub fn new(name: EndpointName, dump: &DumpConfig) -> Self {
        Self {
            name,
            artifacts: Artifacts::new(name, dump, "json", true),
        }
    }
}

impl Endpoint for TextEndpoint {
    fn name(&self) -> EndpointName {
        self.name
    }

    fn request(&self, client: &TransportClient, request: &Request) -> Result<RawResponse, ClientError> {
        let params = match request.call {
            Call::Text { text, speaker, is_kana } => {
                let mut params = vec![("text", text.to_string()), ("speaker", speaker.to_string())];
                if let Some(is_kana) = is_kana {
                    // the engine wants the literal tokens, not a JSON boolean
                    params.push(("is_kana", if is_kana { "true" } else { "false" }.to_string()));
                }
                params
            },
            Call::Preset { text, preset_id } => {
                vec![("text", text.to_string()), ("preset_id", preset_id.to_string())]
            },
            _ => return Err(request.unexpected(self.name)),
        };
        client.post::<Value>(&self.name.path(), &params, None)
    }

    fn log(&self, elapsed: Duration, _response: &RawResponse, request: &Request) {
        let detail = match request.call {
            Call::Text { text, .. } | Call::Preset { text, .. } => {
                Some(format!("{:3} : {}", text.chars().count(), text))
            },
            _ => None,
        };
        log_telemetry(self.name, elapsed, detail);
    }

    fn extract(&mut self, response: RawResponse, request: &Request) -> Result<Payload, ClientError> {
        self.artifacts.persist(request, response.bytes())?;
        Ok(Payload::Json(decode_json(self.name, &response)))
    }
}

/// `mora_data`, `mora_length`, `mora_pitch`: accent phrases in, accent phrases out.
#[derive(Debug)]
pub struct PhraseEndpoint {
    name: EndpointName,
    artifacts: Artifacts,
}

impl PhraseEndpoint {
    pub fn new(name: EndpointName, dump: &DumpConfig) -> Self {
        Self {
            name,
            artifacts: Artifacts::new(name, dump, "json", true),
        }
    }
}

impl Endpoint for PhraseEndpoint {
    fn name(&self) -> EndpointName {
        self.name
    }

    fn request(&self, client: &TransportClient, request: &Request) -> Result<RawResponse, ClientError> {
        match request.call {
            Call::Phrases { accent_phrases, speaker } => {
                client.post(&self.name.path(), &[("speaker", speaker.to_string())], Some(accent_phrases))
            },
            _ => Err(request.unexpected(self.name)),
        }
    }

    fn log(&self, elapsed: Duration, _response: &RawResponse, request: &Request) {
        let detail = match request.call {
            Call::Phrases { accent_phrases, .. } => Some(spoken_text(accent_phrases)),
            _ => None,
        };
        log_telemetry(self.name, elapsed, detail);
    }

    fn extract(&mut self, response: RawResponse, request: &Request) -> Result<Payload, ClientError> {
        self.artifacts.persist(request, response.bytes())?;
        Ok(Payload::Json(decode_json(self.name, &response)))
    }
}

/// `synthesis`: one audio query in, one wav out.
#[derive(Debug)]
pub struct SynthesisEndpoint {
    name: EndpointName,
    artifacts: Artifacts,
}

impl SynthesisEndpoint {
    pub fn new(name: EndpointName, dump: &DumpConfig) -> Self {
        Self {
            name,
            artifacts: Artifacts::new(name, dump, "wav", true),
        }
    }
}

impl Endpoint for SynthesisEndpoint {
    fn name(&self) -> EndpointName {
        self.name
    }

    fn request(&self, client: &TransportClient, request: &Request) -> Result<RawResponse, ClientError> {
        match request.call {
            Call::Synthesis { query, speaker } => {
                client.post(&self.name.path(), &[("speaker", speaker.to_string())], Some(query))
            },
            _ => Err(request.unexpected(self.name)),
        }
    }

    fn log(&self, elapsed: Duration, _response: &RawResponse, request: &Request) {
        let detail = match request.call {
            Call::Synthesis { query, .. } => Some(synthesis_detail(query)),
            _ => None,
        };
        log_telemetry(self.name, elapsed, detail);
    }

    fn extract(&mut self, response: RawResponse, request: &Request) -> Result<Payload, ClientError> {
        self.artifacts.persist(request, response.bytes())?;
        Ok(Payload::Binary(response.into_bytes()))
    }
}

/// `multi_synthesis`: many audio queries in, a zip of wavs out.
#[derive(Debug)]
pub struct MultiSynthesisEndpoint {
    name: EndpointName,
    artifacts: Artifacts,
}

impl MultiSynthesisEndpoint {
    pub fn new(name: EndpointName, dump: &DumpConfig) -> Self {
        Self {
            name,
            artifacts: Artifacts::new(name, dump, "zip", true),
        }
    }
}

impl Endpoint for MultiSynthesisEndpoint {
    fn name(&self) -> EndpointName {
        self.name
    }

    fn request(&self, client: &TransportClient, request: &Request) -> Result<RawResponse, ClientError> {
        match request.call {
            Call::MultiSynthesis { queries, speaker } => {
                client.post(&self.name.path(), &[("speaker", speaker.to_string())], Some(queries))
            },
            _ => Err(request.unexpected(self.name)),
        }
    }

    fn log(&self, elapsed: Duration, _response: &RawResponse, request: &Request) {
        let detail = match request.call {
            Call::MultiSynthesis { queries, .. } => Some(format!("{:3} queries", queries.len())),
            _ => None,
        };
        log_telemetry(self.name, elapsed, detail);
    }

    fn extract(&mut self, response: RawResponse, request: &Request) -> Result<Payload, ClientError> {
        self.artifacts.persist(request, response.bytes())?;
        Ok(Payload::Binary(response.into_bytes()))
    }
}

/// `connect_waves`: base64 wavs in, one wav out.
#[derive(Debug)]
pub struct ConnectWavesEndpoint {
    name: EndpointName,
    artifacts: Artifacts,
}

impl ConnectWavesEndpoint {
    pub fn new(name: EndpointName, dump: &DumpConfig) -> Self {
        Self {
            name,
            artifacts: Artifacts::new(name, dump, "wav", true),
        }
    }
}

impl Endpoint for ConnectWavesEndpoint {
    fn name(&self) -> EndpointName {
        self.name
    }

    fn request(&self, client: &TransportClient, request: &Request) -> Result<RawResponse, ClientError> {
        match request.call {
            Call::ConnectWaves { waves } => client.post(&self.name.path(), &[], Some(waves)),
            _ => Err(request.unexpected(self.name)),
        }
    }

    fn log(&self, elapsed: Duration, _response: &RawResponse, request: &Request) {
        let detail = match request.call {
            Call::ConnectWaves { waves } => Some(format!("{:3} waves", waves.len())),
            _ => None,
        };
        log_telemetry(self.name, elapsed, detail);
    }

    fn extract(&mut self, response: RawResponse, request: &Request) -> Result<Payload, ClientError> {
        self.artifacts.persist(request, response.bytes())?;
        Ok(Payload::Binary(response.into_bytes()))
    }
}

/// Lazily built descriptors, one per endpoint, living as long as their service.
pub struct EndpointRegistry {
    dump: DumpConfig,
    endpoints: HashMap<EndpointName, Box<dyn Endpoint>>,
}

impl EndpointRegistry {
    pub fn new(dump: DumpConfig) -> Self {
        Self {
            dump,
            endpoints: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, name: EndpointName) -> &mut dyn Endpoint {
        let dump = &self.dump;
        self.endpoints
            .entry(name)
            .or_insert_with(|| name.descriptor(dump))
            .as_mut()
    }

    pub fn call(&mut self, client: &TransportClient, name: EndpointName, request: &Request) -> Result<Outcome, ClientError> {
        run(self.resolve(name), client, request)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::thread::sleep;
    use tempfile::tempdir;

    fn client_for(server: &mockito::ServerGuard) -> TransportClient {
        let address = server.socket_address();
        TransportClient::new(&address.ip().to_string(), address.port())
    }

    struct SlowEndpoint {
        delay: Duration,
    }

    impl Endpoint for SlowEndpoint {
        fn name(&self) -> EndpointName {
            EndpointName::Version
        }

        fn request(&self, client: &TransportClient, _request: &Request) -> Result<RawResponse, ClientError> {
            client.get("/version")
        }

        fn log(&self, _elapsed: Duration, _response: &RawResponse, _request: &Request) {
            sleep(self.delay);
        }

        fn extract(&mut self, response: RawResponse, _request: &Request) -> Result<Payload, ClientError> {
            sleep(self.delay);
            Ok(Payload::Json(decode_json(self.name(), &response)))
        }
    }

    #[test]
    fn elapsed_excludes_log_and_extract() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/version").with_body("\"1.0\"").create();
        let client = client_for(&server);

        let delay = Duration::from_millis(300);
        let mut endpoint = SlowEndpoint { delay };
        let start = Instant::now();
        let outcome = run(&mut endpoint, &client, &Request::new(Call::Info, None)).unwrap();
        let total = start.elapsed();

        assert!(total >= delay * 2);
        assert!(outcome.elapsed <= total);
        assert!(outcome.elapsed < delay, "reported {:?}", outcome.elapsed);
        assert_eq!(outcome.payload, Payload::Json(json!("1.0")));
    }

    #[test]
    fn unparsable_json_becomes_empty_object() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/speakers").with_status(200).with_body("not json").create();

        let mut registry = EndpointRegistry::new(DumpConfig::default());
        let outcome = registry
            .call(&client_for(&server), EndpointName::Speakers, &Request::new(Call::Info, None))
            .unwrap();
        assert_eq!(outcome.payload, Payload::Json(json!({})));
    }

    #[test]
    fn non_success_status_is_an_error() {
        let mut server = mockito::Server::new();
        server.mock("POST", "/synthesis")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create();

        let query = AudioQuery::default();
        let mut registry = EndpointRegistry::new(DumpConfig::default());
        let err = registry
            .call(
                &client_for(&server),
                EndpointName::Synthesis,
                &Request::new(Call::Synthesis { query: &query, speaker: 1 }, None),
            )
            .unwrap_err();
        match err.as_inner() {
            ClientErrorDescription::Status { endpoint, status, body } => {
                assert_eq!(*endpoint, "synthesis");
                assert_eq!(status.as_u16(), 500);
                assert_eq!(body, "boom");
            },
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn is_kana_travels_as_lowercase_token() {
        let mut server = mockito::Server::new();
        let mock = server.mock("POST", "/accent_phrases")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("text".into(), "コンニチワ'".into()),
                Matcher::UrlEncoded("speaker".into(), "2".into()),
                Matcher::UrlEncoded("is_kana".into(), "true".into()),
            ]))
            .with_body("[]")
            .create();

        let mut registry = EndpointRegistry::new(DumpConfig::default());
        let call = Call::Text { text: "コンニチワ'", speaker: 2, is_kana: Some(true) };
        registry
            .call(&client_for(&server), EndpointName::AccentPhrases, &Request::new(call, None))
            .unwrap();
        mock.assert();
    }

    #[test]
    fn registry_memoizes_descriptors_and_their_counters() {
        let mut server = mockito::Server::new();
        server.mock("POST", "/audio_query").match_query(Matcher::Any).with_body("{}").expect(2).create();
        server.mock("GET", "/version").with_body("\"1.0\"").create();
        let client = client_for(&server);

        let tmp = tempdir().unwrap();
        let mut registry = EndpointRegistry::new(DumpConfig {
            dir: Some(tmp.path().to_path_buf()),
            policy: DumpPolicy::Accumulate,
        });

        for text in ["あ", "い"] {
            let call = Call::Text { text, speaker: 3, is_kana: None };
            registry.call(&client, EndpointName::AudioQuery, &Request::new(call, Some("story"))).unwrap();
        }
        registry.call(&client, EndpointName::Version, &Request::new(Call::Info, None)).unwrap();

        assert_eq!(registry.len(), 2);
        let dir = tmp.path().join("audio_query");
        assert!(dir.join("story_s03_001.json").is_file());
        assert!(dir.join("story_s03_002.json").is_file());
        assert!(tmp.path().join("version").join("version.json").is_file());
    }

    #[test]
    fn untagged_dumps_use_endpoint_name() {
        let mut server = mockito::Server::new();
        server.mock("POST", "/connect_waves").with_body(vec![1u8, 2, 3]).create();

        let tmp = tempdir().unwrap();
        let mut registry = EndpointRegistry::new(DumpConfig {
            dir: Some(tmp.path().to_path_buf()),
            policy: DumpPolicy::Accumulate,
        });
        let waves = vec!["AAAA".to_string()];
        let outcome = registry
            .call(&client_for(&server), EndpointName::ConnectWaves, &Request::new(Call::ConnectWaves { waves: &waves }, None))
            .unwrap();

        assert_eq!(outcome.payload, Payload::Binary(vec![1, 2, 3]));
        let dumped = tmp.path().join("connect_waves").join("connect_waves_001.wav");
        assert_eq!(std::fs::read(dumped).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn clear_first_drops_stale_dumps_once() {
        let mut server = mockito::Server::new();
        server.mock("POST", "/connect_waves").with_body(vec![7u8]).expect(2).create();

        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("connect_waves");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("story_009.wav"), b"old").unwrap();

        let mut registry = EndpointRegistry::new(DumpConfig {
            dir: Some(tmp.path().to_path_buf()),
            policy: DumpPolicy::ClearFirst,
        });
        let client = client_for(&server);
        let waves = vec!["AAAA".to_string()];
        for _ in 0..2 {
            let request = Request::new(Call::ConnectWaves { waves: &waves }, Some("story"));
            registry.call(&client, EndpointName::ConnectWaves, &request).unwrap();
        }

        let mut names = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        names.sort();
        assert_eq!(names, vec!["story_001.wav", "story_002.wav"]);
    }

    fn mora(text: &str) -> crate::types::Mora {
        crate::types::Mora { text: text.into(), ..Default::default() }
    }

    #[test]
    fn telemetry_line_is_fixed_width() {
        let line = telemetry_line(EndpointName::AudioQuery, Duration::from_millis(1234), Some("  3 : こんにちは"));
        assert_eq!(line, "       audio_query:   1.234 [sec] :   3 : こんにちは");
        assert_eq!(telemetry_line(EndpointName::Version, Duration::from_millis(5), None), "           version:   0.005 [sec]");
    }

    #[test]
    fn synthesis_reports_spliced_phrases_over_template_kana() {
        let query = AudioQuery {
            kana: Some(String::new()),
            accent_phrases: vec![AccentPhrase { moras: vec![mora("コ"), mora("ン")], ..Default::default() }],
            ..Default::default()
        };
        let line = telemetry_line(EndpointName::Synthesis, Duration::from_millis(5), Some(&synthesis_detail(&query)));
        assert_eq!(line, "         synthesis:   0.005 [sec] : コン");

        let bare = AudioQuery { kana: Some("コン'".into()), ..Default::default() };
        assert_eq!(synthesis_detail(&bare), "コン'");
    }

    #[test]
    fn mismatched_call_is_rejected_before_any_request() {
        let mut registry = EndpointRegistry::new(DumpConfig::default());
        let client = TransportClient::new("127.0.0.1", 9);
        let err = registry
            .call(&client, EndpointName::Synthesis, &Request::new(Call::Info, None))
            .unwrap_err();
        assert!(matches!(err.as_inner(), ClientErrorDescription::UnexpectedCall { .. }));
    }
}
