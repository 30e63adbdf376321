
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::dumper::DumpPolicy;
use crate::endpoint::{Call, DumpConfig, EndpointName, EndpointRegistry, Payload, Request};
use crate::error::ClientError;
use crate::pipeline::SpeechService;
use crate::transport::{TransportClient, DEFAULT_HOST, DEFAULT_PORT};
use crate::types::{self, AccentPhrase, AudioQuery, Preset, Speaker};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub dump_dir: Option<PathBuf>,
    pub dump_policy: DumpPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            dump_dir: None,
            dump_policy: DumpPolicy::Accumulate,
        }
    }
}

/// Typed access to every engine endpoint.
pub struct VveService {
    client: TransportClient,
    registry: EndpointRegistry,
}

impl VveService {
    pub fn new(config: &ClientConfig) -> Self {
        let dump = DumpConfig {
            dir: config.dump_dir.clone(),
            policy: config.dump_policy,
        };
        Self::with_client(TransportClient::new(&config.host, config.port), dump)
    }

    pub fn with_client(client: TransportClient, dump: DumpConfig) -> Self {
        Self {
            client,
            registry: EndpointRegistry::new(dump),
        }
    }

    pub fn origin(&self) -> &str {
        self.client.origin()
    }

    /// Runs one endpoint and hands back its payload untouched.
    pub fn call(&mut self, name: EndpointName, call: Call, tag: Option<&str>) -> Result<Payload, ClientError> {
        let outcome = self.registry.call(&self.client, name, &Request::new(call, tag))?;
        Ok(outcome.payload)
    }

    fn call_json<T: DeserializeOwned + Default>(
        &mut self,
        name: EndpointName,
        call: Call,
        tag: Option<&str>,
    ) -> Result<T, ClientError> {
        let value = self.call(name, call, tag)?.into_json();
        Ok(decode_or_default(name, value))
    }

    pub fn version(&mut self) -> Result<String, ClientError> {
        let version: String = self.call_json(EndpointName::Version, Call::Info, None)?;
        Ok(version.trim().to_string())
    }

    pub fn speakers(&mut self) -> Result<Vec<Speaker>, ClientError> {
        self.call_json(EndpointName::Speakers, Call::Info, None)
    }

    pub fn presets(&mut self) -> Result<Vec<Preset>, ClientError> {
        self.call_json(EndpointName::Presets, Call::Info, None)
    }

    pub fn audio_query(&mut self, text: &str, speaker: u32, tag: Option<&str>) -> Result<AudioQuery, ClientError> {
        let call = Call::Text { text, speaker, is_kana: None };
        self.call_json(EndpointName::AudioQuery, call, tag)
    }

    pub fn audio_query_from_preset(&mut self, text: &str, preset_id: i32, tag: Option<&str>) -> Result<AudioQuery, ClientError> {
        self.call_json(EndpointName::AudioQueryFromPreset, Call::Preset { text, preset_id }, tag)
    }

    pub fn accent_phrases(
        &mut self,
        text: &str,
        speaker: u32,
        is_kana: bool,
        tag: Option<&str>,
    ) -> Result<Vec<AccentPhrase>, ClientError> {
        let call = Call::Text { text, speaker, is_kana: Some(is_kana) };
        self.call_json(EndpointName::AccentPhrases, call, tag)
    }

    pub fn mora_data(&mut self, accent_phrases: &[AccentPhrase], speaker: u32, tag: Option<&str>) -> Result<Vec<AccentPhrase>, ClientError> {
        self.edit_phrases(EndpointName::MoraData, accent_phrases, speaker, tag)
    }

    pub fn mora_length(&mut self, accent_phrases: &[AccentPhrase], speaker: u32, tag: Option<&str>) -> Result<Vec<AccentPhrase>, ClientError> {
        self.edit_phrases(EndpointName::MoraLength, accent_phrases, speaker, tag)
    }

    pub fn mora_pitch(&mut self, accent_phrases: &[AccentPhrase], speaker: u32, tag: Option<&str>) -> Result<Vec<AccentPhrase>, ClientError> {
        self.edit_phrases(EndpointName::MoraPitch, accent_phrases, speaker, tag)
    }

    fn edit_phrases(
        &mut self,
        name: EndpointName,
        accent_phrases: &[AccentPhrase],
        speaker: u32,
        tag: Option<&str>,
    ) -> Result<Vec<AccentPhrase>, ClientError> {
        let edited: Vec<AccentPhrase> = self.call_json(name, Call::Phrases { accent_phrases, speaker }, tag)?;
        if !types::same_shape(accent_phrases, &edited) {
            log::warn!("{}: returned phrases differ in mora layout from the ones sent", name);
        }
        Ok(edited)
    }

    pub fn synthesis(&mut self, query: &AudioQuery, speaker: u32, tag: Option<&str>) -> Result<Vec<u8>, ClientError> {
        Ok(self.call(EndpointName::Synthesis, Call::Synthesis { query, speaker }, tag)?.into_bytes())
    }

    pub fn multi_synthesis(&mut self, queries: &[AudioQuery], speaker: u32, tag: Option<&str>) -> Result<Vec<u8>, ClientError> {
        Ok(self.call(EndpointName::MultiSynthesis, Call::MultiSynthesis { queries, speaker }, tag)?.into_bytes())
    }

    pub fn connect_waves(&mut self, waves: &[String], tag: Option<&str>) -> Result<Vec<u8>, ClientError> {
        Ok(self.call(EndpointName::ConnectWaves, Call::ConnectWaves { waves }, tag)?.into_bytes())
    }
}

impl SpeechService for VveService {
    fn audio_query(&mut self, text: &str, speaker: u32, tag: Option<&str>) -> Result<AudioQuery, ClientError> {
        VveService::audio_query(self, text, speaker, tag)
    }

    fn accent_phrases(&mut self, text: &str, speaker: u32, tag: Option<&str>) -> Result<Vec<AccentPhrase>, ClientError> {
        VveService::accent_phrases(self, text, speaker, false, tag)
    }

    fn synthesis(&mut self, query: &AudioQuery, speaker: u32, tag: Option<&str>) -> Result<Vec<u8>, ClientError> {
        VveService::synthesis(self, query, speaker, tag)
    }

    fn multi_synthesis(&mut self, queries: &[AudioQuery], speaker: u32, tag: Option<&str>) -> Result<Vec<u8>, ClientError> {
        VveService::multi_synthesis(self, queries, speaker, tag)
    }

    fn connect_waves(&mut self, waves: &[String], tag: Option<&str>) -> Result<Vec<u8>, ClientError> {
        VveService::connect_waves(self, waves, tag)
    }
}

fn decode_or_default<T: DeserializeOwned + Default>(name: EndpointName, value: Value) -> T {
    match serde_json::from_value(value) {
        Ok(decoded) => decoded,
        Err(e) => {
            log::warn!("{}: unexpected response shape ({}), using defaults", name, e);
            T::default()
        },
    }
}
