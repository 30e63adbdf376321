
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Full synthesis request for one utterance, as the engine's `/audio_query` returns it.
///
/// Fields the engine adds in newer versions are kept in `extra` so a query
/// survives a round trip through this client unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioQuery {
    #[serde(rename = "accent_phrases")]
    pub accent_phrases: Vec<AccentPhrase>,
    pub speed_scale: f64,
    pub pitch_scale: f64,
    pub intonation_scale: f64,
    pub volume_scale: f64,
    pub pre_phoneme_length: f64,
    pub post_phoneme_length: f64,
    pub output_sampling_rate: i32,
    pub output_stereo: bool,
    pub kana: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AccentPhrase {
    pub moras: Vec<Mora>,
    pub accent: i32,
    pub pause_mora: Option<Mora>,
    pub is_interrogative: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccentPhrase {
    /// Mora texts in order, pause excluded. Engines reject edited phrases
    /// whose shape differs from what they produced.
    pub fn shape(&self) -> Vec<&str> {
        self.moras.iter().map(|m| m.text.as_str()).collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Mora {
    pub text: String,
    pub consonant: Option<String>,
    pub consonant_length: Option<f64>,
    pub vowel: String,
    pub vowel_length: f64,
    pub pitch: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// True when both phrase lists have the same moras in the same order.
pub fn same_shape(a: &[AccentPhrase], b: &[AccentPhrase]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.shape() == b.shape())
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Speaker {
    pub name: String,
    pub speaker_uuid: String,
    pub styles: Vec<SpeakerStyle>,
    pub version: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SpeakerStyle {
    pub name: String,
    pub id: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Preset {
    pub id: i32,
    pub name: String,
    #[serde(rename = "speaker_uuid")]
    pub speaker_uuid: String,
    #[serde(rename = "style_id")]
    pub style_id: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine_query() -> Value {
        json!({
            "accent_phrases": [{
                "moras": [
                    {"text": "コ", "consonant": "k", "consonant_length": 0.05, "vowel": "o", "vowel_length": 0.1, "pitch": 5.5},
                    {"text": "ン", "consonant": null, "consonant_length": null, "vowel": "N", "vowel_length": 0.08, "pitch": 5.7}
                ],
                "accent": 1,
                "pause_mora": null,
                "is_interrogative": false
            }],
            "speedScale": 1.0,
            "pitchScale": 0.0,
            "intonationScale": 1.0,
            "volumeScale": 1.0,
            "prePhonemeLength": 0.1,
            "postPhonemeLength": 0.1,
            "pauseLengthScale": 1.0,
            "outputSamplingRate": 24000,
            "outputStereo": false,
            "kana": "コ'ン"
        })
    }

    #[test]
    fn audio_query_keeps_unknown_fields() {
        let query: AudioQuery = serde_json::from_value(engine_query()).unwrap();
        assert_eq!(query.output_sampling_rate, 24000);
        assert_eq!(query.accent_phrases[0].moras.len(), 2);
        assert_eq!(query.kana.as_deref(), Some("コ'ン"));

        let back = serde_json::to_value(&query).unwrap();
        assert_eq!(back["pauseLengthScale"], json!(1.0));
        assert_eq!(back["speedScale"], json!(1.0));
        assert!(back.get("accent_phrases").is_some());
    }

    #[test]
    fn empty_object_decodes_to_default() {
        let query: AudioQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(query, AudioQuery::default());
    }

    #[test]
    fn shape_compares_mora_texts() {
        let query: AudioQuery = serde_json::from_value(engine_query()).unwrap();
        let mut edited = query.accent_phrases.clone();
        edited[0].moras[0].pitch = 6.0;
        assert!(same_shape(&query.accent_phrases, &edited));

        edited[0].moras.pop();
        assert!(!same_shape(&query.accent_phrases, &edited));
    }
}
