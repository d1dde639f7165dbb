//! Cloud TTS backend over HTTP.
//!
//! Synthesis POSTs a JSON request and expects a WAV body back. Reachability
//! of the endpoint stands in for availability.

use super::resource::decode_wav;
use super::{AudioResource, EngineAdapter, EngineKind, SampleAudio};
use crate::emotion::EmotionProfile;
use crate::error::SynthesisError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// Bound on the reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice: &'a str,
    locale: &'a str,
    speed: f32,
    volume: f32,
    sample_rate: u32,
}

/// HTTP text-to-speech engine adapter.
pub struct CloudTts {
    client: reqwest::Client,
    endpoint: Option<String>,
    api_key: String,
    voice: String,
    locale: String,
    sample_rate: u32,
}

impl CloudTts {
    pub fn new(
        endpoint: Option<String>,
        api_key: &str,
        voice: &str,
        locale: &str,
        sample_rate: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key: api_key.to_owned(),
            voice: voice.to_owned(),
            locale: locale.to_owned(),
            sample_rate,
        }
    }

    fn endpoint(&self) -> Result<&str, SynthesisError> {
        self.endpoint
            .as_deref()
            .ok_or_else(|| SynthesisError::unavailable(EngineKind::CloudTts, "no endpoint configured"))
    }
}

fn map_transport_error(e: reqwest::Error) -> SynthesisError {
    let kind = EngineKind::CloudTts;
    if e.is_timeout() {
        SynthesisError::timeout(kind, e.to_string())
    } else if e.is_connect() || e.is_builder() || e.is_request() {
        SynthesisError::unavailable(kind, e.to_string())
    } else {
        SynthesisError::rejected(kind, e.to_string())
    }
}

#[async_trait]
impl EngineAdapter for CloudTts {
    fn kind(&self) -> EngineKind {
        EngineKind::CloudTts
    }

    fn locales(&self) -> BTreeSet<String> {
        BTreeSet::from([self.locale.clone()])
    }

    async fn probe(&self) -> Result<(), SynthesisError> {
        let endpoint = self.endpoint()?;
        let response = self
            .client
            .get(endpoint)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        debug!(%status, "cloud TTS endpoint reachable");
        if status.is_server_error() {
            return Err(SynthesisError::unavailable(
                EngineKind::CloudTts,
                format!("endpoint unhealthy: HTTP {status}"),
            ));
        }
        Ok(())
    }

    async fn synthesize(
        &self,
        text: &str,
        profile: &EmotionProfile,
    ) -> Result<Box<dyn AudioResource>, SynthesisError> {
        let kind = EngineKind::CloudTts;
        let endpoint = self.endpoint()?;
        let body = SynthesisRequest {
            text,
            voice: &self.voice,
            locale: &self.locale,
            speed: profile.speed_factor,
            volume: profile.volume,
            sample_rate: self.sample_rate,
        };

        let mut request = self.client.post(endpoint).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SynthesisError::rejected(
                kind,
                format!("HTTP {status}: {}", detail.trim()),
            ));
        }

        let bytes = response.bytes().await.map_err(map_transport_error)?;
        let reader = hound::WavReader::new(Cursor::new(bytes.to_vec()))
            .map_err(|e| SynthesisError::rejected(kind, format!("response is not WAV audio: {e}")))?;
        let (samples, sample_rate) =
            decode_wav(reader).map_err(|e| SynthesisError::rejected(kind, e.to_string()))?;

        // Volume is requested server-side; do not scale a second time.
        Ok(Box::new(SampleAudio::new(samples, sample_rate, 1.0)))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::emotion::EmotionTable;
    use crate::error::SynthesisErrorKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn wav_bytes(samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn engine(server: &MockServer, api_key: &str) -> CloudTts {
        CloudTts::new(
            Some(format!("{}/api/tts", server.uri())),
            api_key,
            "pt-BR-Standard-A",
            "pt-BR",
            24_000,
        )
    }

    #[tokio::test]
    async fn probe_succeeds_when_endpoint_answers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tts"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        assert!(engine(&server, "").probe().await.is_ok());
    }

    #[tokio::test]
    async fn probe_reports_unhealthy_endpoint_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let err = engine(&server, "").probe().await.unwrap_err();
        assert_eq!(err.kind, SynthesisErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn missing_endpoint_is_unavailable() {
        let tts = CloudTts::new(None, "", "v", "pt-BR", 24_000);
        let err = tts.probe().await.unwrap_err();
        assert_eq!(err.kind, SynthesisErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let tts = CloudTts::new(Some("http://127.0.0.1:9/api/tts".into()), "", "v", "pt-BR", 24_000);
        let err = tts.probe().await.unwrap_err();
        assert_eq!(err.kind, SynthesisErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn synthesize_sends_prosody_and_decodes_wav() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tts"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "text": "Olá!",
                "locale": "pt-BR",
                "voice": "pt-BR-Standard-A",
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(wav_bytes(&[0, 1000, -1000, 0]), "audio/wav"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let table = EmotionTable::builtin();
        let audio = engine(&server, "secret")
            .synthesize("Olá!", table.get_emotion_config("feliz"))
            .await
            .unwrap();
        assert_eq!(audio.describe(), "samples");
    }

    #[tokio::test]
    async fn http_error_is_backend_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("text too long"))
            .mount(&server)
            .await;

        let table = EmotionTable::builtin();
        let err = engine(&server, "")
            .synthesize("x", table.get_emotion_config("neutro"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, SynthesisErrorKind::BackendRejected);
        assert!(err.message.contains("text too long"));
    }

    #[tokio::test]
    async fn non_wav_body_is_backend_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let table = EmotionTable::builtin();
        let err = engine(&server, "")
            .synthesize("x", table.get_emotion_config("neutro"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, SynthesisErrorKind::BackendRejected);
    }
}
