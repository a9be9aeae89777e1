//! Streaming synthesis session.
//!
//! One duplex connection per `synthesize` call: connect with the rotating
//! token embedded in the URL, announce the output format, send the markup
//! request, then demultiplex the interleaved text/binary stream into a single
//! audio buffer until the turn-end marker arrives.

use crate::error::{Error, Result};
use crate::protocol;
use crate::token;
use crate::voice::VoiceConfig;

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{ORIGIN, USER_AGENT};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

pub const DEFAULT_ENDPOINT: &str =
    "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1";

const GATEWAY_VERSION: &str = "1-131.0.2903.99";
const DEFAULT_ORIGIN: &str = "chrome-extension://jdiccldimpdaibmpdkjnbmckianbfold";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub endpoint: String,
    pub origin: String,
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub turn_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(10),
            turn_timeout: Duration::from_secs(20),
        }
    }
}

pub struct SynthesisSession {
    config: SessionConfig,
}

impl SynthesisSession {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    fn connection_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.config.endpoint)
            .map_err(|e| Error::Connection(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("TrustedClientToken", token::TRUSTED_CLIENT_TOKEN)
            .append_pair("Sec-MS-GEC", &token::gateway_token())
            .append_pair("Sec-MS-GEC-Version", GATEWAY_VERSION)
            .append_pair("ConnectionId", &protocol::request_id());
        Ok(url)
    }

    /// Synthesize `text` with the given voice, returning the concatenated
    /// audio payload of every binary frame received before the turn-end
    /// marker.
    pub async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>> {
        let url = self.connection_url()?;

        let mut request = url
            .to_string()
            .into_client_request()
            .map_err(|e| Error::Connection(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(
            ORIGIN,
            HeaderValue::from_str(&self.config.origin)
                .map_err(|e| Error::Connection(e.to_string()))?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.config.user_agent)
                .map_err(|e| Error::Connection(e.to_string()))?,
        );

        let (ws_stream, _response) = timeout(self.config.connect_timeout, connect_async(request))
            .await
            .map_err(|_| Error::Timeout("connect"))?
            .map_err(|e| Error::Connection(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(
                protocol::speech_config_message(&voice.output_format).into(),
            ))
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let request_id = protocol::request_id();
        tracing::debug!(%request_id, voice = %voice.voice_name, "synthesis request");
        write
            .send(Message::Text(
                protocol::ssml_message(&request_id, voice, text).into(),
            ))
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let deadline = Instant::now() + self.config.turn_timeout;
        let mut audio = Vec::new();

        loop {
            let item = tokio::time::timeout_at(deadline, read.next())
                .await
                .map_err(|_| Error::Timeout("turn end"))?;

            let msg = match item {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(Error::Connection(e.to_string())),
                None => {
                    return Err(Error::Protocol(
                        "stream ended before turn end".to_string(),
                    ))
                }
            };

            match msg {
                Message::Binary(bytes) => {
                    audio.extend_from_slice(protocol::audio_payload(bytes.as_ref())?);
                }
                Message::Text(text) => match protocol::text_message_path(text.as_str()) {
                    Some(protocol::PATH_TURN_END) => break,
                    // turn.start, response, audio.metadata: status only.
                    Some(_) | None => {}
                },
                Message::Close(_) => {
                    return Err(Error::Protocol(
                        "connection closed before turn end".to_string(),
                    ))
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }

        let _ = write.send(Message::Close(None)).await;
        tracing::debug!(%request_id, bytes = audio.len(), "turn complete");
        Ok(audio)
    }
}
