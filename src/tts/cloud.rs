use crate::content::text_processor::truncate_for_speech;
use crate::error::{SpeechError, SpeechResult};
use crate::tts::device::TracingSink;
use crate::tts::{settle, SpeechBackend, Utterance};
use crate::types::{SpeechOptions, TtsEngineType, Voice};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// 云端接口单次输入的最大字符数
pub const MAX_INPUT_LENGTH: usize = 4096;

/// 内存中最多缓存的合成音频段数
pub const MAX_CACHED_CLIPS: usize = 128;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

const OPENAI_DEFAULT_MODEL: &str = "tts-1";
const OPENAI_DEFAULT_VOICE: &str = "alloy";
const OPENAI_VOICES: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

const ELEVENLABS_MODEL: &str = "eleven_monolingual_v1";
const ELEVENLABS_DEFAULT_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";
const ELEVENLABS_VOICES: &[(&str, &str)] = &[
    ("21m00Tcm4TlvDq8ikWAM", "Rachel"),
    ("AZnzlk1XvdvUeBnXmlld", "Domi"),
    ("EXAVITQu4vr4xnSDxMaL", "Bella"),
    ("MF3mGyEYCl7XYWbV9V6O", "Elli"),
];

/// 音频播放通道
///
/// 播放一段已合成的音频；stop 让未完成的播放以 `SpeechError::Cancelled` 结束
pub trait AudioSink: Send + Sync {
    /// # 参数
    /// - `audio`: 合成得到的音频字节
    /// - `volume`: 0.0 - 1.0
    /// - `playback_rate`: 客户端变速；服务端已处理语速时为 None
    fn play(&self, audio: Arc<Vec<u8>>, volume: f32, playback_rate: Option<f32>) -> Utterance;

    fn pause(&self);

    fn resume(&self);

    fn stop(&self);
}

impl AudioSink for TracingSink {
    fn play(&self, audio: Arc<Vec<u8>>, volume: f32, playback_rate: Option<f32>) -> Utterance {
        tracing::info!(volume, ?playback_rate, "play {} bytes of audio", audio.len());
        Utterance::ready(Ok(()))
    }

    fn pause(&self) {
        tracing::debug!("audio paused");
    }

    fn resume(&self) {
        tracing::debug!("audio resumed");
    }

    fn stop(&self) {
        tracing::debug!("audio stopped");
    }
}

/// 云端语音服务商
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudProvider {
    OpenAi,
    ElevenLabs,
}

impl CloudProvider {
    pub fn engine_type(&self) -> TtsEngineType {
        match self {
            Self::OpenAi => TtsEngineType::OpenAi,
            Self::ElevenLabs => TtsEngineType::ElevenLabs,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.engine_type().as_str()
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => OPENAI_BASE_URL,
            Self::ElevenLabs => ELEVENLABS_BASE_URL,
        }
    }

    fn default_voice(&self) -> &'static str {
        match self {
            Self::OpenAi => OPENAI_DEFAULT_VOICE,
            Self::ElevenLabs => ELEVENLABS_DEFAULT_VOICE,
        }
    }
}

#[derive(Serialize)]
struct OpenAiSpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
}

#[derive(Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

/// 一次合成请求需要的全部参数（可移入 future）
struct SynthesisRequest {
    provider: CloudProvider,
    api_key: String,
    model: String,
    base_url: String,
    text: String,
    voice: String,
    rate: f32,
}

/// 合成音频缓存
///
/// 容量满时按插入顺序淘汰最旧的音频
struct AudioCache {
    clips: HashMap<String, Arc<Vec<u8>>>,
    order: VecDeque<String>,
    capacity: usize,
}

impl AudioCache {
    fn new(capacity: usize) -> Self {
        Self {
            clips: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        self.clips.get(key).cloned()
    }

    fn insert(&mut self, key: String, audio: Arc<Vec<u8>>) {
        if self.clips.insert(key.clone(), audio).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.clips.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.clips.len()
    }
}

type SharedCache = Arc<Mutex<AudioCache>>;

/// Cloud Speech
/// 通过 HTTP 合成音频，再交给平台播放
///
/// 合成结果按 (服务商, 模型, 文本, 语音, 服务端语速) 缓存在内存中，条目数有上限
pub struct CloudSpeech {
    provider: CloudProvider,
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: Client,
    cache: SharedCache,
    sink: Arc<dyn AudioSink>,
    cancel: Mutex<CancellationToken>,
}

impl CloudSpeech {
    pub fn new(
        provider: CloudProvider,
        api_key: Option<String>,
        model: Option<String>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self {
            provider,
            api_key,
            model: model.unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            base_url: provider.default_base_url().to_string(),
            client: Client::new(),
            cache: Arc::new(Mutex::new(AudioCache::new(MAX_CACHED_CLIPS))),
            sink,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// 自定义服务地址（代理、测试）
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// 调整音频缓存容量
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = Arc::new(Mutex::new(AudioCache::new(capacity)));
        self
    }

    pub fn provider(&self) -> CloudProvider {
        self.provider
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 实际请求使用的模型
    fn model(&self) -> &str {
        match self.provider {
            CloudProvider::OpenAi => &self.model,
            CloudProvider::ElevenLabs => ELEVENLABS_MODEL,
        }
    }

    fn fresh_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut slot = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        *slot = token.clone();
        token
    }
}

#[async_trait]
impl SpeechBackend for CloudSpeech {
    fn engine_type(&self) -> TtsEngineType {
        self.provider.engine_type()
    }

    fn speak(&self, text: &str, options: &SpeechOptions) -> Utterance {
        self.stop();

        // 缺少凭据时立即失败，不发起网络请求
        let Some(api_key) = self.api_key.clone() else {
            return Utterance::ready(Err(SpeechError::CredentialsRequired {
                provider: self.provider.as_str().to_string(),
            }));
        };

        let token = self.fresh_token();
        let voice = options
            .voice
            .as_ref()
            .map(|v| v.id.clone())
            .unwrap_or_else(|| self.provider.default_voice().to_string());
        // OpenAI 在服务端处理语速，ElevenLabs 由播放端变速
        let (server_rate, playback_rate) = match self.provider {
            CloudProvider::OpenAi => (Some(options.rate), None),
            CloudProvider::ElevenLabs => (None, Some(options.rate)),
        };
        let key = cache_key(
            self.provider,
            self.model(),
            text,
            options.voice.as_ref().map_or("default", |v| v.id.as_str()),
            server_rate,
        );

        let request = SynthesisRequest {
            provider: self.provider,
            api_key,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            text: truncate_for_speech(text, MAX_INPUT_LENGTH),
            voice,
            rate: options.rate,
        };
        let client = self.client.clone();
        let cache = self.cache.clone();
        let sink = self.sink.clone();
        let volume = options.volume;

        Utterance::new(async move {
            let cached = cache
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&key);

            let audio = match cached {
                Some(audio) => audio,
                None => {
                    let bytes = tokio::select! {
                        _ = token.cancelled() => return Ok(()),
                        result = synthesize(&client, &request) => result?,
                    };
                    let audio = Arc::new(bytes);
                    cache
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(key, audio.clone());
                    audio
                }
            };

            if token.is_cancelled() {
                return Ok(());
            }
            settle(sink.play(audio, volume, playback_rate).await)
        })
    }

    fn pause(&self) {
        self.sink.pause();
    }

    fn resume(&self) {
        self.sink.resume();
    }

    fn stop(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
        self.sink.stop();
    }

    async fn list_voices(&self) -> Vec<Voice> {
        let provider = self.provider.engine_type();
        match self.provider {
            CloudProvider::OpenAi => OPENAI_VOICES
                .iter()
                .map(|id| Voice {
                    id: id.to_string(),
                    name: capitalize(id),
                    language: "en".to_string(),
                    provider,
                })
                .collect(),
            CloudProvider::ElevenLabs => ELEVENLABS_VOICES
                .iter()
                .map(|(id, name)| Voice {
                    id: id.to_string(),
                    name: name.to_string(),
                    language: "en".to_string(),
                    provider,
                })
                .collect(),
        }
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// 调用服务商接口合成音频
async fn synthesize(client: &Client, request: &SynthesisRequest) -> SpeechResult<Vec<u8>> {
    let builder = match request.provider {
        CloudProvider::OpenAi => client
            .post(format!("{}/v1/audio/speech", request.base_url))
            .bearer_auth(&request.api_key)
            .json(&OpenAiSpeechRequest {
                model: &request.model,
                input: &request.text,
                voice: &request.voice,
                speed: request.rate,
            }),
        CloudProvider::ElevenLabs => client
            .post(format!(
                "{}/v1/text-to-speech/{}",
                request.base_url, request.voice
            ))
            .header("xi-api-key", &request.api_key)
            .json(&ElevenLabsRequest {
                text: &request.text,
                model_id: ELEVENLABS_MODEL,
                voice_settings: VoiceSettings {
                    stability: 0.5,
                    similarity_boost: 0.75,
                },
            }),
    };

    tracing::debug!(
        "requesting {} speech for {} chars",
        request.provider.as_str(),
        request.text.chars().count()
    );
    let response = builder.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SpeechError::Api {
            provider: request.provider.as_str().to_string(),
            status: status.as_u16(),
        });
    }

    Ok(response.bytes().await?.to_vec())
}

/// 缓存键：服务商-模型-文本-语音-语速 的 SHA256
///
/// 只有服务端生效的语速进入键；播放端变速不影响音频内容
fn cache_key(
    provider: CloudProvider,
    model: &str,
    text: &str,
    voice: &str,
    server_rate: Option<f32>,
) -> String {
    let rate = server_rate.map_or_else(|| "client".to_string(), |rate| format!("{:.2}", rate));
    let mut hasher = Sha256::new();
    let material = format!("{}-{}-{}-{}-{}", provider.as_str(), model, text, voice, rate);
    hasher.update(material.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
