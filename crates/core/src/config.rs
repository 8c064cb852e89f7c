//! Process-wide configuration.
//!
//! Everything is read from environment variables once at startup, before the
//! first control-channel command, and stays immutable for the lifetime of the
//! process. The telephony host spawns one process per call, so this is also
//! per-call configuration.

use std::env;
use std::path::PathBuf;

// --- Default utterances (in the assistant's default language) ---

pub const DEFAULT_GREETING: &str = "Здравствуйте! Вас приветствует AI-ассистент. Чем могу помочь?";
pub const DEFAULT_REPROMPT: &str = "Простите, я вас не расслышал. Не могли бы вы повторить?";
pub const DEFAULT_FAREWELL: &str = "Спасибо за звонок! До свидания!";
pub const DEFAULT_APOLOGY: &str = "Извините, произошла ошибка. До свидания.";
pub const DEFAULT_EXIT_PHRASES: &str = "до свидания,пока,спасибо,всё";

/// Which service generates conversational replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatProvider {
    Anthropic,
    OpenAi,
    Google,
    Ollama,
}

/// Which service turns reply text into audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAi,
    Yandex,
}

/// Which service turns recorded audio into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    Whisper,
    Yandex,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVar(String),
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },
}

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub chat_provider: ChatProvider,
    pub model: String,
    pub api_key: Option<String>,
    pub language: String,
    pub system_prompt: String,
    pub ollama_url: String,

    pub tts_provider: TtsProvider,
    pub stt_provider: SttProvider,
    pub yandex_api_key: Option<String>,
    pub yandex_folder_id: Option<String>,

    pub max_turns: u32,
    pub listen_timeout_secs: u32,
    pub record_silence_secs: u32,
    pub count_empty_turns: bool,
    pub exit_phrases: Vec<String>,

    pub greeting_text: String,
    pub reprompt_text: String,
    pub farewell_text: String,
    pub apology_text: String,

    pub http_timeout_secs: u64,
    pub tmp_dir: PathBuf,
    pub log_dir: PathBuf,
    pub enable_recording: bool,
    pub recordings_dir: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `AI_PROVIDER`: reply backend, "anthropic" | "openai" | "google" | "ollama". Defaults to "anthropic".
    // *   `AI_MODEL`: model identifier passed to the reply backend.
    // *   `AI_API_KEY`: credential for the reply backend (and for OpenAI speech endpoints). Required except for ollama.
    // *   `AI_LANGUAGE`: spoken language, folded into the default system prompt. Defaults to "русский".
    // *   `AI_SYSTEM_PROMPT`: (Optional) overrides the built-in call-center instruction.
    // *   `OLLAMA_URL`: (Optional) base URL of a local ollama daemon.
    // *   `TTS_PROVIDER`: "openai" | "yandex". Defaults to "openai".
    // *   `STT_PROVIDER`: "whisper" | "yandex". Defaults to "whisper".
    // *   `YANDEX_API_KEY`, `YANDEX_FOLDER_ID`: SpeechKit credentials, required when a yandex provider is selected.
    // *   `MAX_TURNS`, `LISTEN_TIMEOUT_SECS`, `RECORD_SILENCE_SECS`: dialogue loop bounds. Defaults 10 / 5 / 2.
    // *   `COUNT_EMPTY_TURNS`: whether silent turns consume the turn budget. Defaults to "true";
    //      with "false" a permanently silent caller is reprompted without limit, so only their hangup ends the call.
    // *   `EXIT_PHRASES`: comma-separated farewell words, matched case-insensitively.
    // *   `GREETING_TEXT`, `REPROMPT_TEXT`, `FAREWELL_TEXT`, `APOLOGY_TEXT`: (Optional) utterance overrides.
    // *   `HTTP_TIMEOUT_SECS`: request timeout for every provider call. Defaults to 30.
    // *   `AGI_TMP_DIR`: root for per-call audio artifacts. Defaults to /tmp/agi_audio.
    // *   `AGI_LOG_DIR`: where the dated log file goes. Defaults to /var/log/agi.
    // *   `ENABLE_RECORDING`, `RECORDINGS_DIR`: archive each caller segment for later review.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. Useful for local development, ignored if not present.
        dotenvy::dotenv().ok();

        let chat_provider = match lookup("AI_PROVIDER").as_deref() {
            None | Some("anthropic") => ChatProvider::Anthropic,
            Some("openai") => ChatProvider::OpenAi,
            Some("google") => ChatProvider::Google,
            Some("ollama") => ChatProvider::Ollama,
            Some(other) => return Err(invalid("AI_PROVIDER", other)),
        };

        let tts_provider = match lookup("TTS_PROVIDER").as_deref() {
            None | Some("openai") => TtsProvider::OpenAi,
            Some("yandex") => TtsProvider::Yandex,
            Some(other) => return Err(invalid("TTS_PROVIDER", other)),
        };

        let stt_provider = match lookup("STT_PROVIDER").as_deref() {
            None | Some("whisper") => SttProvider::Whisper,
            Some("yandex") => SttProvider::Yandex,
            Some(other) => return Err(invalid("STT_PROVIDER", other)),
        };

        let model =
            env::var("AI_MODEL").unwrap_or_else(|_| "claude-sonnet-4-5-20250929".to_string());
        let api_key = env::var("AI_API_KEY").ok().filter(|k| !k.is_empty());
        let language = env::var("AI_LANGUAGE").unwrap_or_else(|_| "русский".to_string());
        let system_prompt = env::var("AI_SYSTEM_PROMPT").unwrap_or_else(|_| {
            format!("Вы вежливый AI-ассистент колл-центра. Отвечайте на {language} языке, кратко и по делу.")
        });
        let ollama_url =
            env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());

        let yandex_api_key = env::var("YANDEX_API_KEY").ok().filter(|k| !k.is_empty());
        let yandex_folder_id = env::var("YANDEX_FOLDER_ID").ok().filter(|k| !k.is_empty());

        let exit_phrases =
            parse_exit_phrases(&env::var("EXIT_PHRASES").unwrap_or_else(|_| DEFAULT_EXIT_PHRASES.to_string()));

        let config = Self {
            chat_provider,
            model,
            api_key,
            language,
            system_prompt,
            ollama_url,
            tts_provider,
            stt_provider,
            yandex_api_key,
            yandex_folder_id,
            max_turns: parse_number("MAX_TURNS", 10)?,
            listen_timeout_secs: parse_number("LISTEN_TIMEOUT_SECS", 5)?,
            record_silence_secs: parse_number("RECORD_SILENCE_SECS", 2)?,
            count_empty_turns: parse_flag("COUNT_EMPTY_TURNS", true)?,
            exit_phrases,
            greeting_text: env::var("GREETING_TEXT").unwrap_or_else(|_| DEFAULT_GREETING.to_string()),
            reprompt_text: env::var("REPROMPT_TEXT").unwrap_or_else(|_| DEFAULT_REPROMPT.to_string()),
            farewell_text: env::var("FAREWELL_TEXT").unwrap_or_else(|_| DEFAULT_FAREWELL.to_string()),
            apology_text: env::var("APOLOGY_TEXT").unwrap_or_else(|_| DEFAULT_APOLOGY.to_string()),
            http_timeout_secs: parse_number("HTTP_TIMEOUT_SECS", 30)?,
            tmp_dir: env::var("AGI_TMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/agi_audio")),
            log_dir: env::var("AGI_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/log/agi")),
            enable_recording: parse_flag("ENABLE_RECORDING", false)?,
            recordings_dir: env::var("RECORDINGS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/spool/asterisk/recordings")),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks that the selected providers have the credentials they need and
    /// that the dialogue bounds are usable.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.chat_provider != ChatProvider::Ollama && self.api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "AI_API_KEY must be set for the selected AI_PROVIDER".to_string(),
            ));
        }
        // OpenAI speech endpoints reuse the same key as the reply backend.
        if (self.tts_provider == TtsProvider::OpenAi || self.stt_provider == SttProvider::Whisper)
            && self.api_key.is_none()
        {
            return Err(ConfigError::MissingVar(
                "AI_API_KEY must be set for OpenAI speech providers".to_string(),
            ));
        }
        if (self.tts_provider == TtsProvider::Yandex || self.stt_provider == SttProvider::Yandex)
            && self.yandex_api_key.is_none()
        {
            return Err(ConfigError::MissingVar(
                "YANDEX_API_KEY must be set for yandex speech providers".to_string(),
            ));
        }
        if self.tts_provider == TtsProvider::Yandex && self.yandex_folder_id.is_none() {
            return Err(ConfigError::MissingVar(
                "YANDEX_FOLDER_ID must be set for yandex speech synthesis".to_string(),
            ));
        }
        if self.max_turns == 0 {
            return Err(ConfigError::InvalidValue {
                var: "MAX_TURNS".to_string(),
                value: "0".to_string(),
            });
        }
        // Goes on the wire as milliseconds in a u32.
        if self.listen_timeout_secs > u32::MAX / 1000 {
            return Err(ConfigError::InvalidValue {
                var: "LISTEN_TIMEOUT_SECS".to_string(),
                value: self.listen_timeout_secs.to_string(),
            });
        }
        Ok(())
    }
}

fn lookup(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

fn invalid(var: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| invalid(var, &raw)),
        Err(_) => Ok(default),
    }
}

fn parse_flag(var: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(invalid(var, &raw)),
        },
        Err(_) => Ok(default),
    }
}

/// Splits the comma-separated exit-phrase list, lowercased for matching.
fn parse_exit_phrases(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
impl Config {
    /// A fully-populated configuration for state machine tests, with a small
    /// turn budget and no external credentials required.
    pub(crate) fn for_tests() -> Self {
        Self {
            chat_provider: ChatProvider::Anthropic,
            model: "claude-sonnet-4-5-20250929".to_string(),
            api_key: Some("test-key".to_string()),
            language: "русский".to_string(),
            system_prompt: "Вы вежливый AI-ассистент колл-центра.".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            tts_provider: TtsProvider::OpenAi,
            stt_provider: SttProvider::Whisper,
            yandex_api_key: None,
            yandex_folder_id: None,
            max_turns: 10,
            listen_timeout_secs: 5,
            record_silence_secs: 2,
            count_empty_turns: true,
            exit_phrases: parse_exit_phrases(DEFAULT_EXIT_PHRASES),
            greeting_text: DEFAULT_GREETING.to_string(),
            reprompt_text: DEFAULT_REPROMPT.to_string(),
            farewell_text: DEFAULT_FAREWELL.to_string(),
            apology_text: DEFAULT_APOLOGY.to_string(),
            http_timeout_secs: 30,
            tmp_dir: std::env::temp_dir().join("agi_audio_test"),
            log_dir: std::env::temp_dir().join("agi_log_test"),
            enable_recording: false,
            recordings_dir: std::env::temp_dir().join("agi_recordings_test"),
        }
    }
}
