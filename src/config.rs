use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::evidence::SaveFormat;

const DEFAULT_SOURCE_URL: &str = "stub://ward_camera";
const DEFAULT_TARGET_FPS: u32 = 10;
const DEFAULT_WINDOW_SECS: u64 = 10;
const DEFAULT_INTERVAL_SECS: u64 = 5;
const DEFAULT_COOLDOWN_SECS: u64 = 30;
const DEFAULT_MAX_FRAMES: usize = 5;
const DEFAULT_EVIDENCE_ROOT: &str = "evidence";
const DEFAULT_POSITIVE_MARKER: &str = "FALL_DETECTED:";
const DEFAULT_NEGATIVE_MARKER: &str = "NO_FALL:";
const DEFAULT_WORKER_THREADS: usize = 2;
const DEFAULT_WORKER_QUEUE_DEPTH: usize = 8;
const DEFAULT_HISTORY_LIMIT: usize = 256;
const DEFAULT_BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

#[derive(Debug, Deserialize, Default)]
struct FallwatchConfigFile {
    source: Option<SourceConfigFile>,
    window_duration_secs: Option<u64>,
    analysis_interval_secs: Option<u64>,
    cooldown_secs: Option<u64>,
    max_frames_per_analysis: Option<usize>,
    save_formats: Option<Vec<String>>,
    evidence_root: Option<PathBuf>,
    notifier_enabled: Option<bool>,
    markers: Option<MarkerConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    telegram: Option<TelegramConfigFile>,
    workers: Option<WorkerConfigFile>,
    history_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct MarkerConfigFile {
    positive: Option<String>,
    negative: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    mode: Option<String>,
    judge: Option<StageConfigFile>,
    describer: Option<StageConfigFile>,
}

#[derive(Debug, Deserialize, Default, Clone)]
struct StageConfigFile {
    endpoint: Option<String>,
    model: Option<String>,
    api_key_env: Option<String>,
    prompt: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TelegramConfigFile {
    chat_id: Option<String>,
    bot_token_env: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WorkerConfigFile {
    threads: Option<usize>,
    queue_depth: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassifierMode {
    Stub,
    Judge,
    TwoStage,
}

/// One remote classifier stage (describer or judge).
#[derive(Clone, Debug)]
pub struct StageSettings {
    pub endpoint: String,
    pub model: String,
    /// Env var holding the bearer token, if the endpoint needs one.
    pub api_key_env: Option<String>,
    /// Override for the built-in prompt.
    pub prompt: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ClassifierSettings {
    pub mode: ClassifierMode,
    pub judge: Option<StageSettings>,
    pub describer: Option<StageSettings>,
}

#[derive(Clone, Debug)]
pub struct TelegramSettings {
    pub chat_id: String,
    pub bot_token_env: String,
}

#[derive(Clone, Debug)]
pub struct FallwatchConfig {
    pub source_url: String,
    pub target_fps: u32,
    pub window_duration: Duration,
    pub analysis_interval: Duration,
    pub cooldown: Duration,
    pub max_frames_per_analysis: usize,
    pub save_formats: Vec<SaveFormat>,
    pub evidence_root: PathBuf,
    pub notifier_enabled: bool,
    pub positive_marker: String,
    pub negative_marker: String,
    pub classifier: ClassifierSettings,
    pub telegram: Option<TelegramSettings>,
    pub worker_threads: usize,
    pub worker_queue_depth: usize,
    pub history_limit: usize,
}

impl FallwatchConfig {
    /// Load from the file named by `FALLWATCH_CONFIG` (if set), apply env
    /// overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FALLWATCH_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => FallwatchConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FallwatchConfigFile) -> Result<Self> {
        let source_url = file
            .source
            .as_ref()
            .and_then(|s| s.url.clone())
            .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string());
        let target_fps = file
            .source
            .as_ref()
            .and_then(|s| s.target_fps)
            .unwrap_or(DEFAULT_TARGET_FPS);
        let save_formats = SaveFormat::parse_list(
            &file
                .save_formats
                .unwrap_or_else(|| vec!["still".to_string()]),
        )?;
        let markers = file.markers.unwrap_or_default();
        let classifier = parse_classifier(file.classifier.unwrap_or_default())?;
        let telegram = file.telegram.and_then(|t| {
            t.chat_id.map(|chat_id| TelegramSettings {
                chat_id,
                bot_token_env: t
                    .bot_token_env
                    .unwrap_or_else(|| DEFAULT_BOT_TOKEN_ENV.to_string()),
            })
        });
        let workers = file.workers.unwrap_or_default();

        Ok(Self {
            source_url,
            target_fps,
            window_duration: Duration::from_secs(
                file.window_duration_secs.unwrap_or(DEFAULT_WINDOW_SECS),
            ),
            analysis_interval: Duration::from_secs(
                file.analysis_interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS),
            ),
            cooldown: Duration::from_secs(file.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS)),
            max_frames_per_analysis: file
                .max_frames_per_analysis
                .unwrap_or(DEFAULT_MAX_FRAMES),
            save_formats,
            evidence_root: file
                .evidence_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EVIDENCE_ROOT)),
            notifier_enabled: file.notifier_enabled.unwrap_or(false),
            positive_marker: markers
                .positive
                .unwrap_or_else(|| DEFAULT_POSITIVE_MARKER.to_string()),
            negative_marker: markers
                .negative
                .unwrap_or_else(|| DEFAULT_NEGATIVE_MARKER.to_string()),
            classifier,
            telegram,
            worker_threads: workers.threads.unwrap_or(DEFAULT_WORKER_THREADS),
            worker_queue_depth: workers.queue_depth.unwrap_or(DEFAULT_WORKER_QUEUE_DEPTH),
            history_limit: file.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("FALLWATCH_SOURCE") {
            if !url.trim().is_empty() {
                self.source_url = url;
            }
        }
        if let Ok(root) = std::env::var("FALLWATCH_EVIDENCE_ROOT") {
            if !root.trim().is_empty() {
                self.evidence_root = PathBuf::from(root);
            }
        }
        if let Ok(notify) = std::env::var("FALLWATCH_NOTIFY") {
            self.notifier_enabled = notify.trim().eq_ignore_ascii_case("true");
        }
        if let Ok(cooldown) = std::env::var("FALLWATCH_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.parse().map_err(|_| {
                anyhow!("FALLWATCH_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.cooldown = Duration::from_secs(seconds);
        }
        if self.telegram.is_none() {
            if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID") {
                if !chat_id.trim().is_empty() {
                    self.telegram = Some(TelegramSettings {
                        chat_id,
                        bot_token_env: DEFAULT_BOT_TOKEN_ENV.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.window_duration.is_zero() {
            return Err(anyhow!("window_duration_secs must be greater than zero"));
        }
        if self.analysis_interval.is_zero() {
            return Err(anyhow!("analysis_interval_secs must be greater than zero"));
        }
        if self.max_frames_per_analysis == 0 {
            return Err(anyhow!("max_frames_per_analysis must be greater than zero"));
        }
        if self.save_formats.is_empty() {
            return Err(anyhow!("save_formats must name at least one format"));
        }
        if self.positive_marker.trim().is_empty() || self.negative_marker.trim().is_empty() {
            return Err(anyhow!("verdict markers must not be empty"));
        }
        match self.classifier.mode {
            ClassifierMode::Stub => {}
            ClassifierMode::Judge => {
                if self.classifier.judge.is_none() {
                    return Err(anyhow!("classifier mode 'judge' requires a judge section"));
                }
            }
            ClassifierMode::TwoStage => {
                if self.classifier.judge.is_none() || self.classifier.describer.is_none() {
                    return Err(anyhow!(
                        "classifier mode 'two-stage' requires describer and judge sections"
                    ));
                }
            }
        }
        self.worker_threads = self.worker_threads.max(1);
        self.worker_queue_depth = self.worker_queue_depth.max(1);
        self.history_limit = self.history_limit.max(1);
        Ok(())
    }
}

fn parse_classifier(file: ClassifierConfigFile) -> Result<ClassifierSettings> {
    let mode = match file.mode.as_deref().unwrap_or("stub") {
        "stub" => ClassifierMode::Stub,
        "judge" => ClassifierMode::Judge,
        "two-stage" => ClassifierMode::TwoStage,
        other => {
            return Err(anyhow!(
                "unknown classifier mode '{}': expected stub, judge or two-stage",
                other
            ))
        }
    };
    Ok(ClassifierSettings {
        mode,
        judge: file.judge.map(parse_stage).transpose()?,
        describer: file.describer.map(parse_stage).transpose()?,
    })
}

fn parse_stage(file: StageConfigFile) -> Result<StageSettings> {
    let endpoint = file
        .endpoint
        .ok_or_else(|| anyhow!("classifier stage requires an endpoint"))?;
    let model = file
        .model
        .ok_or_else(|| anyhow!("classifier stage requires a model"))?;
    Ok(StageSettings {
        endpoint,
        model,
        api_key_env: file.api_key_env,
        prompt: file.prompt,
    })
}

fn read_config_file(path: &Path) -> Result<FallwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
