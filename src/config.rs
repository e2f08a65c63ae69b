use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs,
    path::PathBuf,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::lifecycle::PhaseDurations;
use crate::types::*;

// ── Config types ───────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
  /// Autonomous round cadence; `0` disables the scheduler.
  pub round_interval_ms: u64,
  pub duel_stage_ms: u64,
  pub process_stage_ms: u64,
  pub compete_stage_ms: u64,
  pub tournament_mode: bool,
  pub tournament_continue_ms: u64,
  pub min_layer: i32,
  pub max_layer: i32,
  pub start_layer: i32,
  /// Fixed RNG seed; entropy when unset.
  pub seed: Option<u64>,
  pub tie_break: TieBreak,
}

impl Default for EngineConfig {
  fn default() -> Self {
    EngineConfig {
      round_interval_ms: ROUND_INTERVAL_MS,
      duel_stage_ms: DUEL_STAGE_MS,
      process_stage_ms: PROCESS_STAGE_MS,
      compete_stage_ms: COMPETE_STAGE_MS,
      tournament_mode: false,
      tournament_continue_ms: TOURNAMENT_CONTINUE_MS,
      min_layer: DEFAULT_MIN_LAYER,
      max_layer: DEFAULT_MAX_LAYER,
      start_layer: DEFAULT_MAX_LAYER,
      seed: None,
      tie_break: TieBreak::CoinFlip,
    }
  }
}

impl EngineConfig {
  pub fn bounds(&self) -> LayerBounds {
    LayerBounds {
      min: self.min_layer,
      max: self.max_layer,
    }
  }

  pub fn durations(&self) -> PhaseDurations {
    PhaseDurations {
      duel_stage_ms: self.duel_stage_ms,
      process_stage_ms: self.process_stage_ms,
      compete_stage_ms: self.compete_stage_ms,
    }
  }

  pub fn validate(&self) -> Result<(), String> {
    if self.min_layer > self.max_layer {
      return Err(format!(
        "minLayer ({}) must not be above maxLayer ({})",
        self.min_layer, self.max_layer
      ));
    }
    if !self.bounds().contains(self.start_layer) {
      return Err(format!(
        "startLayer ({}) must be within {}..={}",
        self.start_layer, self.min_layer, self.max_layer
      ));
    }
    if self.tournament_mode && self.tournament_continue_ms == 0 {
      return Err("tournamentContinueMs must be positive in tournament mode".to_string());
    }
    Ok(())
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
  pub bind_addr: String,
  pub port: u16,
  pub public_dir: String,
  pub logs_dir: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    ServerConfig {
      bind_addr: "0.0.0.0".to_string(),
      port: 3000,
      public_dir: "public".to_string(),
      logs_dir: "logs".to_string(),
    }
  }
}

impl ServerConfig {
  pub fn listen_addr(&self) -> String {
    format!("{}:{}", self.bind_addr, self.port)
  }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
  pub engine: EngineConfig,
  pub server: ServerConfig,
}

// ── Paths ──────────────────────────────────────────────────────────────

pub fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_repo_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    repo_root().join(path)
  }
}

pub fn config_path() -> PathBuf {
  match env_default("RPS_CONFIG_PATH") {
    Some(raw) => resolve_repo_path(&raw),
    None => repo_root().join("config.json"),
  }
}

// ── Environment ────────────────────────────────────────────────────────

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

pub fn env_flag_true(key: &str) -> bool {
  env_default(key).is_some_and(|value| flag_true(&value))
}

fn flag_true(raw: &str) -> bool {
  matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_override<T>(key: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<T>, String>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match lookup(key) {
    Some(raw) => raw
      .parse::<T>()
      .map(Some)
      .map_err(|e| format!("invalid {key}={raw}: {e}")),
    None => Ok(None),
  }
}

/// Overlays environment values on a loaded config. `lookup` is
/// `env_default` outside of tests.
pub fn apply_overrides(
  mut config: AppConfig,
  lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, String> {
  let engine = &mut config.engine;
  if let Some(value) = parse_override("ROUND_INTERVAL_MS", &lookup)? {
    engine.round_interval_ms = value;
  }
  if let Some(value) = parse_override("DUEL_STAGE_MS", &lookup)? {
    engine.duel_stage_ms = value;
  }
  if let Some(value) = parse_override("PROCESS_STAGE_MS", &lookup)? {
    engine.process_stage_ms = value;
  }
  if let Some(value) = parse_override("COMPETE_STAGE_MS", &lookup)? {
    engine.compete_stage_ms = value;
  }
  if let Some(value) = lookup("TOURNAMENT_MODE") {
    engine.tournament_mode = flag_true(&value);
  }
  if let Some(value) = parse_override("TOURNAMENT_CONTINUE_MS", &lookup)? {
    engine.tournament_continue_ms = value;
  }
  if let Some(value) = parse_override("MIN_LAYER", &lookup)? {
    engine.min_layer = value;
  }
  if let Some(value) = parse_override("MAX_LAYER", &lookup)? {
    engine.max_layer = value;
  }
  if let Some(value) = parse_override("START_LAYER", &lookup)? {
    engine.start_layer = value;
  }
  if let Some(value) = parse_override("GAME_SEED", &lookup)? {
    engine.seed = Some(value);
  }
  if let Some(value) = parse_override::<TieBreak>("TIE_BREAK", &lookup)? {
    engine.tie_break = value;
  }

  let server = &mut config.server;
  if let Some(value) = parse_override("PORT", &lookup)? {
    server.port = value;
  }
  if let Some(value) = lookup("BIND_ADDR") {
    server.bind_addr = value;
  }
  if let Some(value) = lookup("PUBLIC_DIR") {
    server.public_dir = value;
  }
  if let Some(value) = lookup("LOGS_DIR") {
    server.logs_dir = value;
  }
  Ok(config)
}

pub fn apply_env_defaults(config: AppConfig) -> Result<AppConfig, String> {
  apply_overrides(config, env_default)
}

pub fn load_config_inner() -> Result<AppConfig, String> {
  let path = config_path();
  let config = if path.is_file() {
    let data = fs::read_to_string(&path).map_err(|e| format!("read config {}: {e}", path.display()))?;
    serde_json::from_str::<AppConfig>(&data).map_err(|e| format!("parse config {}: {e}", path.display()))?
  } else {
    AppConfig::default()
  };
  let config = apply_env_defaults(config)?;
  config.engine.validate()?;
  Ok(config)
}

pub fn load_env_file() {
  let env_path = repo_root().join(".env");
  if !env_path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(&env_path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let mut value = raw_value.trim();
  let quoted = value.len() >= 2
    && ((value.starts_with('"') && value.ends_with('"')) || (value.starts_with('\'') && value.ends_with('\'')));
  if quoted {
    value = &value[1..value.len() - 1];
  } else if let Some(idx) = value.find('#') {
    value = value[..idx].trim_end();
  }
  Some((key.to_string(), value.to_string()))
}

// ── Time ───────────────────────────────────────────────────────────────

pub fn now_ms() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}

/// RFC 3339 rendering of an engine timestamp.
pub fn iso_from_ms(ms: u64) -> Option<String> {
  let ms = i64::try_from(ms).ok()?;
  DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339())
}
