// 该文件是 Saomiao （扫描） 项目的一部分。
// src/config.rs - 可调参数配置
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::detection::DetectorType;

pub const DEFAULT_MATCH_IOU: f32 = 0.5;
pub const DEFAULT_CONFIRM_HITS: u32 = 2;
pub const DEFAULT_MIN_CONFIRM_STABILITY: f32 = 0.3;
pub const DEFAULT_MAX_MISSED_FRAMES: u32 = 5;
pub const DEFAULT_LOST_TIMEOUT_MS: i64 = 3000;
pub const DEFAULT_HISTORY_LEN: usize = 8;

pub const DEFAULT_HIGH_CONFIDENCE: f32 = 0.8;
pub const DEFAULT_MEDIUM_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_CONFLICT_IOU: f32 = 0.6;

pub const DEFAULT_OBJECT_INTERVAL_MS: u64 = 400;
pub const DEFAULT_BARCODE_INTERVAL_MS: u64 = 100;
pub const DEFAULT_DOCUMENT_INTERVAL_MS: u64 = 500;

pub const DEFAULT_THUMBNAIL_CAPACITY: usize = 32;
pub const DEFAULT_THUMBNAIL_PADDING: f32 = 0.1;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("参数无效: {0}")]
  InvalidArgument(String),
  #[error("配置文件读取错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  Parse(#[from] serde_json::Error),
}

fn check_fraction(name: &str, value: f32) -> Result<(), ConfigError> {
  if !value.is_finite() || !(0.0..=1.0).contains(&value) {
    return Err(ConfigError::InvalidArgument(format!(
      "{} 必须位于 [0, 1]，实际为 {}",
      name, value
    )));
  }
  Ok(())
}

/// 跟踪器参数
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
  /// 检测与轨迹匹配所需的最小 IoU
  pub match_iou: f32,
  /// 新建之后连续匹配多少帧进入 CONFIRMED
  pub confirm_hits: u32,
  pub min_confirm_stability: f32,
  /// 连续丢失多少帧进入 LOST
  pub max_missed_frames: u32,
  /// LOST 状态持续缺席超过该时长后过期
  pub lost_timeout_ms: i64,
  pub history_len: usize,
}

impl Default for TrackerConfig {
  fn default() -> Self {
    Self {
      match_iou: DEFAULT_MATCH_IOU,
      confirm_hits: DEFAULT_CONFIRM_HITS,
      min_confirm_stability: DEFAULT_MIN_CONFIRM_STABILITY,
      max_missed_frames: DEFAULT_MAX_MISSED_FRAMES,
      lost_timeout_ms: DEFAULT_LOST_TIMEOUT_MS,
      history_len: DEFAULT_HISTORY_LEN,
    }
  }
}

impl TrackerConfig {
  pub fn with_match_iou(mut self, match_iou: f32) -> Self {
    self.match_iou = match_iou;
    self
  }

  pub fn with_confirm_hits(mut self, confirm_hits: u32) -> Self {
    self.confirm_hits = confirm_hits;
    self
  }

  pub fn with_max_missed_frames(mut self, max_missed_frames: u32) -> Self {
    self.max_missed_frames = max_missed_frames;
    self
  }

  pub fn with_lost_timeout_ms(mut self, lost_timeout_ms: i64) -> Self {
    self.lost_timeout_ms = lost_timeout_ms;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    check_fraction("match_iou", self.match_iou)?;
    check_fraction("min_confirm_stability", self.min_confirm_stability)?;
    if self.match_iou == 0.0 {
      return Err(ConfigError::InvalidArgument(
        "match_iou 必须大于 0".to_string(),
      ));
    }
    if self.max_missed_frames == 0 {
      return Err(ConfigError::InvalidArgument(
        "max_missed_frames 必须大于 0".to_string(),
      ));
    }
    if self.lost_timeout_ms < 0 {
      return Err(ConfigError::InvalidArgument(format!(
        "lost_timeout_ms 不能为负数: {}",
        self.lost_timeout_ms
      )));
    }
    if self.history_len == 0 {
      return Err(ConfigError::InvalidArgument(
        "history_len 必须大于 0".to_string(),
      ));
    }
    Ok(())
  }
}

/// 聚合器参数
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
  pub high_confidence: f32,
  pub medium_confidence: f32,
  /// 两个轨迹被视为同一物体的最小重叠
  pub conflict_iou: f32,
}

impl Default for AggregatorConfig {
  fn default() -> Self {
    Self {
      high_confidence: DEFAULT_HIGH_CONFIDENCE,
      medium_confidence: DEFAULT_MEDIUM_CONFIDENCE,
      conflict_iou: DEFAULT_CONFLICT_IOU,
    }
  }
}

impl AggregatorConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    check_fraction("high_confidence", self.high_confidence)?;
    check_fraction("medium_confidence", self.medium_confidence)?;
    check_fraction("conflict_iou", self.conflict_iou)?;
    if self.medium_confidence > self.high_confidence {
      return Err(ConfigError::InvalidArgument(format!(
        "medium_confidence ({}) 不能大于 high_confidence ({})",
        self.medium_confidence, self.high_confidence
      )));
    }
    Ok(())
  }
}

/// 各检测器的最小调用间隔（毫秒）
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
  pub object_ms: i64,
  pub barcode_ms: i64,
  pub document_ms: i64,
}

impl Default for ThrottleConfig {
  fn default() -> Self {
    Self {
      object_ms: DEFAULT_OBJECT_INTERVAL_MS as i64,
      barcode_ms: DEFAULT_BARCODE_INTERVAL_MS as i64,
      document_ms: DEFAULT_DOCUMENT_INTERVAL_MS as i64,
    }
  }
}

impl ThrottleConfig {
  pub fn interval(&self, kind: DetectorType) -> i64 {
    match kind {
      DetectorType::Object => self.object_ms,
      DetectorType::Barcode => self.barcode_ms,
      DetectorType::Document => self.document_ms,
    }
  }
}

/// 扫描会话参数
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
  pub tracker: TrackerConfig,
  pub aggregator: AggregatorConfig,
  pub throttle: ThrottleConfig,
  pub thumbnail_capacity: usize,
  pub thumbnail_padding: f32,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      tracker: TrackerConfig::default(),
      aggregator: AggregatorConfig::default(),
      throttle: ThrottleConfig::default(),
      thumbnail_capacity: DEFAULT_THUMBNAIL_CAPACITY,
      thumbnail_padding: DEFAULT_THUMBNAIL_PADDING,
    }
  }
}

impl SessionConfig {
  pub fn with_tracker(mut self, tracker: TrackerConfig) -> Self {
    self.tracker = tracker;
    self
  }

  pub fn with_aggregator(mut self, aggregator: AggregatorConfig) -> Self {
    self.aggregator = aggregator;
    self
  }

  pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
    self.throttle = throttle;
    self
  }

  pub fn with_thumbnail_capacity(mut self, capacity: usize) -> Self {
    self.thumbnail_capacity = capacity;
    self
  }

  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载配置文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let config: SessionConfig = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    self.tracker.validate()?;
    self.aggregator.validate()?;
    for kind in DetectorType::ALL {
      let interval = self.throttle.interval(kind);
      if interval < 0 {
        return Err(ConfigError::InvalidArgument(format!(
          "{} 检测器的调用间隔不能为负数: {}",
          kind, interval
        )));
      }
    }
    if !self.thumbnail_padding.is_finite() || self.thumbnail_padding < 0.0 {
      return Err(ConfigError::InvalidArgument(format!(
        "thumbnail_padding 不能为负数: {}",
        self.thumbnail_padding
      )));
    }
    Ok(())
  }
}
