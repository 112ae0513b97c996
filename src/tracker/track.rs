// 该文件是 Saomiao （扫描） 项目的一部分。
// src/tracker/track.rs - 单个轨迹的状态与证据
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

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::config::TrackerConfig;
use crate::detection::{Attribute, DetectorType};
use crate::geometry::{NormalizedRect, Rotation};

// 稳定度指数平滑系数
const STABILITY_ALPHA: f32 = 0.5;

/// 轨迹生命周期
///
/// NEW → TRACKED → CONFIRMED → LOST → EXPIRED；
/// LOST 在过期前重新匹配回到 TRACKED，EXPIRED 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
  New,
  Tracked,
  Confirmed,
  Lost,
  Expired,
}

/// 跟踪过程中的生命周期事件，仅用于日志与诊断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TrackEvent {
  Spawned { id: u64, detector: DetectorType },
  Confirmed { id: u64 },
  Lost { id: u64 },
  Recovered { id: u64 },
  Expired { id: u64 },
}

/// 某一属性的一次观测
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
  pub attribute: Attribute,
  pub value: String,
  pub confidence: f32,
  pub detector: DetectorType,
  pub timestamp_ms: i64,
}

impl Observation {
  /// 置信度更高者胜出，置信度相同时取较新的观测
  pub fn supersedes(&self, other: &Observation) -> bool {
    self.confidence > other.confidence
      || (self.confidence == other.confidence && self.timestamp_ms >= other.timestamp_ms)
  }
}

/// 已转换到直立空间、通过几何校验的检测
#[derive(Debug, Clone)]
pub(crate) struct UprightDetection {
  pub detector: DetectorType,
  pub bbox: NormalizedRect,
  /// 产生该检测的画面相对直立方向的旋转
  pub rotation: Rotation,
  pub observation: Observation,
}

#[derive(Debug, Clone)]
pub struct Track {
  id: u64,
  detector: DetectorType,
  state: TrackState,
  bbox: NormalizedRect,
  rotation: Rotation,
  history: VecDeque<NormalizedRect>,
  history_len: usize,
  stability: f32,
  consecutive_hits: u32,
  total_hits: u32,
  missed_frames: u32,
  first_seen_ms: i64,
  last_seen_ms: i64,
  last_updated_ms: i64,
  last_confidence: f32,
  evidence: BTreeMap<Attribute, Observation>,
}

impl Track {
  pub(crate) fn spawn(id: u64, detection: &UprightDetection, now_ms: i64, history_len: usize) -> Self {
    let mut history = VecDeque::with_capacity(history_len);
    history.push_back(detection.bbox);
    let mut evidence = BTreeMap::new();
    evidence.insert(
      detection.observation.attribute,
      detection.observation.clone(),
    );

    Self {
      id,
      detector: detection.detector,
      state: TrackState::New,
      bbox: detection.bbox,
      rotation: detection.rotation,
      history,
      history_len,
      stability: 0.0,
      consecutive_hits: 0,
      total_hits: 1,
      missed_frames: 0,
      first_seen_ms: now_ms,
      last_seen_ms: now_ms,
      last_updated_ms: now_ms,
      last_confidence: detection.observation.confidence,
      evidence,
    }
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn detector(&self) -> DetectorType {
    self.detector
  }

  pub fn state(&self) -> TrackState {
    self.state
  }

  /// 最近一次匹配的框
  pub fn bbox(&self) -> NormalizedRect {
    self.bbox
  }

  /// 最近一次匹配的检测所在画面的旋转
  pub fn rotation(&self) -> Rotation {
    self.rotation
  }

  /// 历史框的平均，用于输出平滑后的位置
  pub fn smoothed_bbox(&self) -> NormalizedRect {
    NormalizedRect::mean(&self.history).unwrap_or(self.bbox)
  }

  pub fn history(&self) -> impl Iterator<Item = &NormalizedRect> {
    self.history.iter()
  }

  pub fn stability(&self) -> f32 {
    self.stability
  }

  pub fn consecutive_hits(&self) -> u32 {
    self.consecutive_hits
  }

  pub fn total_hits(&self) -> u32 {
    self.total_hits
  }

  pub fn missed_frames(&self) -> u32 {
    self.missed_frames
  }

  pub fn first_seen_ms(&self) -> i64 {
    self.first_seen_ms
  }

  pub fn last_seen_ms(&self) -> i64 {
    self.last_seen_ms
  }

  pub fn last_updated_ms(&self) -> i64 {
    self.last_updated_ms
  }

  pub fn last_confidence(&self) -> f32 {
    self.last_confidence
  }

  pub fn evidence(&self) -> impl Iterator<Item = &Observation> {
    self.evidence.values()
  }

  pub fn best(&self, attribute: Attribute) -> Option<&Observation> {
    self.evidence.get(&attribute)
  }

  pub fn is_confirmed(&self) -> bool {
    self.state == TrackState::Confirmed
  }

  pub(crate) fn apply_match(
    &mut self,
    detection: &UprightDetection,
    iou: f32,
    now_ms: i64,
    config: &TrackerConfig,
    events: &mut Vec<TrackEvent>,
  ) {
    self.bbox = detection.bbox;
    self.rotation = detection.rotation;
    self.history.push_back(detection.bbox);
    while self.history.len() > self.history_len {
      self.history.pop_front();
    }

    self.stability = STABILITY_ALPHA * iou + (1.0 - STABILITY_ALPHA) * self.stability;
    self.missed_frames = 0;
    self.consecutive_hits += 1;
    self.total_hits += 1;
    self.last_seen_ms = now_ms;
    self.last_updated_ms = now_ms;
    self.last_confidence = detection.observation.confidence;

    let observation = &detection.observation;
    let replace = self
      .evidence
      .get(&observation.attribute)
      .is_none_or(|best| observation.supersedes(best));
    if replace {
      self
        .evidence
        .insert(observation.attribute, observation.clone());
    }

    match self.state {
      TrackState::New => self.state = TrackState::Tracked,
      TrackState::Lost => {
        self.state = TrackState::Tracked;
        events.push(TrackEvent::Recovered { id: self.id });
      }
      _ => {}
    }

    if self.state == TrackState::Tracked
      && self.consecutive_hits >= config.confirm_hits
      && self.stability >= config.min_confirm_stability
    {
      self.state = TrackState::Confirmed;
      events.push(TrackEvent::Confirmed { id: self.id });
    }
  }

  pub(crate) fn apply_miss(&mut self, now_ms: i64, config: &TrackerConfig, events: &mut Vec<TrackEvent>) {
    self.missed_frames += 1;
    self.consecutive_hits = 0;
    self.last_updated_ms = now_ms;

    if self.state != TrackState::Lost && self.missed_frames >= config.max_missed_frames {
      self.state = TrackState::Lost;
      events.push(TrackEvent::Lost { id: self.id });
    }
  }

  /// LOST 轨迹缺席超时后进入 EXPIRED
  pub(crate) fn expire_if_absent(&mut self, now_ms: i64, config: &TrackerConfig) -> bool {
    if self.state == TrackState::Lost
      && now_ms.saturating_sub(self.last_seen_ms) > config.lost_timeout_ms
    {
      self.state = TrackState::Expired;
      return true;
    }
    false
  }
}
