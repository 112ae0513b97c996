// 该文件是 Saomiao （扫描） 项目的一部分。
// src/tracker.rs - 多目标跟踪器
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

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::TrackerConfig;
use crate::detection::{DetectorSet, RawDetection};
use crate::geometry::{self, GeometryError, NormalizedRect, Rotation};

mod matching;
mod track;

pub use self::track::{Observation, Track, TrackEvent, TrackState};
use self::track::UprightDetection;

/// 跟踪器诊断计数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
  pub frames: u64,
  pub stale_frames: u64,
  pub stale_detections: u64,
  pub invalid_geometry: u64,
  pub spawned: u64,
  pub confirmed: u64,
  pub lost: u64,
  pub recovered: u64,
  pub expired: u64,
}

impl Diagnostics {
  fn count(&mut self, event: &TrackEvent) {
    match event {
      TrackEvent::Spawned { .. } => self.spawned += 1,
      TrackEvent::Confirmed { .. } => self.confirmed += 1,
      TrackEvent::Lost { .. } => self.lost += 1,
      TrackEvent::Recovered { .. } => self.recovered += 1,
      TrackEvent::Expired { .. } => self.expired += 1,
    }
  }
}

/// 单帧处理结果
#[derive(Debug, Default)]
pub struct TrackerUpdate {
  pub events: Vec<TrackEvent>,
  /// 本帧匹配成功的轨迹 id
  pub matched: Vec<u64>,
  /// 本帧过期并移出活跃集合的轨迹
  pub expired: Vec<Track>,
}

/// 传感器空间检测 → 直立空间检测
fn to_upright(detection: &RawDetection) -> Result<UprightDetection, GeometryError> {
  let rotation = Rotation::try_from(detection.rotation_degrees)?;
  let sensor = NormalizedRect::from_array(detection.bbox)?;
  let bbox = geometry::sensor_to_upright_normalized(&sensor, rotation)?;
  if !bbox.has_area() {
    return Err(GeometryError::InvalidRect {
      left: bbox.left(),
      top: bbox.top(),
      right: bbox.right(),
      bottom: bbox.bottom(),
    });
  }

  Ok(UprightDetection {
    detector: detection.detector_type(),
    bbox,
    rotation,
    observation: Observation {
      attribute: detection.payload.attribute(),
      value: detection.payload.value().to_string(),
      confidence: detection.confidence,
      detector: detection.detector_type(),
      timestamp_ms: detection.timestamp_ms,
    },
  })
}

#[derive(Debug)]
pub struct ObjectTracker {
  config: TrackerConfig,
  tracks: Vec<Track>,
  next_id: u64,
  last_frame_ms: Option<i64>,
  diagnostics: Diagnostics,
}

impl ObjectTracker {
  pub fn new(config: TrackerConfig) -> Self {
    Self {
      config,
      tracks: Vec::new(),
      next_id: 1,
      last_frame_ms: None,
      diagnostics: Diagnostics::default(),
    }
  }

  pub fn config(&self) -> &TrackerConfig {
    &self.config
  }

  pub fn diagnostics(&self) -> &Diagnostics {
    &self.diagnostics
  }

  pub fn tracks(&self) -> &[Track] {
    &self.tracks
  }

  pub fn track(&self, id: u64) -> Option<&Track> {
    self.tracks.iter().find(|t| t.id() == id)
  }

  pub fn confirmed_tracks(&self) -> impl Iterator<Item = &Track> {
    self.tracks.iter().filter(|t| t.is_confirmed())
  }

  pub fn track_count(&self) -> usize {
    self.tracks.len()
  }

  /// 清空所有轨迹与计数，id 从 1 重新分配
  pub fn reset(&mut self) {
    debug!("重置跟踪器，丢弃 {} 条轨迹", self.tracks.len());
    self.tracks.clear();
    self.next_id = 1;
    self.last_frame_ms = None;
    self.diagnostics = Diagnostics::default();
  }

  /// 处理一帧检测结果
  ///
  /// `invoked` 为本帧实际运行过的检测器；未运行的检测器对应的轨迹本帧不计丢失。
  /// 几何无效或过期的检测会被丢弃并计数，不会中断本帧处理。
  pub fn process_frame(
    &mut self,
    timestamp_ms: i64,
    detections: &[RawDetection],
    invoked: DetectorSet,
  ) -> TrackerUpdate {
    let mut update = TrackerUpdate::default();

    let previous = self.last_frame_ms;
    if previous.is_some_and(|last| timestamp_ms < last) {
      warn!(
        "丢弃乱序帧: 时间戳 {} 早于上一帧 {:?}",
        timestamp_ms, previous
      );
      self.diagnostics.stale_frames += 1;
      return update;
    }
    self.last_frame_ms = Some(timestamp_ms);
    self.diagnostics.frames += 1;

    let mut invoked = invoked;
    let mut upright = Vec::with_capacity(detections.len());
    for detection in detections {
      invoked.insert(detection.detector_type());
      if previous.is_some_and(|last| detection.timestamp_ms < last) {
        trace!("丢弃过期检测: {:?}", detection);
        self.diagnostics.stale_detections += 1;
        continue;
      }
      match to_upright(detection) {
        Ok(det) => upright.push(det),
        Err(e) => {
          warn!("丢弃几何无效的检测 ({}): {}", detection.detector_type(), e);
          self.diagnostics.invalid_geometry += 1;
        }
      }
    }

    let assignments = matching::greedy_assign(&self.tracks, &upright, self.config.match_iou);
    let mut matched_track = vec![false; self.tracks.len()];
    let mut matched_det = vec![false; upright.len()];

    for assignment in &assignments {
      matched_track[assignment.track] = true;
      matched_det[assignment.detection] = true;
      let track = &mut self.tracks[assignment.track];
      track.apply_match(
        &upright[assignment.detection],
        assignment.iou,
        timestamp_ms,
        &self.config,
        &mut update.events,
      );
      update.matched.push(track.id());
    }

    for (track, matched) in self.tracks.iter_mut().zip(&matched_track) {
      if !matched && invoked.contains(track.detector()) {
        track.apply_miss(timestamp_ms, &self.config, &mut update.events);
      }
    }

    let config = &self.config;
    let mut expired = Vec::new();
    self.tracks.retain_mut(|track| {
      if track.expire_if_absent(timestamp_ms, config) {
        expired.push(track.clone());
        false
      } else {
        true
      }
    });
    for track in &expired {
      update.events.push(TrackEvent::Expired { id: track.id() });
    }
    update.expired = expired;

    for (det, matched) in upright.iter().zip(&matched_det) {
      if *matched {
        continue;
      }
      let id = self.next_id;
      self.next_id += 1;
      self
        .tracks
        .push(Track::spawn(id, det, timestamp_ms, self.config.history_len));
      update.events.push(TrackEvent::Spawned {
        id,
        detector: det.detector,
      });
    }

    for event in &update.events {
      self.diagnostics.count(event);
      match event {
        TrackEvent::Confirmed { id } => info!("轨迹 {} 已确认", id),
        TrackEvent::Spawned { id, detector } => debug!("新建轨迹 {} ({})", id, detector),
        TrackEvent::Lost { id } => debug!("轨迹 {} 丢失", id),
        TrackEvent::Recovered { id } => debug!("轨迹 {} 恢复跟踪", id),
        TrackEvent::Expired { id } => debug!("轨迹 {} 已过期", id),
      }
    }

    trace!(
      "帧 {}: {} 个检测, {} 个匹配, {} 条活跃轨迹",
      timestamp_ms,
      upright.len(),
      assignments.len(),
      self.tracks.len()
    );

    update
  }
}

impl Default for ObjectTracker {
  fn default() -> Self {
    Self::new(TrackerConfig::default())
  }
}
