// 该文件是 Saomiao （扫描） 项目的一部分。
// src/tracker/matching.rs - 检测与轨迹的贪心关联
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

use super::track::{Track, UprightDetection};

/// 一次关联结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Assignment {
  pub track: usize,
  pub detection: usize,
  pub iou: f32,
}

/// 贪心匹配：按 IoU 从高到低依次分配，每个轨迹、每个检测最多使用一次
///
/// 只有检测器类型相同、检测时间不早于轨迹最后更新时间、
/// 且 IoU 不低于 `min_iou` 的组合才会进入候选。
pub(crate) fn greedy_assign(
  tracks: &[Track],
  detections: &[UprightDetection],
  min_iou: f32,
) -> Vec<Assignment> {
  if tracks.is_empty() || detections.is_empty() {
    return Vec::new();
  }

  let mut candidates = Vec::new();
  for (ti, track) in tracks.iter().enumerate() {
    for (di, det) in detections.iter().enumerate() {
      if det.detector != track.detector()
        || det.observation.timestamp_ms < track.last_updated_ms()
      {
        continue;
      }
      let iou = track.bbox().iou(&det.bbox);
      if iou >= min_iou {
        candidates.push(Assignment {
          track: ti,
          detection: di,
          iou,
        });
      }
    }
  }

  candidates.sort_by(|a, b| {
    b.iou
      .total_cmp(&a.iou)
      .then_with(|| tracks[a.track].id().cmp(&tracks[b.track].id()))
      .then_with(|| a.detection.cmp(&b.detection))
  });

  let mut used_track = vec![false; tracks.len()];
  let mut used_det = vec![false; detections.len()];
  let mut assignments = Vec::new();
  for candidate in candidates {
    if used_track[candidate.track] || used_det[candidate.detection] {
      continue;
    }
    used_track[candidate.track] = true;
    used_det[candidate.detection] = true;
    assignments.push(candidate);
  }

  assignments
}
