// 该文件是 Saomiao （扫描） 项目的一部分。
// tests/common/scene.rs - 合成检测场景
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

use saomiao::detection::{Frame, RawDetection};

pub const FRAME_PERIOD_MS: i64 = 33;

/// 以固定帧间隔重复同一组检测，检测框每帧向右平移 `drift`
pub fn steady_frames(template: &[RawDetection], count: usize, start_ms: i64, drift: f32) -> Vec<Frame> {
  (0..count)
    .map(|i| {
      let ts = start_ms + i as i64 * FRAME_PERIOD_MS;
      let shift = drift * i as f32;
      let detections = template
        .iter()
        .cloned()
        .map(|mut d| {
          d.timestamp_ms = ts;
          d.bbox[0] += shift;
          d.bbox[2] += shift;
          d
        })
        .collect();
      Frame::new(ts).with_detections(detections)
    })
    .collect()
}

/// 所有检测器都运行但没有任何输出的帧
pub fn empty_frames(count: usize, start_ms: i64) -> Vec<Frame> {
  (0..count)
    .map(|i| {
      let ts = start_ms + i as i64 * FRAME_PERIOD_MS;
      Frame::new(ts).with_invoked(saomiao::detection::DetectorSet::all())
    })
    .collect()
}

/// 一行回放日志
pub fn replay_line(frame: &Frame) -> String {
  serde_json::to_string(frame).unwrap()
}
