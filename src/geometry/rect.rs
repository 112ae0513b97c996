// 该文件是 Saomiao （扫描） 项目的一部分。
// src/geometry/rect.rs - 归一化矩形与像素矩形
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

use serde::{Deserialize, Serialize};

use super::GeometryError;

/// 归一化坐标矩形，四条边都位于 [0, 1]
///
/// 只能通过 [`NormalizedRect::new`] 构造，越界或反向的边直接拒绝，不做截断。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedRect {
  left: f32,
  top: f32,
  right: f32,
  bottom: f32,
}

impl NormalizedRect {
  pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Result<Self, GeometryError> {
    let edges = [left, top, right, bottom];
    let in_range = edges
      .iter()
      .all(|v| v.is_finite() && (0.0..=1.0).contains(v));
    if !in_range || left > right || top > bottom {
      return Err(GeometryError::InvalidRect {
        left,
        top,
        right,
        bottom,
      });
    }
    Ok(Self {
      left,
      top,
      right,
      bottom,
    })
  }

  pub fn from_array(bbox: [f32; 4]) -> Result<Self, GeometryError> {
    Self::new(bbox[0], bbox[1], bbox[2], bbox[3])
  }

  pub fn left(&self) -> f32 {
    self.left
  }

  pub fn top(&self) -> f32 {
    self.top
  }

  pub fn right(&self) -> f32 {
    self.right
  }

  pub fn bottom(&self) -> f32 {
    self.bottom
  }

  pub fn width(&self) -> f32 {
    self.right - self.left
  }

  pub fn height(&self) -> f32 {
    self.bottom - self.top
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  pub fn has_area(&self) -> bool {
    self.width() > 0.0 && self.height() > 0.0
  }

  pub fn center(&self) -> (f32, f32) {
    (
      (self.left + self.right) / 2.0,
      (self.top + self.bottom) / 2.0,
    )
  }

  pub fn to_array(&self) -> [f32; 4] {
    [self.left, self.top, self.right, self.bottom]
  }

  /// 交并比 (Intersection over Union)
  pub fn iou(&self, other: &NormalizedRect) -> f32 {
    let x1 = self.left.max(other.left);
    let y1 = self.top.max(other.top);
    let x2 = self.right.min(other.right);
    let y2 = self.bottom.min(other.bottom);

    if x2 <= x1 || y2 <= y1 {
      return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = self.area() + other.area() - intersection;
    if union <= 0.0 {
      return 0.0;
    }

    intersection / union
  }

  /// 多个矩形的逐边平均，输入为空时返回 None
  pub fn mean<'a>(rects: impl IntoIterator<Item = &'a NormalizedRect>) -> Option<NormalizedRect> {
    let mut sum = [0.0f64; 4];
    let mut count = 0usize;
    for rect in rects {
      for (acc, v) in sum.iter_mut().zip(rect.to_array()) {
        *acc += v as f64;
      }
      count += 1;
    }
    if count == 0 {
      return None;
    }
    let [l, t, r, b] = sum.map(|v| (v / count as f64) as f32);
    // 平均值不会越界，此处仅防止浮点误差
    NormalizedRect::new(
      l.clamp(0.0, 1.0),
      t.clamp(0.0, 1.0),
      r.clamp(l.clamp(0.0, 1.0), 1.0),
      b.clamp(t.clamp(0.0, 1.0), 1.0),
    )
    .ok()
  }
}

impl<'de> Deserialize<'de> for NormalizedRect {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let edges = <[f32; 4]>::deserialize(deserializer)?;
    NormalizedRect::from_array(edges).map_err(serde::de::Error::custom)
  }
}

/// 整数像素矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
  pub left: i32,
  pub top: i32,
  pub right: i32,
  pub bottom: i32,
}

impl PixelRect {
  pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
    Self {
      left,
      top,
      right,
      bottom,
    }
  }

  pub fn width(&self) -> i32 {
    self.right - self.left
  }

  pub fn height(&self) -> i32 {
    self.bottom - self.top
  }

  pub fn area(&self) -> i64 {
    self.width() as i64 * self.height() as i64
  }

  pub fn is_valid(&self) -> bool {
    self.left <= self.right && self.top <= self.bottom
  }

  pub fn aspect_ratio(&self) -> Result<f32, GeometryError> {
    if self.height() == 0 {
      return Err(GeometryError::ZeroHeight);
    }
    Ok(self.width() as f32 / self.height() as f32)
  }
}
