// 该文件是 Saomiao （扫描） 项目的一部分。
// src/geometry.rs - 传感器空间与直立空间之间的坐标变换
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

//! 所有函数都是纯函数，输入输出均为值类型。
//!
//! 跟踪与裁剪统一在“直立空间”中进行，匹配逻辑因此无需关心设备旋转。

use serde::Serialize;
use thiserror::Error;

mod rect;
mod rotation;

pub use self::rect::{NormalizedRect, PixelRect};
pub use self::rotation::Rotation;

/// 裁剪前后宽高比允许的误差
pub const DEFAULT_ASPECT_TOLERANCE: f32 = 0.02;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
  #[error("无效的矩形: ({left}, {top}, {right}, {bottom})")]
  InvalidRect {
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
  },
  #[error("矩形高度为零，无法计算宽高比")]
  ZeroHeight,
  #[error("不支持的旋转角度: {0}")]
  UnsupportedRotation(i32),
}

/// 宽高比 (right - left) / (bottom - top)
pub fn aspect_ratio(rect: &NormalizedRect) -> Result<f32, GeometryError> {
  if rect.height() == 0.0 {
    return Err(GeometryError::ZeroHeight);
  }
  Ok(rect.width() / rect.height())
}

pub fn validate_aspect_ratio(a: f32, b: f32, tolerance: f32) -> bool {
  (a - b).abs() <= tolerance
}

/// 直立空间像素矩形 → 传感器空间像素矩形
pub fn upright_to_sensor(
  bbox: PixelRect,
  upright_width: i32,
  upright_height: i32,
  rotation: Rotation,
) -> PixelRect {
  let (left, top, right, bottom) = rotation.map_edges(
    (bbox.left, bbox.top, bbox.right, bbox.bottom),
    upright_width,
    upright_height,
  );
  PixelRect::new(left, top, right, bottom)
}

/// 传感器空间像素矩形 → 直立空间像素矩形
///
/// `sensor_width`、`sensor_height` 为传感器缓冲区尺寸；对 90°/270° 而言即为
/// 直立尺寸交换宽高之后的值。
pub fn sensor_to_upright(
  rect: PixelRect,
  sensor_width: i32,
  sensor_height: i32,
  rotation: Rotation,
) -> PixelRect {
  upright_to_sensor(rect, sensor_width, sensor_height, rotation.inverse())
}

pub fn upright_to_sensor_normalized(
  bbox: &NormalizedRect,
  rotation: Rotation,
) -> Result<NormalizedRect, GeometryError> {
  let (l, t, r, b) = rotation.map_edges(
    (bbox.left(), bbox.top(), bbox.right(), bbox.bottom()),
    1.0,
    1.0,
  );
  NormalizedRect::new(l, t, r, b)
}

pub fn sensor_to_upright_normalized(
  rect: &NormalizedRect,
  rotation: Rotation,
) -> Result<NormalizedRect, GeometryError> {
  upright_to_sensor_normalized(rect, rotation.inverse())
}

/// 将归一化框映射到位图像素空间，四周按框自身宽高的 `padding` 比例外扩，
/// 然后截断到 [0, width] × [0, height]。
pub fn upright_to_bitmap_crop(
  bbox: &NormalizedRect,
  bitmap_width: u32,
  bitmap_height: u32,
  padding: f32,
) -> PixelRect {
  let (bw, bh) = (bitmap_width as f64, bitmap_height as f64);
  let padding = padding.max(0.0) as f64;

  let left = bbox.left() as f64 * bw;
  let top = bbox.top() as f64 * bh;
  let right = bbox.right() as f64 * bw;
  let bottom = bbox.bottom() as f64 * bh;

  let pad_x = (right - left) * padding;
  let pad_y = (bottom - top) * padding;

  PixelRect::new(
    (left - pad_x).round().clamp(0.0, bw) as i32,
    (top - pad_y).round().clamp(0.0, bh) as i32,
    (right + pad_x).round().clamp(0.0, bw) as i32,
    (bottom + pad_y).round().clamp(0.0, bh) as i32,
  )
}

/// 坐标对应关系的诊断记录，仅用于日志
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationDebugInfo {
  pub rotation_degrees: i32,
  pub sensor_width: u32,
  pub sensor_height: u32,
  pub upright_width: u32,
  pub upright_height: u32,
  pub bitmap_width: u32,
  pub bitmap_height: u32,
  pub bbox_pixels: PixelRect,
  pub crop_pixels: PixelRect,
  pub bbox_aspect_ratio: Option<f32>,
  pub crop_aspect_ratio: Option<f32>,
  pub aspect_ratio_match: bool,
  pub clamped: bool,
}

pub fn generate_correlation_debug_info(
  bbox: &NormalizedRect,
  rotation: Rotation,
  sensor_width: u32,
  sensor_height: u32,
  bitmap_width: u32,
  bitmap_height: u32,
  padding: f32,
) -> CorrelationDebugInfo {
  let (upright_width, upright_height) = if rotation.swaps_axes() {
    (sensor_height, sensor_width)
  } else {
    (sensor_width, sensor_height)
  };

  let bbox_pixels = upright_to_bitmap_crop(bbox, bitmap_width, bitmap_height, 0.0);
  let crop_pixels = upright_to_bitmap_crop(bbox, bitmap_width, bitmap_height, padding);
  let bbox_aspect_ratio = bbox_pixels.aspect_ratio().ok();
  let crop_aspect_ratio = crop_pixels.aspect_ratio().ok();
  let aspect_ratio_match = match (bbox_aspect_ratio, crop_aspect_ratio) {
    (Some(a), Some(b)) => validate_aspect_ratio(a, b, DEFAULT_ASPECT_TOLERANCE),
    _ => false,
  };
  let clamped = crop_pixels.left == 0
    || crop_pixels.top == 0
    || crop_pixels.right == bitmap_width as i32
    || crop_pixels.bottom == bitmap_height as i32;

  CorrelationDebugInfo {
    rotation_degrees: rotation.degrees(),
    sensor_width,
    sensor_height,
    upright_width,
    upright_height,
    bitmap_width,
    bitmap_height,
    bbox_pixels,
    crop_pixels,
    bbox_aspect_ratio,
    crop_aspect_ratio,
    aspect_ratio_match,
    clamped,
  }
}
