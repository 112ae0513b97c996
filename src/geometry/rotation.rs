// 该文件是 Saomiao （扫描） 项目的一部分。
// src/geometry/rotation.rs - 传感器旋转角度
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

use std::ops::Sub;

use serde::Serialize;

use super::GeometryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Rotation {
  Deg0,
  Deg90,
  Deg180,
  Deg270,
}

impl Rotation {
  pub fn degrees(self) -> i32 {
    match self {
      Rotation::Deg0 => 0,
      Rotation::Deg90 => 90,
      Rotation::Deg180 => 180,
      Rotation::Deg270 => 270,
    }
  }

  pub fn inverse(self) -> Self {
    match self {
      Rotation::Deg0 => Rotation::Deg0,
      Rotation::Deg90 => Rotation::Deg270,
      Rotation::Deg180 => Rotation::Deg180,
      Rotation::Deg270 => Rotation::Deg90,
    }
  }

  /// 90° 与 270° 会交换宽高
  pub fn swaps_axes(self) -> bool {
    matches!(self, Rotation::Deg90 | Rotation::Deg270)
  }

  /// 按直立空间尺寸 (width, height) 计算传感器空间的边
  ///
  /// `w`、`h` 为源空间的宽和高；返回目标空间中的 (left, top, right, bottom)。
  pub(crate) fn map_edges<T>(self, edges: (T, T, T, T), w: T, h: T) -> (T, T, T, T)
  where
    T: Copy + Sub<Output = T>,
  {
    let (l, t, r, b) = edges;
    match self {
      Rotation::Deg0 => (l, t, r, b),
      Rotation::Deg90 => (t, w - r, b, w - l),
      Rotation::Deg180 => (w - r, h - b, w - l, h - t),
      Rotation::Deg270 => (h - b, l, h - t, r),
    }
  }
}

impl TryFrom<i32> for Rotation {
  type Error = GeometryError;

  fn try_from(degrees: i32) -> Result<Self, Self::Error> {
    match degrees.rem_euclid(360) {
      0 => Ok(Rotation::Deg0),
      90 => Ok(Rotation::Deg90),
      180 => Ok(Rotation::Deg180),
      270 => Ok(Rotation::Deg270),
      _ => Err(GeometryError::UnsupportedRotation(degrees)),
    }
  }
}
