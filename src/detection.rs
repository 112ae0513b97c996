// 该文件是 Saomiao （扫描） 项目的一部分。
// src/detection.rs - 检测结果与帧定义
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

use std::fmt;

use serde::{Deserialize, Serialize};

/// 检测器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorType {
  Object,
  Barcode,
  Document,
}

impl DetectorType {
  pub const ALL: [DetectorType; 3] = [
    DetectorType::Object,
    DetectorType::Barcode,
    DetectorType::Document,
  ];

  pub(crate) fn index(self) -> usize {
    match self {
      DetectorType::Object => 0,
      DetectorType::Barcode => 1,
      DetectorType::Document => 2,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      DetectorType::Object => "object",
      DetectorType::Barcode => "barcode",
      DetectorType::Document => "document",
    }
  }
}

impl fmt::Display for DetectorType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 检测器类型集合（位集）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DetectorSet(u8);

impl DetectorSet {
  pub const fn empty() -> Self {
    DetectorSet(0)
  }

  pub const fn all() -> Self {
    DetectorSet(0b111)
  }

  pub fn with(mut self, kind: DetectorType) -> Self {
    self.insert(kind);
    self
  }

  pub fn insert(&mut self, kind: DetectorType) {
    self.0 |= 1 << kind.index();
  }

  pub fn contains(&self, kind: DetectorType) -> bool {
    self.0 & (1 << kind.index()) != 0
  }

  pub fn is_empty(&self) -> bool {
    self.0 == 0
  }

  pub fn iter(&self) -> impl Iterator<Item = DetectorType> + '_ {
    DetectorType::ALL.into_iter().filter(|k| self.contains(*k))
  }
}

impl FromIterator<DetectorType> for DetectorSet {
  fn from_iter<I: IntoIterator<Item = DetectorType>>(iter: I) -> Self {
    let mut set = DetectorSet::empty();
    for kind in iter {
      set.insert(kind);
    }
    set
  }
}

impl Serialize for DetectorSet {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(self.iter())
  }
}

impl<'de> Deserialize<'de> for DetectorSet {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let kinds = Vec::<DetectorType>::deserialize(deserializer)?;
    Ok(kinds.into_iter().collect())
  }
}

/// 证据属性：每个属性在合并时独立保留置信度最高的观测
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
  Label,
  Barcode,
  OcrText,
  Thumbnail,
}

/// 不同检测器的输出载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DetectionPayload {
  Object {
    label: String,
  },
  Barcode {
    value: String,
    #[serde(default)]
    format: Option<String>,
  },
  Document {
    text: String,
  },
}

impl DetectionPayload {
  pub fn detector_type(&self) -> DetectorType {
    match self {
      DetectionPayload::Object { .. } => DetectorType::Object,
      DetectionPayload::Barcode { .. } => DetectorType::Barcode,
      DetectionPayload::Document { .. } => DetectorType::Document,
    }
  }

  pub fn attribute(&self) -> Attribute {
    match self {
      DetectionPayload::Object { .. } => Attribute::Label,
      DetectionPayload::Barcode { .. } => Attribute::Barcode,
      DetectionPayload::Document { .. } => Attribute::OcrText,
    }
  }

  pub fn value(&self) -> &str {
    match self {
      DetectionPayload::Object { label } => label,
      DetectionPayload::Barcode { value, .. } => value,
      DetectionPayload::Document { text } => text,
    }
  }
}

/// 单个检测器在单帧上的一条输出，坐标位于传感器归一化空间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
  pub payload: DetectionPayload,
  pub bbox: [f32; 4], // [left, top, right, bottom]
  pub confidence: f32,
  pub timestamp_ms: i64,
  #[serde(default)]
  pub rotation_degrees: i32,
}

impl RawDetection {
  pub fn new(payload: DetectionPayload, bbox: [f32; 4], confidence: f32, timestamp_ms: i64) -> Self {
    Self {
      payload,
      bbox,
      confidence,
      timestamp_ms,
      rotation_degrees: 0,
    }
  }

  pub fn object(label: impl Into<String>, bbox: [f32; 4], confidence: f32, timestamp_ms: i64) -> Self {
    Self::new(
      DetectionPayload::Object {
        label: label.into(),
      },
      bbox,
      confidence,
      timestamp_ms,
    )
  }

  pub fn barcode(value: impl Into<String>, bbox: [f32; 4], confidence: f32, timestamp_ms: i64) -> Self {
    Self::new(
      DetectionPayload::Barcode {
        value: value.into(),
        format: None,
      },
      bbox,
      confidence,
      timestamp_ms,
    )
  }

  pub fn document(text: impl Into<String>, bbox: [f32; 4], confidence: f32, timestamp_ms: i64) -> Self {
    Self::new(
      DetectionPayload::Document { text: text.into() },
      bbox,
      confidence,
      timestamp_ms,
    )
  }

  pub fn with_rotation(mut self, rotation_degrees: i32) -> Self {
    self.rotation_degrees = rotation_degrees;
    self
  }

  pub fn detector_type(&self) -> DetectorType {
    self.payload.detector_type()
  }
}

/// 送入跟踪周期的一帧：本帧实际运行过的检测器以及它们的输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
  pub timestamp_ms: i64,
  /// 本帧被放行并实际运行的检测器；未运行的检测器沿用上一次结果
  ///
  /// 缺省（`None`）表示所有检测器都已运行，没有检测结果的轨迹照常计为丢失。
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub invoked: Option<DetectorSet>,
  #[serde(default)]
  pub detections: Vec<RawDetection>,
  /// 已校正为直立方向的相机画面，用于裁剪缩略图
  #[cfg(feature = "thumbnail")]
  #[serde(skip)]
  pub image: Option<std::sync::Arc<image::RgbImage>>,
}

impl Frame {
  pub fn new(timestamp_ms: i64) -> Self {
    Self {
      timestamp_ms,
      invoked: None,
      detections: Vec::new(),
      #[cfg(feature = "thumbnail")]
      image: None,
    }
  }

  pub fn with_invoked(mut self, invoked: DetectorSet) -> Self {
    self.invoked = Some(invoked);
    self
  }

  /// 添加检测结果；若已显式指定运行过的检测器，对应检测器会被补入
  pub fn with_detections(mut self, detections: Vec<RawDetection>) -> Self {
    if let Some(invoked) = self.invoked.as_mut() {
      for det in &detections {
        invoked.insert(det.detector_type());
      }
    }
    self.detections = detections;
    self
  }

  /// 本帧实际运行过的检测器
  pub fn detectors_run(&self) -> DetectorSet {
    self.invoked.unwrap_or(DetectorSet::all())
  }

  #[cfg(feature = "thumbnail")]
  pub fn with_image(mut self, image: std::sync::Arc<image::RgbImage>) -> Self {
    self.image = Some(image);
    self
  }
}
