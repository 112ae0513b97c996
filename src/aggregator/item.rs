// 该文件是 Saomiao （扫描） 项目的一部分。
// src/aggregator/item.rs - 聚合后的扫描物品
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

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::AggregatorConfig;
use crate::detection::{Attribute, DetectorType};
use crate::geometry::{NormalizedRect, PixelRect};
use crate::tracker::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
  Low,
  Medium,
  High,
}

impl ConfidenceTier {
  pub fn from_confidence(confidence: f32, config: &AggregatorConfig) -> Self {
    if confidence >= config.high_confidence {
      ConfidenceTier::High
    } else if confidence >= config.medium_confidence {
      ConfidenceTier::Medium
    } else {
      ConfidenceTier::Low
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EvidenceValue {
  Text(String),
  Crop(PixelRect),
}

/// 一条证据及其来源（检测器、轨迹、帧时间）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
  pub attribute: Attribute,
  pub value: EvidenceValue,
  pub confidence: f32,
  pub detector: DetectorType,
  pub source_track: u64,
  pub timestamp_ms: i64,
}

impl Evidence {
  pub(crate) fn from_observation(observation: &Observation, source_track: u64) -> Self {
    Self {
      attribute: observation.attribute,
      value: EvidenceValue::Text(observation.value.clone()),
      confidence: observation.confidence,
      detector: observation.detector,
      source_track,
      timestamp_ms: observation.timestamp_ms,
    }
  }

  pub fn text(&self) -> Option<&str> {
    match &self.value {
      EvidenceValue::Text(text) => Some(text),
      EvidenceValue::Crop(_) => None,
    }
  }

  pub fn supersedes(&self, other: &Evidence) -> bool {
    self.confidence > other.confidence
      || (self.confidence == other.confidence && self.timestamp_ms >= other.timestamp_ms)
  }
}

/// 对外可见的扫描物品快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedItem {
  pub id: u64,
  pub bbox: NormalizedRect,
  pub label: Option<String>,
  pub confidence: f32,
  pub tier: ConfidenceTier,
  pub barcode: Option<String>,
  pub ocr_text: Option<String>,
  pub evidence: Vec<Evidence>,
  pub source_tracks: BTreeSet<u64>,
  /// 曾以自身 id 发出、后被并入本物品的物品
  pub merged_items: BTreeSet<u64>,
  pub created_at_ms: i64,
  pub updated_at_ms: i64,
  pub finalized: bool,
}

impl AggregatedItem {
  pub(crate) fn new(id: u64, bbox: NormalizedRect, timestamp_ms: i64) -> Self {
    Self {
      id,
      bbox,
      label: None,
      confidence: 0.0,
      tier: ConfidenceTier::Low,
      barcode: None,
      ocr_text: None,
      evidence: Vec::new(),
      source_tracks: BTreeSet::new(),
      merged_items: BTreeSet::new(),
      created_at_ms: timestamp_ms,
      updated_at_ms: timestamp_ms,
      finalized: false,
    }
  }

  /// 某一属性在所有来源中最好的证据
  pub fn best(&self, attribute: Attribute) -> Option<&Evidence> {
    self
      .evidence
      .iter()
      .filter(|e| e.attribute == attribute)
      .fold(None, |best: Option<&Evidence>, e| match best {
        Some(b) if !e.supersedes(b) => Some(b),
        _ => Some(e),
      })
  }

  pub fn thumbnail(&self) -> Option<&Evidence> {
    self.best(Attribute::Thumbnail)
  }

  /// 合并一条证据：同一属性、同一来源轨迹只保留最好的一条。返回是否有变化。
  pub(crate) fn merge_evidence(&mut self, evidence: Evidence) -> bool {
    let existing = self
      .evidence
      .iter_mut()
      .find(|e| e.attribute == evidence.attribute && e.source_track == evidence.source_track);
    match existing {
      Some(current) if *current == evidence || !evidence.supersedes(current) => false,
      Some(current) => {
        *current = evidence;
        true
      }
      None => {
        self.evidence.push(evidence);
        true
      }
    }
  }

  /// 根据证据重新计算标签、条码、文本与置信度分级
  pub(crate) fn refresh(&mut self, config: &AggregatorConfig) {
    let text_of = |item: &Self, attribute| {
      item
        .best(attribute)
        .and_then(|e| e.text().map(str::to_string))
    };
    self.label = text_of(self, Attribute::Label);
    self.barcode = text_of(self, Attribute::Barcode);
    self.ocr_text = text_of(self, Attribute::OcrText);

    self.confidence = match self.best(Attribute::Label) {
      Some(label) => label.confidence,
      None => self
        .evidence
        .iter()
        .filter(|e| e.attribute != Attribute::Thumbnail)
        .map(|e| e.confidence)
        .fold(0.0, f32::max),
    };
    self.tier = ConfidenceTier::from_confidence(self.confidence, config);
  }
}
