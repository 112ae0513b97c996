// 该文件是 Saomiao （扫描） 项目的一部分。
// src/thumbnail.rs - 物品缩略图缓存
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

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use image::{RgbImage, imageops};
use tracing::trace;

use crate::geometry::{self, NormalizedRect, PixelRect};

/// 从直立画面中裁剪物品区域，裁剪区域为空时返回 None
pub fn crop_thumbnail(image: &RgbImage, bbox: &NormalizedRect, padding: f32) -> Option<(PixelRect, RgbImage)> {
  let crop = geometry::upright_to_bitmap_crop(bbox, image.width(), image.height(), padding);
  if crop.width() <= 0 || crop.height() <= 0 {
    return None;
  }
  let view = imageops::crop_imm(
    image,
    crop.left as u32,
    crop.top as u32,
    crop.width() as u32,
    crop.height() as u32,
  );
  Some((crop, view.to_image()))
}

/// 按物品 id 存放缩略图的有界 LRU 缓存，由会话持有
#[derive(Debug)]
pub struct ThumbnailCache {
  capacity: usize,
  entries: HashMap<u64, Arc<RgbImage>>,
  // 队首为最久未使用
  order: VecDeque<u64>,
}

impl ThumbnailCache {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      entries: HashMap::with_capacity(capacity),
      order: VecDeque::with_capacity(capacity),
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  fn touch(&mut self, id: u64) {
    if let Some(pos) = self.order.iter().position(|&k| k == id) {
      self.order.remove(pos);
    }
    self.order.push_back(id);
  }

  pub fn insert(&mut self, id: u64, image: RgbImage) {
    if self.capacity == 0 {
      return;
    }
    self.entries.insert(id, Arc::new(image));
    self.touch(id);
    while self.entries.len() > self.capacity {
      let Some(evicted) = self.order.pop_front() else {
        break;
      };
      self.entries.remove(&evicted);
      trace!("缩略图缓存淘汰物品 {}", evicted);
    }
  }

  pub fn get(&mut self, id: u64) -> Option<Arc<RgbImage>> {
    let image = self.entries.get(&id).cloned()?;
    self.touch(id);
    Some(image)
  }

  /// 查看缓存内容但不更新使用顺序
  pub fn peek(&self, id: u64) -> Option<&Arc<RgbImage>> {
    self.entries.get(&id)
  }

  pub fn contains(&self, id: u64) -> bool {
    self.entries.contains_key(&id)
  }

  pub fn remove(&mut self, id: u64) -> Option<Arc<RgbImage>> {
    let image = self.entries.remove(&id)?;
    self.order.retain(|&k| k != id);
    Some(image)
  }

  /// 物品改挂到新 id 后迁移其缩略图；新 id 已有缩略图时保留新的
  pub fn rekey(&mut self, from: u64, to: u64) {
    let Some(image) = self.remove(from) else {
      return;
    };
    if !self.entries.contains_key(&to) {
      self.entries.insert(to, image);
      self.touch(to);
    }
  }

  pub fn clear(&mut self) {
    self.entries.clear();
    self.order.clear();
  }
}
