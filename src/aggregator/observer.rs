// 该文件是 Saomiao （扫描） 项目的一部分。
// src/aggregator/observer.rs - 物品事件回调
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
use tracing::trace;

use super::AggregatedItem;

/// 物品快照的推送接口
pub trait ItemObserver {
  fn on_item_created(&mut self, item: &AggregatedItem);
  fn on_item_updated(&mut self, item: &AggregatedItem);
  fn on_item_finalized(&mut self, item: &AggregatedItem);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "item", rename_all = "lowercase")]
pub enum ItemEvent {
  Created(AggregatedItem),
  Updated(AggregatedItem),
  Finalized(AggregatedItem),
}

impl ItemEvent {
  pub fn item(&self) -> &AggregatedItem {
    match self {
      ItemEvent::Created(item) | ItemEvent::Updated(item) | ItemEvent::Finalized(item) => item,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      ItemEvent::Created(_) => "created",
      ItemEvent::Updated(_) => "updated",
      ItemEvent::Finalized(_) => "finalized",
    }
  }
}

impl ItemObserver for () {
  fn on_item_created(&mut self, _item: &AggregatedItem) {}
  fn on_item_updated(&mut self, _item: &AggregatedItem) {}
  fn on_item_finalized(&mut self, _item: &AggregatedItem) {}
}

impl ItemObserver for Vec<ItemEvent> {
  fn on_item_created(&mut self, item: &AggregatedItem) {
    self.push(ItemEvent::Created(item.clone()));
  }

  fn on_item_updated(&mut self, item: &AggregatedItem) {
    self.push(ItemEvent::Updated(item.clone()));
  }

  fn on_item_finalized(&mut self, item: &AggregatedItem) {
    self.push(ItemEvent::Finalized(item.clone()));
  }
}

impl ItemObserver for std::sync::mpsc::Sender<ItemEvent> {
  fn on_item_created(&mut self, item: &AggregatedItem) {
    if self.send(ItemEvent::Created(item.clone())).is_err() {
      trace!("物品事件接收端已关闭");
    }
  }

  fn on_item_updated(&mut self, item: &AggregatedItem) {
    if self.send(ItemEvent::Updated(item.clone())).is_err() {
      trace!("物品事件接收端已关闭");
    }
  }

  fn on_item_finalized(&mut self, item: &AggregatedItem) {
    if self.send(ItemEvent::Finalized(item.clone())).is_err() {
      trace!("物品事件接收端已关闭");
    }
  }
}

impl ItemObserver for crossbeam_channel::Sender<ItemEvent> {
  fn on_item_created(&mut self, item: &AggregatedItem) {
    if self.send(ItemEvent::Created(item.clone())).is_err() {
      trace!("物品事件接收端已关闭");
    }
  }

  fn on_item_updated(&mut self, item: &AggregatedItem) {
    if self.send(ItemEvent::Updated(item.clone())).is_err() {
      trace!("物品事件接收端已关闭");
    }
  }

  fn on_item_finalized(&mut self, item: &AggregatedItem) {
    if self.send(ItemEvent::Finalized(item.clone())).is_err() {
      trace!("物品事件接收端已关闭");
    }
  }
}

impl<O: ItemObserver + ?Sized> ItemObserver for &mut O {
  fn on_item_created(&mut self, item: &AggregatedItem) {
    (**self).on_item_created(item)
  }

  fn on_item_updated(&mut self, item: &AggregatedItem) {
    (**self).on_item_updated(item)
  }

  fn on_item_finalized(&mut self, item: &AggregatedItem) {
    (**self).on_item_finalized(item)
  }
}

impl<O: ItemObserver + ?Sized> ItemObserver for Box<O> {
  fn on_item_created(&mut self, item: &AggregatedItem) {
    (**self).on_item_created(item)
  }

  fn on_item_updated(&mut self, item: &AggregatedItem) {
    (**self).on_item_updated(item)
  }

  fn on_item_finalized(&mut self, item: &AggregatedItem) {
    (**self).on_item_finalized(item)
  }
}
