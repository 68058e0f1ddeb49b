//! 运行期接线池：动态建立与拆除 `(源, 汇)` 边的固定容量登记表。
//!
//! # 教案式说明
//! - **Why**：静态接线在定义期完成、零成本；运行期接线则要在不可预期的时刻
//!   增删边，必须有容量上界来约束小内存环境的峰值，占满即拒绝而不是悄悄
//!   堆分配；
//! - **What**：[`ConnectionPool`] 维护固定数量的槽位，`connect` 预留槽位、写入
//!   边、再把边接入源；任一步失败都先回滚预留再上报原始错误；`disconnect`
//!   摘边后释放槽位；
//! - **How**：槽位表由可睡眠互斥锁保护（成员关系是低频长持锁关注点），
//!   源的边表改动嵌套在其内的自旋短临界区完成——锁序恒为
//!   池互斥锁 → 源自旋锁，与发射路径无锁序交叉。
//!
//! # 风险提示（Trade-offs）
//! - 池只登记经由它建立的边；静态 `attach` 的边不占槽位，但重复接线仍会被
//!   源边表（权威数据）拒绝；
//! - 绕过池直接 `detach` 一条池内边会让槽位短暂失真，`disconnect` 会在发现
//!   不一致时告警并回收槽位。

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, WeaveError};
use crate::sink::Sink;
use crate::source::Source;

/// 运行期接线池的缺省容量。
pub const DEFAULT_POOL_CAPACITY: usize = 16;

struct PoolSlot {
    source: Source,
    sink: Sink,
}

struct PoolCore {
    slots: Mutex<Vec<Option<PoolSlot>>>,
}

/// 固定容量的运行期接线池。
///
/// # 契约说明（What）
/// - 同一 `(源, 汇)` 在池内至多登记一次，重复请求返回 `AlreadyExists`；
/// - 槽位耗尽返回 `NoSpace`，释放任意一条边后即可重试；
/// - `connect`/`disconnect` 允许并发调用，全部串行化在池互斥锁上。
#[derive(Clone)]
pub struct ConnectionPool {
    core: Arc<PoolCore>,
}

impl ConnectionPool {
    /// 创建给定槽位数的接线池。
    pub fn new(capacity: usize) -> Self {
        Self {
            core: Arc::new(PoolCore {
                slots: Mutex::new((0..capacity).map(|_| None).collect()),
            }),
        }
    }

    /// 槽位总数。
    pub fn capacity(&self) -> usize {
        self.core.slots.lock().len()
    }

    /// 已占用的槽位数。
    pub fn in_use(&self) -> usize {
        self.core
            .slots
            .lock()
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// 运行期建立一条 `(源, 汇)` 边。
    ///
    /// # 执行步骤（How）
    /// 1. 在池互斥锁内扫描重复对，命中即 `AlreadyExists`；
    /// 2. 预留一个空槽位并写入端点，找不到空槽位返回 `NoSpace`；
    /// 3. 把边接入源（源边表为权威数据，静态接线造成的重复在这里被捕获）；
    ///    接入失败则回滚预留槽位，向调用方返回原始错误。
    pub fn connect(&self, source: &Source, sink: &Sink) -> Result<()> {
        let mut slots = self.core.slots.lock();
        let duplicate = slots.iter().flatten().any(|slot| {
            slot.source.same_endpoint(source) && slot.sink.same_endpoint(sink)
        });
        if duplicate {
            return Err(WeaveError::AlreadyExists {
                source_name: source.cow_name(),
                sink_name: sink.cow_name(),
            });
        }
        let Some(index) = slots.iter().position(|slot| slot.is_none()) else {
            return Err(WeaveError::NoSpace {
                resource: "connection pool",
            });
        };
        slots[index] = Some(PoolSlot {
            source: source.clone(),
            sink: sink.clone(),
        });
        if let Err(error) = source.attach(sink) {
            slots[index] = None;
            return Err(error);
        }
        debug!(
            source = source.name(),
            sink = sink.name(),
            slot = index,
            "runtime edge pooled"
        );
        Ok(())
    }

    /// 拆除一条池内边并释放其槽位。
    ///
    /// 池中无此 `(源, 汇)` 对时返回 `NotFound`；静态接线的边不归池管。
    pub fn disconnect(&self, source: &Source, sink: &Sink) -> Result<()> {
        let mut slots = self.core.slots.lock();
        let position = slots.iter().position(|slot| {
            matches!(
                slot,
                Some(entry)
                    if entry.source.same_endpoint(source) && entry.sink.same_endpoint(sink)
            )
        });
        let Some(index) = position else {
            return Err(WeaveError::NotFound {
                source_name: source.cow_name(),
                sink_name: sink.cow_name(),
            });
        };
        if source.detach(sink).is_err() {
            // 池与源边表失真，多半是有调用方绕过池直接摘边；槽位照常回收。
            warn!(
                source = source.name(),
                sink = sink.name(),
                "pooled edge already detached from source"
            );
        }
        slots[index] = None;
        debug!(
            source = source.name(),
            sink = sink.name(),
            slot = index,
            "runtime edge released"
        );
        Ok(())
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl core::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .finish()
    }
}
