//! 事件队列模块：排队投递模式的有界 FIFO 与单条记录处理器。
//!
//! # 教案式说明
//! - **Why**：排队型汇把处理从发射线程剥离到工作线程，队列必须有界以约束
//!   小内存环境的峰值占用，放入与取出都要受统一的等待语义约束；
//! - **What**：[`EventQueue`] 保存 `(汇, 载荷)` 记录；`offer` 在队满时按
//!   [`Wait`] 阻塞或立即失败，失败时把记录原样归还调用方；[`EventQueue::process`]
//!   取出一条记录、调用其汇的处理器、随后无条件释放载荷句柄；
//! - **How**：`parking_lot::Mutex<VecDeque>` 搭配两个条件变量（非空 / 非满），
//!   唤醒循环对虚假唤醒免疫；工作循环的策略（永续、单次、带取消）由调用方
//!   自行组织，基座只暴露单条处理器。
//!
//! # 风险提示（Trade-offs）
//! - 处理器在 `process` 调用线程上同步执行，长耗时处理器会推迟同队列其余
//!   记录；需要隔离的汇应独享队列；
//! - 处理器 panic 时记录仍会在栈展开中释放载荷，不会泄漏引用。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, WeaveError};
use crate::packet::Packet;
use crate::sink::Sink;
use crate::wait::{Wait, saturating_after};

/// 一条待处理的投递记录。
pub(crate) struct Delivery {
    pub(crate) sink: Sink,
    pub(crate) packet: Packet,
}

struct QueueCore {
    capacity: usize,
    records: Mutex<VecDeque<Delivery>>,
    not_empty: Condvar,
    not_full: Condvar,
}

/// 有界事件队列，一组共享工作线程的排队型汇挂接于其上。
///
/// # 契约说明（What）
/// - 容量在构造时固定；`capacity == 0` 的队列恒为"满"，所有放入立即失败；
/// - 同一队列内的记录严格按放入顺序被取出（跨汇亦然）；
/// - 句柄克隆即共享同一队列，可在发射方与工作线程间自由传递。
#[derive(Clone)]
pub struct EventQueue {
    core: Arc<QueueCore>,
}

impl EventQueue {
    /// 创建给定容量的事件队列。
    pub fn bounded(capacity: usize) -> Self {
        Self {
            core: Arc::new(QueueCore {
                capacity,
                records: Mutex::new(VecDeque::with_capacity(capacity)),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
            }),
        }
    }

    /// 队列容量。
    pub fn capacity(&self) -> usize {
        self.core.capacity
    }

    /// 当前积压的记录数。
    pub fn len(&self) -> usize {
        self.core.records.lock().len()
    }

    /// 是否无积压。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 放入一条投递记录。
    ///
    /// # 契约说明
    /// - 成功时记录（连同其中的载荷句柄）移入队列；
    /// - 队满且 `NoWait` → `NoSpace`；限时等待到期仍满 → `Timeout`；
    ///   两种失败都把记录原样归还，调用方决定丢弃或交还所有权。
    pub(crate) fn offer(&self, delivery: Delivery, wait: Wait) -> Result<(), (Delivery, WeaveError)> {
        let mut records = self.core.records.lock();
        if records.len() < self.core.capacity {
            records.push_back(delivery);
            self.core.not_empty.notify_one();
            return Ok(());
        }
        match wait {
            Wait::NoWait => Err((
                delivery,
                WeaveError::NoSpace {
                    resource: "event queue",
                },
            )),
            Wait::Forever => {
                while records.len() >= self.core.capacity {
                    self.core.not_full.wait(&mut records);
                }
                records.push_back(delivery);
                self.core.not_empty.notify_one();
                Ok(())
            }
            Wait::Timeout(duration) => {
                let deadline = saturating_after(Instant::now(), duration);
                loop {
                    if records.len() < self.core.capacity {
                        records.push_back(delivery);
                        self.core.not_empty.notify_one();
                        return Ok(());
                    }
                    if self
                        .core
                        .not_full
                        .wait_until(&mut records, deadline)
                        .timed_out()
                    {
                        if records.len() < self.core.capacity {
                            records.push_back(delivery);
                            self.core.not_empty.notify_one();
                            return Ok(());
                        }
                        return Err((delivery, WeaveError::Timeout));
                    }
                }
            }
        }
    }

    /// 取出最早的一条记录，空队列按 [`Wait`] 阻塞或失败。
    fn take(&self, wait: Wait) -> Result<Delivery> {
        let mut records = self.core.records.lock();
        loop {
            if let Some(delivery) = records.pop_front() {
                self.core.not_full.notify_one();
                return Ok(delivery);
            }
            match wait {
                Wait::NoWait => return Err(WeaveError::Timeout),
                Wait::Forever => {
                    self.core.not_empty.wait(&mut records);
                }
                Wait::Timeout(duration) => {
                    let deadline = saturating_after(Instant::now(), duration);
                    loop {
                        if !records.is_empty() {
                            break;
                        }
                        if self
                            .core
                            .not_empty
                            .wait_until(&mut records, deadline)
                            .timed_out()
                        {
                            if records.is_empty() {
                                return Err(WeaveError::Timeout);
                            }
                            break;
                        }
                    }
                }
            }
        }
    }

    /// 处理一条记录：取出、执行其汇的处理器、释放载荷句柄。
    ///
    /// # 契约说明
    /// - 限期内无记录返回 `Timeout`，此时不会调用任何处理器、不释放任何载荷；
    /// - 处理器返回后记录中的句柄无条件释放——处理器自身绝不负责释放载荷；
    /// - 工作循环（永续 / 单次 / 可取消）由调用方组织。
    pub fn process(&self, wait: Wait) -> Result<()> {
        let delivery = self.take(wait)?;
        delivery.sink.invoke(&delivery.packet);
        Ok(())
    }
}

impl core::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventQueue")
            .field("capacity", &self.core.capacity)
            .field("backlog", &self.len())
            .finish()
    }
}

/// 两个队列句柄是否指向同一底层队列。
impl PartialEq for EventQueue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl Eq for EventQueue {}
