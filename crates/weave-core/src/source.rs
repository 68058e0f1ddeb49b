//! 源模块：具名扇出点、接线表与发射族。
//!
//! # 教案式说明
//! - **Why**：发射路径绝不允许睡眠——源的接线表用自旋级短临界区保护，
//!   发射先在锁内做快照、随后在锁外投递，处理器永远不会在持锁状态下执行；
//! - **What**：[`Source`] 维护本源的出边列表与共享策略：[`SharePolicy::Shared`]
//!   源按边克隆载荷句柄扇出；[`SharePolicy::Transfer`] 源最多接一条边，发射时
//!   把所有权整体移交，未能移交则原样归还调用方；
//! - **How**：边按接线声明顺序保存于 `spin::Mutex<Vec<Sink>>`；重复 `(源, 汇)`
//!   在表内以端点同一性判定并拒绝；逐边失败只降级为告警，不中断对其余边的
//!   扇出。
//!
//! # 风险提示（Trade-offs）
//! - 立即模式处理器在发射线程执行，长耗时处理器直接拉长 `emit` 的时延；
//! - 处理器不得直接改写接线表，增删边一律走 `attach`/`detach` 或运行期接线池。

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use spin::Mutex as SpinMutex;
use tracing::{debug, warn};

use crate::error::{Result, WeaveError};
use crate::packet::Packet;
use crate::sink::{DeliveryFailure, Sink};
use crate::wait::Wait;

/// 源的载荷共享策略。
///
/// # 契约说明（What）
/// - `Shared`：扇出时每条边克隆一个句柄，各边独立消费；
/// - `Transfer`：单消费者约束——接线表容量为一，发射把所有权整体移交；
///   第二次接线在登记期即被拒绝。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SharePolicy {
    /// 共享扇出。
    Shared,
    /// 仅所有权转移，至多一条出边。
    Transfer,
}

struct SourceCore {
    name: Cow<'static, str>,
    policy: SharePolicy,
    edges: SpinMutex<Vec<Sink>>,
}

/// 转移模式发射的结果。
///
/// 失败与空接线都把载荷原样归还，调用方保有所有权。
#[derive(Debug)]
pub enum TransferOutcome {
    /// 载荷已移交给唯一下游。
    Delivered,
    /// 当前没有下游；载荷归还，不视为错误。
    NoSink(Packet),
    /// 投递失败（队满、超时或策略不符），载荷归还。
    Rejected {
        packet: Packet,
        error: WeaveError,
    },
}

/// 具名扇出点。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - 任一时刻同一 `(源, 汇)` 至多一条边；接线声明顺序即投递顺序；
///   - 发射对边表做快照后立即放锁，接线变更与发射可以并发进行，彼此只见
///     快照前后的完整状态；
///   - 对同一 `(源, 汇)` 而言，投递顺序与发射方的程序顺序一致。
/// - **执行逻辑 (How)**：`emit` 族的逐边失败记录告警后继续扇出其余边；
///   聚合返回值是"接受投递的汇数量"，`> 0` 即至少一个下游收到载荷。
#[derive(Clone)]
pub struct Source {
    core: Arc<SourceCore>,
}

impl Source {
    /// 定义共享扇出源。
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self::with_policy(name, SharePolicy::Shared)
    }

    /// 定义单消费者的转移型源。
    pub fn transfer(name: impl Into<Cow<'static, str>>) -> Self {
        Self::with_policy(name, SharePolicy::Transfer)
    }

    /// 以显式策略定义源。
    pub fn with_policy(name: impl Into<Cow<'static, str>>, policy: SharePolicy) -> Self {
        Self {
            core: Arc::new(SourceCore {
                name: name.into(),
                policy,
                edges: SpinMutex::new(Vec::new()),
            }),
        }
    }

    /// 源名。
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// 源的共享策略。
    pub fn policy(&self) -> SharePolicy {
        self.core.policy
    }

    /// 当前出边数量。
    pub fn fan_out(&self) -> usize {
        self.core.edges.lock().len()
    }

    pub(crate) fn same_endpoint(&self, other: &Source) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    pub(crate) fn cow_name(&self) -> Cow<'static, str> {
        self.core.name.clone()
    }

    /// 把一条边接入本源（静态接线路径）。
    ///
    /// # 契约说明
    /// - 同一端点的重复接线返回 `AlreadyExists`，边表保持原状；
    /// - 转移型源已有出边时返回 `NoSpace`（唯一下游槽位已占用）；
    /// - 边表变更在源的短临界区内完成，期间不执行任何回调。
    pub fn attach(&self, sink: &Sink) -> Result<()> {
        {
            let mut edges = self.core.edges.lock();
            if edges.iter().any(|edge| edge.same_endpoint(sink)) {
                return Err(WeaveError::AlreadyExists {
                    source_name: self.cow_name(),
                    sink_name: sink.cow_name(),
                });
            }
            if self.core.policy == SharePolicy::Transfer && !edges.is_empty() {
                return Err(WeaveError::NoSpace {
                    resource: "transfer source edge slot",
                });
            }
            edges.push(sink.clone());
        }
        debug!(source = self.name(), sink = sink.name(), "edge attached");
        Ok(())
    }

    /// 把一条边从本源摘除。
    pub fn detach(&self, sink: &Sink) -> Result<()> {
        {
            let mut edges = self.core.edges.lock();
            let position = edges.iter().position(|edge| edge.same_endpoint(sink));
            match position {
                Some(index) => {
                    edges.remove(index);
                }
                None => {
                    return Err(WeaveError::NotFound {
                        source_name: self.cow_name(),
                        sink_name: sink.cow_name(),
                    });
                }
            }
        }
        debug!(source = self.name(), sink = sink.name(), "edge detached");
        Ok(())
    }

    /// 在短临界区内为本次发射截取边表快照。
    fn snapshot(&self) -> Vec<Sink> {
        self.core.edges.lock().clone()
    }

    /// 共享扇出发射：逐边克隆句柄投递，返回接受投递的汇数量。
    ///
    /// # 契约说明
    /// - 空接线返回 `Ok(0)`，不视为错误；
    /// - 逐边失败记录告警后继续扇出；接线非空、无任何边接受、且调用方愿意
    ///   等待时，以 `Timeout` 上报（满队即丢的静默丢弃不触发该升级）；
    /// - 转移型源拒绝本入口（所有权必须移交），返回 `InvalidArgument`。
    pub fn emit(&self, packet: &Packet, wait: Wait) -> Result<usize> {
        if self.core.policy == SharePolicy::Transfer {
            return Err(WeaveError::invalid_argument(
                "transfer source delivers via emit_transfer or emit_consume",
            ));
        }
        let snapshot = self.snapshot();
        let mut accepted = 0usize;
        let mut hard_failures = 0usize;
        for sink in &snapshot {
            match sink.deliver(packet.clone(), wait) {
                Ok(()) => accepted += 1,
                Err((_returned, DeliveryFailure::Dropped)) => {
                    // 满队即丢已在投递层告警，此处仅不计数。
                }
                Err((_returned, DeliveryFailure::Failed(error))) => {
                    hard_failures += 1;
                    warn!(
                        source = self.name(),
                        sink = sink.name(),
                        code = error.code(),
                        "delivery failed, skipping edge"
                    );
                }
            }
        }
        if accepted == 0 && hard_failures > 0 && !wait.is_no_wait() {
            return Err(WeaveError::Timeout);
        }
        Ok(accepted)
    }

    /// 发射并顺带释放调用方句柄。
    ///
    /// 共享源等价于 `emit` 后释放入参；转移型源把所有权移交唯一下游，
    /// 空接线返回 `Ok(0)` 并释放载荷（"消耗"语义）。
    pub fn emit_consume(&self, packet: Packet, wait: Wait) -> Result<usize> {
        match self.core.policy {
            SharePolicy::Shared => self.emit(&packet, wait),
            SharePolicy::Transfer => match self.emit_transfer(packet, wait) {
                TransferOutcome::Delivered => Ok(1),
                TransferOutcome::NoSink(_unclaimed) => Ok(0),
                TransferOutcome::Rejected { packet: _, error } => Err(error),
            },
        }
    }

    /// 转移模式发射：把载荷所有权整体移交唯一下游。
    ///
    /// # 契约说明
    /// - 空接线返回 [`TransferOutcome::NoSink`]，调用方保有所有权；
    /// - 投递失败返回 [`TransferOutcome::Rejected`]，载荷原样归还；
    /// - 共享源调用本入口同样以 `Rejected` 归还载荷并报 `InvalidArgument`。
    pub fn emit_transfer(&self, packet: Packet, wait: Wait) -> TransferOutcome {
        if self.core.policy == SharePolicy::Shared {
            return TransferOutcome::Rejected {
                packet,
                error: WeaveError::invalid_argument(
                    "shared source delivers via emit or emit_consume",
                ),
            };
        }
        let snapshot = self.snapshot();
        match snapshot.first() {
            None => TransferOutcome::NoSink(packet),
            Some(sink) => match sink.deliver(packet, wait) {
                Ok(()) => TransferOutcome::Delivered,
                Err((packet, DeliveryFailure::Dropped)) => TransferOutcome::Rejected {
                    packet,
                    error: WeaveError::NoSpace {
                        resource: "event queue",
                    },
                },
                Err((packet, DeliveryFailure::Failed(error))) => {
                    warn!(
                        source = self.name(),
                        sink = sink.name(),
                        code = error.code(),
                        "transfer delivery failed, ownership returned"
                    );
                    TransferOutcome::Rejected { packet, error }
                }
            },
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.core.name)
            .field("policy", &self.core.policy)
            .field("fan_out", &self.fan_out())
            .finish()
    }
}
