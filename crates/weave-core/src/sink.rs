//! 汇模块：具名消费端点、两种投递模式与单边投递原语。
//!
//! # 教案式说明
//! - **Why**：消费方关心的是"载荷到手后做什么"，而不是"从哪个线程到手"；
//!   把处理器与投递模式封进端点，源与接线层就能对两种模式一视同仁；
//! - **What**：[`Sink`] 携带处理器与固定的投递模式——立即模式在发射线程同步
//!   执行，排队模式把 `(汇, 载荷)` 记录放入其事件队列、由工作线程回放；
//!   满队行为由端点定义期的丢弃标志决定；
//! - **How**：端点核心置于 `Arc` 内，句柄克隆即共享端点身份；重复接线检测
//!   依赖 `Arc` 指针同一性，与名字无关。
//!
//! # 风险提示（Trade-offs）
//! - 立即模式处理器在发射方线程执行：发射方在何种上下文发射，处理器就要能
//!   在何种上下文运行；
//! - 处理器绝不负责释放载荷，最终释放始终由基座完成；处理器可克隆句柄后向
//!   其它源再发射。

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::WeaveError;
use crate::packet::Packet;
use crate::queue::{Delivery, EventQueue};
use crate::wait::Wait;

/// 载荷处理器。
///
/// # 契约说明（What）
/// - `handle` 以只读视角接收载荷；不得释放载荷（基座负责最终释放）；
/// - 可克隆句柄并向其它源再发射——投递期基座额外持有的句柄保证载荷在
///   处理器返回前一直存活；
/// - 任意 `Fn(&Packet) + Send + Sync + 'static` 闭包自动满足本契约。
pub trait PacketHandler: Send + Sync + 'static {
    /// 消费一次投递。
    fn handle(&self, packet: &Packet);
}

impl<F> PacketHandler for F
where
    F: Fn(&Packet) + Send + Sync + 'static,
{
    fn handle(&self, packet: &Packet) {
        self(packet)
    }
}

/// 投递模式，端点定义期固定。
enum DeliveryRoute {
    /// 处理器在发射线程同步执行。
    Immediate,
    /// 记录进入事件队列，由工作线程回放。
    Queued {
        queue: EventQueue,
        drop_on_full: bool,
    },
}

struct SinkCore {
    name: Cow<'static, str>,
    handler: Arc<dyn PacketHandler>,
    route: DeliveryRoute,
}

/// 单边投递的失败形态，发射聚合层据此区分"静默丢弃"与"硬失败"。
pub(crate) enum DeliveryFailure {
    /// 丢弃标志生效：满队丢弃，仅告警、不计数、不升级为错误。
    Dropped,
    /// 队满不等待或限时到期等硬失败。
    Failed(WeaveError),
}

/// 具名消费端点。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - 投递模式在构造时固定，生命周期内不可变；
///   - 端点必须在所有引用它的接线存续期内有效——句柄语义下由 `Arc` 自动保证；
///   - 排队端点持有其事件队列的一个句柄，队列先于端点销毁不会悬垂。
/// - **执行逻辑 (How)**：单边投递见 [`Sink::deliver`]（crate 内部）；立即模式
///   直接执行处理器并随即释放本边句柄，排队模式把句柄移入队列记录。
#[derive(Clone)]
pub struct Sink {
    core: Arc<SinkCore>,
}

impl Sink {
    /// 定义立即模式端点：处理器在发射线程同步执行。
    pub fn immediate(name: impl Into<Cow<'static, str>>, handler: impl PacketHandler) -> Self {
        Self::with_route(name, handler, DeliveryRoute::Immediate)
    }

    /// 定义排队模式端点：满队时按发射方的等待策略阻塞。
    pub fn queued(
        name: impl Into<Cow<'static, str>>,
        queue: &EventQueue,
        handler: impl PacketHandler,
    ) -> Self {
        Self::with_route(
            name,
            handler,
            DeliveryRoute::Queued {
                queue: queue.clone(),
                drop_on_full: false,
            },
        )
    }

    /// 定义满队即丢的排队端点：队列满时静默丢弃本次投递，仅记录告警。
    pub fn queued_drop_on_full(
        name: impl Into<Cow<'static, str>>,
        queue: &EventQueue,
        handler: impl PacketHandler,
    ) -> Self {
        Self::with_route(
            name,
            handler,
            DeliveryRoute::Queued {
                queue: queue.clone(),
                drop_on_full: true,
            },
        )
    }

    fn with_route(
        name: impl Into<Cow<'static, str>>,
        handler: impl PacketHandler,
        route: DeliveryRoute,
    ) -> Self {
        Self {
            core: Arc::new(SinkCore {
                name: name.into(),
                handler: Arc::new(handler),
                route,
            }),
        }
    }

    /// 端点名。
    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub(crate) fn cow_name(&self) -> Cow<'static, str> {
        self.core.name.clone()
    }

    /// 两个句柄是否指向同一端点，重复接线检测以此为准。
    pub(crate) fn same_endpoint(&self, other: &Sink) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// 直接执行处理器，事件处理器回放记录时使用。
    pub(crate) fn invoke(&self, packet: &Packet) {
        self.core.handler.handle(packet);
    }

    /// 单边投递：按端点的投递模式消费一个载荷句柄。
    ///
    /// # 契约说明
    /// - 成功时句柄被本边消费（立即模式执行完即释放，排队模式移入记录）；
    /// - 失败时句柄原样归还，调用方决定释放或交还所有权；
    /// - 丢弃标志生效的满队丢弃在此处记录告警，聚合层不再重复告警。
    pub(crate) fn deliver(
        &self,
        packet: Packet,
        wait: Wait,
    ) -> Result<(), (Packet, DeliveryFailure)> {
        match &self.core.route {
            DeliveryRoute::Immediate => {
                self.core.handler.handle(&packet);
                Ok(())
            }
            DeliveryRoute::Queued {
                queue,
                drop_on_full,
            } => {
                let effective_wait = if *drop_on_full { Wait::NoWait } else { wait };
                let delivery = Delivery {
                    sink: self.clone(),
                    packet,
                };
                match queue.offer(delivery, effective_wait) {
                    Ok(()) => Ok(()),
                    Err((returned, error)) => {
                        if *drop_on_full {
                            warn!(sink = self.name(), "event queue full, dropping delivery");
                            Err((returned.packet, DeliveryFailure::Dropped))
                        } else {
                            Err((returned.packet, DeliveryFailure::Failed(error)))
                        }
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match &self.core.route {
            DeliveryRoute::Immediate => "immediate",
            DeliveryRoute::Queued { drop_on_full, .. } => {
                if *drop_on_full {
                    "queued(drop-on-full)"
                } else {
                    "queued"
                }
            }
        };
        f.debug_struct("Sink")
            .field("name", &self.core.name)
            .field("mode", &mode)
            .finish()
    }
}
