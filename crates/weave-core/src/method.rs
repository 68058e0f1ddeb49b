//! 方法端口模块：路由到处理线程的类型化请求/应答调用。
//!
//! # 教案式说明
//! - **Why**：设置查询、控制指令这类"问一句答一句"的交互不适合单向扇出，
//!   需要把请求排到处理线程、再把应答送回调用线程；复用事件队列基座即可
//!   获得排队、限期与顺序保证，无需第二套分发机制；
//! - **What**：[`MethodPort`] 把一次调用封装为"调用单元"载荷经其排队端点入队；
//!   处理线程照常跑 [`EventQueue::process`]，端点处理器取出请求、执行业务
//!   处理器、把结果写进单次完成体并唤醒调用方；
//! - **How**：请求与应答类型由泛型参数静态约束（空侧用 `()`），尺寸校验因此
//!   移入编译期；完成体是 互斥锁 + 条件变量 上的一次性结果槽，按调用在栈上
//!   的 `Arc` 生命周期存活。
//!
//! # 风险提示（Trade-offs）
//! - 入队与等待完成各自独立消费同一限期值：极端情形下一次调用最多阻塞
//!   两倍限期；
//! - 调用方超时返回后，处理器仍可能稍后完成并写入完成体——结果被安静丢弃，
//!   不会悬垂（完成体由 `Arc` 保活）。

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::error::{Result, WeaveError};
use crate::packet::Packet;
use crate::queue::EventQueue;
use crate::sink::{DeliveryFailure, Sink};
use crate::wait::{Wait, saturating_after};

/// 单次完成体：一次性结果槽加唤醒原语。
struct Completion<Rep> {
    state: Mutex<Option<Result<Rep>>>,
    signal: Condvar,
}

impl<Rep> Completion<Rep> {
    fn new() -> Self {
        Self {
            state: Mutex::new(None),
            signal: Condvar::new(),
        }
    }

    /// 写入结果并唤醒等待方；结果槽只接受首次写入。
    fn complete(&self, result: Result<Rep>) {
        let mut state = self.state.lock();
        if state.is_some() {
            return;
        }
        *state = Some(result);
        self.signal.notify_all();
    }

    /// 等待结果，限期耗尽返回 `Timeout`。
    fn wait(&self, wait: Wait) -> Result<Rep> {
        let mut state = self.state.lock();
        if let Some(result) = state.take() {
            return result;
        }
        match wait {
            Wait::NoWait => Err(WeaveError::Timeout),
            Wait::Forever => loop {
                self.signal.wait(&mut state);
                if let Some(result) = state.take() {
                    return result;
                }
            },
            Wait::Timeout(duration) => {
                let deadline = saturating_after(Instant::now(), duration);
                loop {
                    if self.signal.wait_until(&mut state, deadline).timed_out() {
                        return match state.take() {
                            Some(result) => result,
                            None => Err(WeaveError::Timeout),
                        };
                    }
                    if let Some(result) = state.take() {
                        return result;
                    }
                }
            }
        }
    }
}

/// 调用单元：随载荷流经事件队列的请求与完成体。
struct CallCell<Req, Rep> {
    request: Mutex<Option<Req>>,
    completion: Completion<Rep>,
}

struct MethodPortCore {
    name: Cow<'static, str>,
    endpoint: Sink,
}

/// 类型化请求/应答端口。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - 请求/应答类型在定义期固定；空侧以 `()` 表达，不占载荷；
///   - 同一处理队列上的调用按入队顺序串行执行；
///   - 处理器返回的业务错误经 [`WeaveError::Application`] 等形态原样透传给
///     调用方，基座不改写；
///   - 入队失败报 `NoSpace`（不等待）或 `Timeout`（限期耗尽），二者都保证
///     处理器未被调用。
/// - **执行逻辑 (How)**：`call` 组装调用单元 → 经排队端点入队 → 在完成体上
///   等待；处理线程经 [`EventQueue::process`] 回放端点处理器完成应答。
pub struct MethodPort<Req, Rep> {
    core: Arc<MethodPortCore>,
    _marker: core::marker::PhantomData<fn(Req) -> Rep>,
}

impl<Req, Rep> Clone for MethodPort<Req, Rep> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _marker: core::marker::PhantomData,
        }
    }
}

impl<Req, Rep> MethodPort<Req, Rep>
where
    Req: Send + 'static,
    Rep: Send + 'static,
{
    /// 定义方法端口并把其处理器挂到给定事件队列。
    ///
    /// 处理线程对该队列执行 [`EventQueue::process`] 即可服务本端口——方法
    /// 记录与普通排队投递共享同一工作循环。
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        queue: &EventQueue,
        handler: impl Fn(Req) -> Result<Rep> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let endpoint_name: Cow<'static, str> = Cow::Owned(format!("{name}.method"));
        let endpoint = Sink::queued(endpoint_name, queue, move |packet: &Packet| {
            let Some(cell) = packet.downcast_ref::<Arc<CallCell<Req, Rep>>>() else {
                warn!("method endpoint received a foreign packet, ignoring");
                return;
            };
            let request = cell.request.lock().take();
            match request {
                Some(request) => cell.completion.complete(handler(request)),
                None => warn!("method call cell replayed without a request"),
            }
        });
        Self {
            core: Arc::new(MethodPortCore { name, endpoint }),
            _marker: core::marker::PhantomData,
        }
    }

    /// 端口名。
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// 发起一次调用并等待应答。
    ///
    /// # 契约说明
    /// - 入队与完成等待各自最多消费一个 `wait` 限期；
    /// - 返回值即处理器的返回值，业务错误原样透传；
    /// - 失败路径不泄漏调用单元：未入队的单元随本次调用一起释放。
    pub fn call(&self, request: Req, wait: Wait) -> Result<Rep> {
        let cell = Arc::new(CallCell {
            request: Mutex::new(Some(request)),
            completion: Completion::new(),
        });
        let packet = Packet::from_value(Arc::clone(&cell));
        if let Err((_packet, failure)) = self.core.endpoint.deliver(packet, wait) {
            return Err(match failure {
                DeliveryFailure::Dropped => WeaveError::NoSpace {
                    resource: "method queue",
                },
                DeliveryFailure::Failed(error) => error,
            });
        }
        cell.completion.wait(wait)
    }
}

impl<Req, Rep> fmt::Debug for MethodPort<Req, Rep> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodPort")
            .field("name", &self.core.name)
            .finish()
    }
}
