//! 观察量模块：带校验与变更通知的状态单元。
//!
//! # 教案式说明
//! - **Why**：设置项之类的小状态需要"多方订阅、变更即推"的语义，而推送基础
//!   设施（端点、队列、逐边告警）基座已经具备——观察量只需在其上叠加值存储
//!   与校验，不另起一套订阅机制；
//! - **What**：[`Observable`] 保存定长 `Copy` 值；`set` 依次执行 校验 → 存储 →
//!   按声明顺序向订阅端点分发；订阅表就是一个内嵌的 [`Source`]，订阅端点
//!   就是普通的 [`Sink`]；
//! - **How**：值单元由自旋短临界区保护（拷贝期间不可见撕裂值）；校验 → 存储 →
//!   分发整个序列串行化在一把可睡眠的更新互斥锁上，并发 `set` 的分发顺序
//!   与其存储顺序一致；分发一律 `NoWait`——排队订阅者满队即丢（合并语义），
//!   在意漏报的订阅者应以 `get` 兜底拉取。
//!
//! # 风险提示（Trade-offs）
//! - 订阅端点的处理器在 `set` 调用线程（立即模式）或其队列工作线程（排队
//!   模式）执行；处理器内再 `set` 同一观察量会在更新互斥锁上自锁，属于
//!   禁止的重入；
//! - 通知载荷携带的是变更时的值拷贝，慢订阅者看到的可能不是最新值。

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use spin::Mutex as SpinMutex;

use crate::error::Result;
use crate::packet::Packet;
use crate::queue::EventQueue;
use crate::sink::Sink;
use crate::source::Source;
use crate::wait::Wait;

type Validator<T> = dyn Fn(&T) -> Result<()> + Send + Sync;

struct ObservableCore<T> {
    value: SpinMutex<T>,
    /// 串行化 校验 → 存储 → 分发 的更新互斥锁；值单元的自旋锁只包住字节拷贝。
    update: Mutex<()>,
    fan_out: Source,
    validator: Option<Box<Validator<T>>>,
}

/// 带校验与变更通知的状态单元。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `get` 返回存储值的拷贝，绝不返回撕裂状态；
///   - `set` 的校验失败使存储与订阅表保持原状，且不向任何订阅者分发；
///   - 订阅者只会观察到通过了校验的值；同一次 `set` 内按声明顺序分发；
///   - 定义期挂接的变更处理器（on_change）始终以观察量声明的模式分发，
///     且先于后续订阅者。
/// - **设计权衡 (Trade-offs)**：排队订阅在满队时丢弃最新通知而不是阻塞
///   `set`，换取设置路径的有界时延。
pub struct Observable<T: Copy + Send + Sync + 'static> {
    core: Arc<ObservableCore<T>>,
}

impl<T: Copy + Send + Sync + 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Copy + Send + Sync + 'static> Observable<T> {
    /// 定义无校验、无变更处理器的观察量。
    pub fn new(name: impl Into<Cow<'static, str>>, initial: T) -> Self {
        Self::builder(name, initial).build()
    }

    /// 进入构造器以挂接校验器与变更处理器。
    pub fn builder(name: impl Into<Cow<'static, str>>, initial: T) -> ObservableBuilder<T> {
        ObservableBuilder {
            name: name.into(),
            initial,
            validator: None,
            on_change: None,
        }
    }

    /// 观察量名。
    pub fn name(&self) -> &str {
        self.core.fan_out.name()
    }

    /// 读取当前值的拷贝。
    pub fn get(&self) -> T {
        *self.core.value.lock()
    }

    /// 写入新值并向订阅者分发变更通知。
    ///
    /// # 执行步骤（How）
    /// 1. 取更新互斥锁，串行化与并发 `set` 的整个序列；
    /// 2. 执行校验器，任何 `Err` 原样上报并保持存储不动；
    /// 3. 在值单元的短临界区内覆盖存储；
    /// 4. 以 `NoWait` 向订阅端点分发值拷贝——排队订阅者满队即丢（合并）。
    pub fn set(&self, value: T) -> Result<()> {
        let _serial = self.core.update.lock();
        if let Some(validator) = &self.core.validator {
            validator(&value)?;
        }
        *self.core.value.lock() = value;
        let notification = Packet::from_value(value);
        // NoWait 分发只返回计数，不会升级为超时；计数本身对 set 无意义。
        self.core.fan_out.emit(&notification, Wait::NoWait)?;
        Ok(())
    }

    /// 订阅变更通知，分发顺序即订阅顺序。
    pub fn subscribe(&self, sink: &Sink) -> Result<()> {
        self.core.fan_out.attach(sink)
    }

    /// 退订。
    pub fn unsubscribe(&self, sink: &Sink) -> Result<()> {
        self.core.fan_out.detach(sink)
    }

    /// 当前订阅端点数（含定义期挂接的变更处理器）。
    pub fn subscriber_count(&self) -> usize {
        self.core.fan_out.fan_out()
    }

    /// 构造立即模式的类型化订阅端点：通知载荷自动解包为 `&T`。
    pub fn watcher(
        name: impl Into<Cow<'static, str>>,
        on_value: impl Fn(&T) + Send + Sync + 'static,
    ) -> Sink {
        Sink::immediate(name, move |packet: &Packet| {
            if let Some(value) = packet.downcast_ref::<T>() {
                on_value(value);
            }
        })
    }

    /// 构造排队模式的类型化订阅端点，满队即丢（合并语义）。
    pub fn queued_watcher(
        name: impl Into<Cow<'static, str>>,
        queue: &EventQueue,
        on_value: impl Fn(&T) + Send + Sync + 'static,
    ) -> Sink {
        Sink::queued_drop_on_full(name, queue, move |packet: &Packet| {
            if let Some(value) = packet.downcast_ref::<T>() {
                on_value(value);
            }
        })
    }
}

impl<T: Copy + Send + Sync + 'static> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("name", &self.name())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// 观察量构造器。
///
/// 校验器与变更处理器只能在定义期挂接，运行期订阅走 [`Observable::subscribe`]。
pub struct ObservableBuilder<T: Copy + Send + Sync + 'static> {
    name: Cow<'static, str>,
    initial: T,
    validator: Option<Box<Validator<T>>>,
    on_change: Option<OnChange<T>>,
}

enum OnChange<T> {
    Immediate(Box<dyn Fn(&T) + Send + Sync>),
    Queued {
        queue: EventQueue,
        handler: Box<dyn Fn(&T) + Send + Sync>,
    },
}

impl<T: Copy + Send + Sync + 'static> ObservableBuilder<T> {
    /// 挂接校验器：返回 `Err` 即拒绝本次 `set`，错误原样透传给调用方。
    pub fn validator(
        mut self,
        validate: impl Fn(&T) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Box::new(validate));
        self
    }

    /// 挂接立即模式的变更处理器：观察量以立即模式声明。
    pub fn on_change(mut self, handler: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_change = Some(OnChange::Immediate(Box::new(handler)));
        self
    }

    /// 挂接排队模式的变更处理器：观察量以排队模式声明，满队即丢。
    pub fn on_change_queued(
        mut self,
        queue: &EventQueue,
        handler: impl Fn(&T) + Send + Sync + 'static,
    ) -> Self {
        self.on_change = Some(OnChange::Queued {
            queue: queue.clone(),
            handler: Box::new(handler),
        });
        self
    }

    /// 固化定义并返回观察量。
    pub fn build(self) -> Observable<T> {
        let fan_out = Source::new(self.name.clone());
        if let Some(on_change) = self.on_change {
            let sink_name = Cow::Owned(format!("{}.on_change", self.name));
            let sink = match on_change {
                OnChange::Immediate(handler) => {
                    Observable::<T>::watcher_boxed_immediate(sink_name, handler)
                }
                OnChange::Queued { queue, handler } => {
                    Observable::<T>::watcher_boxed_queued(sink_name, &queue, handler)
                }
            };
            // 定义期的首次接线不会与任何已有边冲突。
            let _ = fan_out.attach(&sink);
        }
        Observable {
            core: Arc::new(ObservableCore {
                value: SpinMutex::new(self.initial),
                update: Mutex::new(()),
                fan_out,
                validator: self.validator,
            }),
        }
    }
}

impl<T: Copy + Send + Sync + 'static> Observable<T> {
    fn watcher_boxed_immediate(
        name: Cow<'static, str>,
        handler: Box<dyn Fn(&T) + Send + Sync>,
    ) -> Sink {
        Sink::immediate(name, move |packet: &Packet| {
            if let Some(value) = packet.downcast_ref::<T>() {
                handler(value);
            }
        })
    }

    fn watcher_boxed_queued(
        name: Cow<'static, str>,
        queue: &EventQueue,
        handler: Box<dyn Fn(&T) + Send + Sync>,
    ) -> Sink {
        Sink::queued_drop_on_full(name, queue, move |packet: &Packet| {
            if let Some(value) = packet.downcast_ref::<T>() {
                handler(value);
            }
        })
    }
}
