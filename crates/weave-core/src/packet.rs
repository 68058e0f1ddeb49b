//! 载荷模块：在源与汇之间流动的不可变消息体及其回收钩子。
//!
//! # 教案式说明
//! - **Why**：扇出投递要求同一载荷被多个下游共享而不做深拷贝，且载荷的最终
//!   释放点必须可插拔（例如归还某个 slab 池），否则缓冲复用与统计都无从谈起；
//! - **What**：[`Packet`] 是廉价克隆的句柄——克隆即"加引用"，丢弃即"减引用"；
//!   当最后一个句柄消亡时，可选的 [`PacketRecycler`] 恰好收到一次回收通知并
//!   取回消息体；
//! - **How**：内部以 `Arc` 承载 [`PacketBody`]，消息体要么是 `bytes::Bytes`
//!   片段链（零拷贝网络缓冲），要么是类型擦除的业务值（观察量通知、方法调用
//!   单元都走这条路）。
//!
//! # 风险提示（Trade-offs）
//! - 句柄不提供内部可变性：载荷在发射后即视为只读，需要修改的场景应构造新
//!   载荷再次发射；
//! - 回收钩子在最后一个句柄的 `Drop` 路径上同步执行，实现者不得 panic，也不应
//!   执行长耗时操作。

use std::any::Any;
use std::fmt;
use std::mem;
use std::sync::Arc;

use bytes::Bytes;

/// 字节载荷的片段链。
///
/// # 契约说明（What）
/// - 片段按追加顺序构成逻辑上连续的报文，`len` 恒等于各片段长度之和；
/// - 片段本身为 `bytes::Bytes`，追加与克隆均不搬运字节。
#[derive(Clone, Default)]
pub struct FragmentChain {
    fragments: Vec<Bytes>,
    len: usize,
}

impl FragmentChain {
    /// 创建空链。
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个片段，空片段直接忽略。
    pub fn push(&mut self, fragment: Bytes) {
        if fragment.is_empty() {
            return;
        }
        self.len += fragment.len();
        self.fragments.push(fragment);
    }

    /// 逻辑总长度。
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否不含任何字节。
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 以切片视角访问片段链。
    pub fn fragments(&self) -> &[Bytes] {
        &self.fragments
    }

    /// 将全部片段拼接为一段连续内存，测试与日志导出使用。
    pub fn to_contiguous(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for fragment in &self.fragments {
            out.extend_from_slice(fragment);
        }
        out
    }
}

impl fmt::Debug for FragmentChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentChain")
            .field("fragments", &self.fragments.len())
            .field("len", &self.len)
            .finish()
    }
}

/// 载荷消息体：字节缓冲或类型擦除的业务值。
pub enum PacketBody {
    /// 字节片段链，面向报文类载荷。
    Buffer(FragmentChain),
    /// 类型擦除的业务值，面向观察量通知与方法调用单元。
    Value(Box<dyn Any + Send + Sync>),
}

impl fmt::Debug for PacketBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketBody::Buffer(chain) => f.debug_tuple("Buffer").field(chain).finish(),
            PacketBody::Value(_) => f.debug_tuple("Value").field(&"<erased-value>").finish(),
        }
    }
}

/// 载荷回收钩子：最后一个句柄消亡时恰好被调用一次。
///
/// # 设计初衷（Why）
/// - 源宏"在 unref 时归还 slab"的语义在 Rust 中落在值的 `Drop` 上，
///   由载荷自身携带回收入口，而不是由源在发射期补挂；
/// - 取回 [`PacketBody`] 的所有权，实现者可复用其中的 `Bytes` 片段或仅更新统计。
///
/// # 契约定义（What）
/// - **前置条件**：实现必须线程安全；回收可能发生在任意持有句柄的线程上；
/// - **后置条件**：调用恰好一次；实现不得 panic，否则 `Drop` 路径上的 panic
///   将导致进程异常终止。
pub trait PacketRecycler: Send + Sync + 'static {
    /// 取回消息体并执行回收。
    fn reclaim(&self, body: PacketBody);
}

struct PacketCore {
    body: PacketBody,
    recycler: Option<Arc<dyn PacketRecycler>>,
}

impl Drop for PacketCore {
    fn drop(&mut self) {
        if let Some(recycler) = self.recycler.take() {
            let body = mem::replace(&mut self.body, PacketBody::Buffer(FragmentChain::new()));
            recycler.reclaim(body);
        }
    }
}

/// 在织网中流动的载荷句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：扇出时每条边克隆一个句柄（即"加引用"），投递完成后句柄
///   逐个消亡（即"减引用"），引用计数全程由 `Arc` 承担，净变化为零；
/// - **契约 (What)**：
///   - 克隆与丢弃在任意线程上均安全（`Send + Sync`）；
///   - 消息体只读；`downcast_ref` 仅对 `Value` 载荷生效；
///   - 携带回收钩子的载荷在最后一个句柄消亡时恰好触发一次 [`PacketRecycler::reclaim`]；
/// - **执行逻辑 (How)**：`Arc<PacketCore>` 的最终 `Drop` 以 `mem::replace` 取出
///   消息体后移交回收钩子，避免任何 `unsafe` 或未初始化读。
#[derive(Clone)]
pub struct Packet {
    core: Arc<PacketCore>,
}

impl Packet {
    /// 以单一字节片段构造载荷。
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let mut chain = FragmentChain::new();
        chain.push(data.into());
        Self::from_fragments(chain)
    }

    /// 以片段链构造载荷。
    pub fn from_fragments(chain: FragmentChain) -> Self {
        Self::with_body(PacketBody::Buffer(chain), None)
    }

    /// 以业务值构造载荷，观察量与方法端口的通知路径使用。
    pub fn from_value<T: Any + Send + Sync>(value: T) -> Self {
        Self::with_body(PacketBody::Value(Box::new(value)), None)
    }

    /// 构造携带回收钩子的载荷。
    ///
    /// # 契约说明
    /// - `recycler` 在最后一个句柄消亡时恰好收到一次 [`PacketBody`]；
    /// - 载荷池实现应经由本入口把"归还 slab"逻辑挂接到载荷生命周期上。
    pub fn recycled(body: PacketBody, recycler: Arc<dyn PacketRecycler>) -> Self {
        Self::with_body(body, Some(recycler))
    }

    fn with_body(body: PacketBody, recycler: Option<Arc<dyn PacketRecycler>>) -> Self {
        Self {
            core: Arc::new(PacketCore { body, recycler }),
        }
    }

    /// 访问消息体。
    pub fn body(&self) -> &PacketBody {
        &self.core.body
    }

    /// 对 `Value` 载荷做类型化访问，类型不符或为字节载荷时返回 `None`。
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match &self.core.body {
            PacketBody::Value(value) => value.downcast_ref::<T>(),
            PacketBody::Buffer(_) => None,
        }
    }

    /// 当前存活句柄数，仅用于诊断与测试断言。
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.core)
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("body", &self.core.body)
            .field("handles", &Arc::strong_count(&self.core))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingRecycler {
        reclaims: AtomicUsize,
    }

    impl PacketRecycler for CountingRecycler {
        fn reclaim(&self, _body: PacketBody) {
            self.reclaims.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// 多个句柄消亡后回收钩子恰好触发一次。
    #[test]
    fn recycler_fires_once_after_last_handle() {
        let recycler = Arc::new(CountingRecycler {
            reclaims: AtomicUsize::new(0),
        });
        let packet = Packet::recycled(
            PacketBody::Buffer(FragmentChain::new()),
            recycler.clone() as Arc<dyn PacketRecycler>,
        );
        let clone_a = packet.clone();
        let clone_b = packet.clone();
        drop(packet);
        drop(clone_a);
        assert_eq!(recycler.reclaims.load(Ordering::SeqCst), 0);
        drop(clone_b);
        assert_eq!(recycler.reclaims.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fragment_chain_tracks_total_length() {
        let mut chain = FragmentChain::new();
        chain.push(Bytes::from_static(b"abc"));
        chain.push(Bytes::new());
        chain.push(Bytes::from_static(b"de"));
        assert_eq!(chain.len(), 5);
        assert_eq!(chain.fragments().len(), 2);
        assert_eq!(chain.to_contiguous(), b"abcde");
    }
}
