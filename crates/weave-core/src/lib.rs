//! `weave-core` 是进程内数据流消息织网的核心基座。
//!
//! # 模块定位（Why）
//! - 独立编译的模块各自向具名的**源**发布类型化事件或报文缓冲，经具名的
//!   **汇**消费；接线、投递、排队、扇出与所有权移交全部由基座收口，发布方与
//!   消费方互不可见；
//! - 历史上并存的多套同构分发 API 在此统一为单一基座，领域侧如需方言化的
//!   包装（设置寄存器等），以薄适配层另行提供。
//!
//! # 设计概要（How）
//! - `source`/`sink` 承载扇出图：边表在源的自旋短临界区内维护，发射先快照
//!   后投递，处理器永不在持锁状态下执行；
//! - `queue` 提供有界事件队列与单条记录处理器，排队模式的工作循环策略由
//!   调用方组织；
//! - `packet` 以廉价克隆的句柄表达载荷引用计数，可插拔的回收钩子在最后一个
//!   句柄消亡时取回消息体；
//! - `observable` 与 `method` 复用同一套端点与队列基座，分别叠加"状态单元 +
//!   变更通知"与"类型化请求/应答"语义；
//! - `registry` 以固定容量槽位池登记运行期接线，容量耗尽即拒绝。
//!
//! # 并发契约（What）
//! - 锁序恒为 接线池互斥锁 → 源自旋锁 → 观察量值自旋锁，任何用户回调都不在
//!   这三把锁内执行；
//! - 所有可能阻塞的操作都以 [`Wait`] 约束限期；对同一 `(源, 汇)` 而言投递
//!   顺序与发射方程序顺序一致，同一队列内按入队顺序回放，跨队列无序。

pub mod error;
pub mod method;
pub mod observable;
pub mod packet;
pub mod queue;
pub mod registry;
pub mod sink;
pub mod source;
pub mod wait;

pub use error::{Result, WeaveError, codes};
pub use method::MethodPort;
pub use observable::{Observable, ObservableBuilder};
pub use packet::{FragmentChain, Packet, PacketBody, PacketRecycler};
pub use queue::EventQueue;
pub use registry::{ConnectionPool, DEFAULT_POOL_CAPACITY};
pub use sink::{PacketHandler, Sink};
pub use source::{SharePolicy, Source, TransferOutcome};
pub use wait::Wait;
