//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为织网基座对外暴露的错误语义提供集中定义：接线、发射、排队、观察量校验与
//!   方法调用共享同一套稳定错误域，方便日志检索与自动化兜底；
//! - 原生实现以负数错误码贯穿全链路，本模块将其收敛为带上下文的枚举，并保留
//!   `<域>.<语义>` 形式的稳定错误码字符串供观测面聚合。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `thiserror::Error` 以兼容 `std::error::Error`；
//! - 每个变体对应唯一稳定码（见 [`codes`]），`WeaveError::code` 查询不产生分配；
//! - 处理器/校验器自定义的业务失败通过 [`WeaveError::Application`] 原样透传，
//!   基座不做二次解释。
//!
//! ## 扩展建议（How）
//! - 新增变体时必须同步登记 [`codes`] 常量并更新 `code()` 映射；
//! - 上层 crate 若需要更细的领域错误，应定义自有枚举并经 `Application` 透传。

use std::borrow::Cow;

use thiserror::Error;

/// 织网基座统一的 `Result` 别名，`E` 默认为 [`WeaveError`]。
pub type Result<T, E = WeaveError> = core::result::Result<T, E>;

/// 织网核心错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：接线登记、扇出发射、事件排队与方法调用在不同线程上产生的
///   失败需要合流为同一错误面，调用方才能据此实施重试、降级或告警；
/// - **契约 (What)**：
///   - 所有变体满足 `Send + Sync + 'static`，可安全跨线程传播；
///   - 每个变体具有唯一稳定码（[`Self::code`]），变体新增不改变既有码值；
///   - 局部失败不破坏状态：构造错误前，已获取的载荷句柄必须释放、已预留的
///     接线槽位必须回滚（由各调用点保证）。
/// - **设计权衡 (Trade-offs)**：上下文字段使用 `Cow<'static, str>` 与
///   `&'static str`，静态端点名零分配，动态端点名仅在出错路径付出一次拷贝。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum WeaveError {
    /// 参数不满足操作前置条件，例如向转移型源做共享发射。
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// 违反的前置条件描述，供排障日志使用。
        reason: Cow<'static, str>,
    },

    /// 同一 `(source, sink)` 接线已存在。
    ///
    /// - **意图 (Why)**：重复接线会造成同一载荷向同一汇双份投递，必须在登记期拒绝；
    /// - **契约 (What)**：`source_name`/`sink_name` 为冲突端点名；返回后边列表保持原状。
    #[error("edge `{source_name}` -> `{sink_name}` is already wired")]
    AlreadyExists {
        source_name: Cow<'static, str>,
        sink_name: Cow<'static, str>,
    },

    /// 容量型资源耗尽：运行期接线池无空槽、队列满且调用方不等待、
    /// 转移型源已占用其唯一下游槽位。
    #[error("no space left in {resource}")]
    NoSpace {
        /// 耗尽的资源名称（`connection pool`、`event queue` 等）。
        resource: &'static str,
    },

    /// 请求的接线不存在。
    #[error("edge `{source_name}` -> `{sink_name}` is not wired")]
    NotFound {
        source_name: Cow<'static, str>,
        sink_name: Cow<'static, str>,
    },

    /// 阻塞等待在限期内未等到资格：队列空间、待处理记录或方法完成信号。
    #[error("operation timed out")]
    Timeout,

    /// 处理器或校验器返回的业务失败，基座原样向调用方透传。
    ///
    /// - **契约 (What)**：`code` 由业务方自选并保证稳定；`message` 面向排障人员；
    /// - **风险 (Trade-offs)**：基座不校验业务码命名，重复码值导致的聚合歧义由
    ///   业务方自行治理。
    #[error("{code}: {message}")]
    Application {
        code: &'static str,
        message: Cow<'static, str>,
    },
}

impl WeaveError {
    /// 以静态原因构造参数错误，接线与发射路径的便捷入口。
    pub fn invalid_argument(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// 构造业务自定义错误，保持 `code` 稳定、`message` 可读。
    pub fn application(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Application {
            code,
            message: message.into(),
        }
    }

    /// 返回该错误的稳定错误码。
    ///
    /// # 契约说明
    /// - 除 [`WeaveError::Application`] 透传业务码外，其余码值由 [`codes`] 登记，
    ///   任何版本不得改写既有映射；
    /// - 查询为纯读操作，可在热路径与日志采样中反复调用。
    pub fn code(&self) -> &'static str {
        match self {
            WeaveError::InvalidArgument { .. } => codes::INVALID_ARGUMENT,
            WeaveError::AlreadyExists { .. } => codes::WIRING_ALREADY_EXISTS,
            WeaveError::NoSpace { .. } => codes::NO_SPACE,
            WeaveError::NotFound { .. } => codes::WIRING_NOT_FOUND,
            WeaveError::Timeout => codes::TIMEOUT,
            WeaveError::Application { code, .. } => code,
        }
    }
}

/// 织网基座的稳定错误码集合。
///
/// # 设计背景（Why）
/// - 错误码遵循 `<域>.<语义>` 命名约定，跨组件日志与指标可按前缀聚合；
/// - 码值一经发布即冻结，后续仅允许追加。
///
/// # 契约说明（What）
/// - 实现者应将码值经 [`WeaveError::code`] 暴露，不在业务代码中直接比较字符串
///   字面量；
/// - 业务自定义码（经 [`WeaveError::Application`]）不得复用本模块前缀 `fabric.` 与
///   `wiring.`。
pub mod codes {
    /// 参数不满足前置条件。
    pub const INVALID_ARGUMENT: &str = "fabric.invalid_argument";
    /// 接线已存在。
    pub const WIRING_ALREADY_EXISTS: &str = "wiring.already_exists";
    /// 容量耗尽（接线池、事件队列或转移槽位）。
    pub const NO_SPACE: &str = "fabric.no_space";
    /// 接线不存在。
    pub const WIRING_NOT_FOUND: &str = "wiring.not_found";
    /// 阻塞等待超时。
    pub const TIMEOUT: &str = "fabric.timeout";
}
