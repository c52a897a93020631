//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 将缓冲句柄生命周期中的三类失败（导出失败、句柄已释放、导出方释放失败）集中定义，
//!   让序列化层能够据此决定“回退为内联拷贝”或“直接上报”。
//! - 每个错误都携带稳定错误码（见 [`codes`]），与 `spark-core` 的 `<域>.<语义>` 命名约定保持一致，
//!   便于日志与指标系统聚合。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，兼容 `std::error::Error`；
//! - 显式调用路径上的错误一律以 `Result` 返回，只有 `Drop` 中的隐式释放会吞掉错误并记录日志；
//! - 不做任何内部重试。

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// 缓冲句柄使用的稳定错误码集合。
///
/// 命名沿用 `<领域>.<语义>`，调用方应通过 `code()` 比较而非解析错误消息。
pub mod codes {
    /// 导出方完全不具备缓冲导出能力。
    pub const EXPORT_UNSUPPORTED: &str = "buffer.export.unsupported";
    /// 导出方仅支持只读视图，拒绝可写请求。
    pub const EXPORT_READ_ONLY: &str = "buffer.export.read_only";
    /// 导出方暂时拒绝访问（已有冲突的导出）。
    pub const EXPORT_BUSY: &str = "buffer.export.busy";
    /// 视图不满足调用方要求的连续性。
    pub const EXPORT_NOT_CONTIGUOUS: &str = "buffer.export.not_contiguous";
    /// 导出方返回的描述符自相矛盾。
    pub const EXPORT_MALFORMED: &str = "buffer.export.malformed";
    /// 在已释放的句柄上执行操作。
    pub const RELEASED: &str = "buffer.released";
    /// 导出方在释放视图时报告失败。
    pub const RELEASE_FAILED: &str = "buffer.release_failed";
    /// 视图不连续，无法扁平化为单个字节切片。
    pub const NOT_CONTIGUOUS: &str = "buffer.not_contiguous";
    /// 视图为只读，拒绝可变访问。
    pub const READ_ONLY: &str = "buffer.read_only";
}

/// 导出失败的细分类别。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ExportErrorKind {
    /// 源对象不支持缓冲导出。
    Unsupported,
    /// 请求了可写视图，但源对象只读。
    ReadOnly,
    /// 源对象当前持有冲突的导出，暂时拒绝访问。
    Busy,
    /// 视图不满足 [`HandleOptions`](crate::HandleOptions) 要求的连续性。
    NotContiguous,
    /// 导出方返回的描述符不一致。
    Malformed,
}

impl ExportErrorKind {
    /// 返回对应的稳定错误码。
    pub fn code(self) -> &'static str {
        match self {
            ExportErrorKind::Unsupported => codes::EXPORT_UNSUPPORTED,
            ExportErrorKind::ReadOnly => codes::EXPORT_READ_ONLY,
            ExportErrorKind::Busy => codes::EXPORT_BUSY,
            ExportErrorKind::NotContiguous => codes::EXPORT_NOT_CONTIGUOUS,
            ExportErrorKind::Malformed => codes::EXPORT_MALFORMED,
        }
    }
}

impl fmt::Display for ExportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 源对象无法或不愿导出缓冲视图。
///
/// # 教案式说明
/// - **意图 (Why)**：序列化层在收到该错误时通常回退为内联拷贝，因此需要区分“永久不支持”
///   （[`ExportErrorKind::Unsupported`]）与“暂时冲突”（[`ExportErrorKind::Busy`]）。
/// - **契约 (What)**：构造失败时不会产生半初始化的句柄，也不会继续持有源对象的引用。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct ExportError {
    kind: ExportErrorKind,
    detail: Cow<'static, str>,
}

impl ExportError {
    /// 构造指定类别的导出错误。
    pub fn new(kind: ExportErrorKind, detail: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn unsupported(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ExportErrorKind::Unsupported, detail)
    }

    pub fn read_only(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ExportErrorKind::ReadOnly, detail)
    }

    pub fn busy(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ExportErrorKind::Busy, detail)
    }

    pub fn malformed(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ExportErrorKind::Malformed, detail)
    }

    /// 失败类别。
    pub fn kind(&self) -> ExportErrorKind {
        self.kind
    }

    /// 人类可读的补充说明。
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// 在已释放的句柄上调用了需要 `Live` 状态的操作。
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("operation `{op}` forbidden on released buffer handle")]
pub struct ReleasedError {
    op: &'static str,
}

impl ReleasedError {
    pub(crate) fn new(op: &'static str) -> Self {
        Self { op }
    }

    /// 被拒绝的操作名称。
    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn code(&self) -> &'static str {
        codes::RELEASED
    }
}

/// 导出方在释放视图时报告失败。
///
/// 即便返回该错误，句柄也已经进入 `Released` 状态并放弃了对源对象的引用；
/// 该错误只说明导出方自身的记账出现了不一致。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("exporter failed to release view: {detail}")]
pub struct ReleaseError {
    detail: Cow<'static, str>,
}

impl ReleaseError {
    pub fn new(detail: impl Into<Cow<'static, str>>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn code(&self) -> &'static str {
        codes::RELEASE_FAILED
    }
}

/// 原始内存访问类操作（`as_slice`、`as_mut_slice`、`to_bytes`）的聚合错误。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandleError {
    /// 句柄已释放。
    #[error(transparent)]
    Released(#[from] ReleasedError),
    /// 视图在 C 与 F 两种顺序下都不连续，无法暴露为单个切片。
    #[error("cannot extract raw buffer from non-contiguous view")]
    NotContiguous,
    /// 视图为只读。
    #[error("buffer view is read-only")]
    ReadOnly,
}

impl HandleError {
    pub fn code(&self) -> &'static str {
        match self {
            HandleError::Released(err) => err.code(),
            HandleError::NotContiguous => codes::NOT_CONTIGUOUS,
            HandleError::ReadOnly => codes::READ_ONLY,
        }
    }
}
