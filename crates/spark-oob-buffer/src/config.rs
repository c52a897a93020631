//! 句柄构造选项。
//!
//! `HandleOptions` 可以直接嵌入宿主的 TOML/JSON 配置：
//!
//! ```toml
//! access = "read_only"
//! require_contiguous = "c"
//! ```

use serde::Deserialize;

use crate::descriptor::ContiguityOrder;

/// 句柄向导出方请求视图时采用的访问策略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    /// 先请求可写视图，导出方只读或暂时拒绝写访问时降级为只读视图。
    #[default]
    PreferWritable,
    /// 只请求只读视图。
    ReadOnly,
    /// 只接受可写视图，导出方无法提供时构造失败。
    RequireWritable,
}

/// 构造 [`BufferHandle`](crate::BufferHandle) 的可选参数。
///
/// # 契约说明（What）
/// - `access`：访问策略，默认 [`AccessPolicy::PreferWritable`]；
/// - `require_contiguous`：若设置，视图必须在该顺序下连续，否则视图被归还、构造以
///   [`ExportErrorKind::NotContiguous`](crate::ExportErrorKind::NotContiguous) 失败。
///   面向需要紧密字节的零拷贝传输。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HandleOptions {
    pub access: AccessPolicy,
    pub require_contiguous: Option<ContiguityOrder>,
}

impl HandleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_access(mut self, access: AccessPolicy) -> Self {
        self.access = access;
        self
    }

    pub fn with_require_contiguous(mut self, order: ContiguityOrder) -> Self {
        self.require_contiguous = Some(order);
        self
    }
}
