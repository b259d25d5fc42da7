use bon::Builder;
use serde::{Deserialize, Serialize};

/// 单次读取的查询选项
///
/// 缺省（`None`）等价于两个开关均为 `false`：结果被跟踪，并应用默认预加载。
#[derive(Builder, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// 读取结果不加入变更跟踪
    #[builder(default)]
    #[serde(default)]
    no_tracking: bool,
    /// 不应用实体配置的默认预加载
    #[builder(default)]
    #[serde(default)]
    ignore_auto_includes: bool,
}

impl QueryOptions {
    pub const fn new() -> Self {
        Self {
            no_tracking: false,
            ignore_auto_includes: false,
        }
    }

    /// 只读查询：不跟踪
    pub const fn no_tracking() -> Self {
        Self {
            no_tracking: true,
            ignore_auto_includes: false,
        }
    }

    pub const fn without_auto_includes() -> Self {
        Self {
            no_tracking: false,
            ignore_auto_includes: true,
        }
    }

    pub const fn is_no_tracking(&self) -> bool {
        self.no_tracking
    }

    pub const fn is_ignore_auto_includes(&self) -> bool {
        self.ignore_auto_includes
    }

    pub(crate) fn resolve(options: Option<Self>) -> Self {
        options.unwrap_or_default()
    }
}
