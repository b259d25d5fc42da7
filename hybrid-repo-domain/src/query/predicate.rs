use crate::error::{DomainError, DomainResult};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// 规约模式的核心 trait
///
/// 用于封装业务规则，使其可复用、可组合和可测试
pub trait Specification<T>: Send + Sync {
    /// 检查候选对象是否满足规约
    fn is_satisfied_by(&self, candidate: &T) -> bool;
}

impl<T> Specification<T> for Arc<dyn Specification<T>> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.as_ref().is_satisfied_by(candidate)
    }
}

/// AND 组合规约
///
/// 当两个规约都满足时，组合规约才满足
pub struct AndSpecification<T> {
    left: Arc<dyn Specification<T>>,
    right: Arc<dyn Specification<T>>,
}

impl<T> AndSpecification<T> {
    pub fn new(left: Arc<dyn Specification<T>>, right: Arc<dyn Specification<T>>) -> Self {
        Self { left, right }
    }
}

impl<T> Specification<T> for AndSpecification<T> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.left.is_satisfied_by(candidate) && self.right.is_satisfied_by(candidate)
    }
}

/// OR 组合规约
///
/// 当任意一个规约满足时，组合规约就满足
pub struct OrSpecification<T> {
    left: Arc<dyn Specification<T>>,
    right: Arc<dyn Specification<T>>,
}

impl<T> OrSpecification<T> {
    pub fn new(left: Arc<dyn Specification<T>>, right: Arc<dyn Specification<T>>) -> Self {
        Self { left, right }
    }
}

impl<T> Specification<T> for OrSpecification<T> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.left.is_satisfied_by(candidate) || self.right.is_satisfied_by(candidate)
    }
}

/// NOT 规约
///
/// 当内部规约不满足时，NOT 规约才满足
pub struct NotSpecification<T> {
    inner: Arc<dyn Specification<T>>,
}

impl<T> NotSpecification<T> {
    pub fn new(inner: Arc<dyn Specification<T>>) -> Self {
        Self { inner }
    }
}

impl<T> Specification<T> for NotSpecification<T> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        !self.inner.is_satisfied_by(candidate)
    }
}

struct FnSpecification<F>(F);

impl<T, F> Specification<T> for FnSpecification<F>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        (self.0)(candidate)
    }
}

/// 仓储读写接口接收的过滤条件
///
/// `Predicate::default()` 表示“缺失的条件”：需要条件的操作会在任何 I/O 之前
/// 以 `DomainError::InvalidArgument` 失败。
pub struct Predicate<T> {
    spec: Option<Arc<dyn Specification<T>>>,
    label: Option<Cow<'static, str>>,
}

impl<T: 'static> Predicate<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            spec: Some(Arc::new(FnSpecification(f))),
            label: None,
        }
    }

    /// 带描述的条件，描述会出现在诊断日志中
    pub fn labeled<F>(label: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::new(f).with_label(label)
    }

    pub fn from_spec<S>(spec: S) -> Self
    where
        S: Specification<T> + 'static,
    {
        Self {
            spec: Some(Arc::new(spec)),
            label: None,
        }
    }

    /// 匹配全部
    pub fn always() -> Self {
        Self::labeled("true", |_| true)
    }

    /// 缺失的条件
    pub fn absent() -> Self {
        Self {
            spec: None,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_present(&self) -> bool {
        self.spec.is_some()
    }

    pub fn and(self, other: Predicate<T>) -> Self {
        let label = Self::combine_labels(&self, &other, "&&");
        match (self.spec, other.spec) {
            (Some(left), Some(right)) => Self {
                spec: Some(Arc::new(AndSpecification::new(left, right))),
                label,
            },
            _ => Self::absent(),
        }
    }

    pub fn or(self, other: Predicate<T>) -> Self {
        let label = Self::combine_labels(&self, &other, "||");
        match (self.spec, other.spec) {
            (Some(left), Some(right)) => Self {
                spec: Some(Arc::new(OrSpecification::new(left, right))),
                label,
            },
            _ => Self::absent(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        let label = self.label.as_ref().map(|l| Cow::Owned(format!("!({l})")));
        match self.spec {
            Some(inner) => Self {
                spec: Some(Arc::new(NotSpecification::new(inner))),
                label,
            },
            None => Self::absent(),
        }
    }

    /// 缺失的条件不匹配任何对象
    pub fn matches(&self, candidate: &T) -> bool {
        self.spec
            .as_ref()
            .is_some_and(|spec| spec.is_satisfied_by(candidate))
    }

    pub(crate) fn require(&self, operation: &str) -> DomainResult<()> {
        if self.is_present() {
            Ok(())
        } else {
            Err(DomainError::invalid_argument(format!(
                "{operation}: predicate is required"
            )))
        }
    }

    fn combine_labels(
        left: &Predicate<T>,
        right: &Predicate<T>,
        op: &str,
    ) -> Option<Cow<'static, str>> {
        match (&left.label, &right.label) {
            (None, None) => None,
            (l, r) => Some(Cow::Owned(format!(
                "({}) {op} ({})",
                l.as_deref().unwrap_or("<predicate>"),
                r.as_deref().unwrap_or("<predicate>")
            ))),
        }
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            label: self.label.clone(),
        }
    }
}

impl<T> Default for Predicate<T> {
    fn default() -> Self {
        Self {
            spec: None,
            label: None,
        }
    }
}

impl<T> From<Option<Predicate<T>>> for Predicate<T> {
    fn from(value: Option<Predicate<T>>) -> Self {
        value.unwrap_or_default()
    }
}

impl<T> fmt::Display for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.spec, &self.label) {
            (None, _) => f.write_str("<absent>"),
            (Some(_), Some(label)) => f.write_str(label),
            (Some(_), None) => f.write_str("<predicate>"),
        }
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate")
            .field(&format_args!("{self}"))
            .finish()
    }
}
