//! 熔断器
//!
//! Closed：正常放行，连续失败达到阈值后打开；
//! Open：在熔断时长内直接拒绝调用（`ResilienceError::CircuitOpen`）；
//! HalfOpen：熔断时长过后放行一次试探调用，成功则关闭，失败则重新打开。
//!
use std::borrow::Cow;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, thiserror::Error)]
pub enum ResilienceError<E> {
    #[error("circuit {circuit} is open, calls blocked for another {remaining:?}")]
    CircuitOpen { circuit: String, remaining: Duration },
    #[error("{0}")]
    Inner(E),
}

impl<E> ResilienceError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            ResilienceError::Inner(err) => Some(err),
            ResilienceError::CircuitOpen { .. } => None,
        }
    }
}

#[derive(Debug)]
enum Circuit {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen { probing: bool },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: Cow<'static, str>,
    failure_threshold: u32,
    break_duration: Duration,
    circuit: Mutex<Circuit>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        failure_threshold: u32,
        break_duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            break_duration,
            circuit: Mutex::new(Circuit::Closed { failures: 0 }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        match *self.lock() {
            Circuit::Closed { .. } => CircuitState::Closed,
            Circuit::Open { until } if Instant::now() >= until => CircuitState::HalfOpen,
            Circuit::Open { .. } => CircuitState::Open,
            Circuit::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// 所有错误都计入失败
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, ResilienceError<E>>
    where
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_if(|_| true, op).await
    }

    /// 只有 `is_handled` 认可的错误计入失败
    pub async fn call_if<T, E, F, Fut, P>(
        &self,
        is_handled: P,
        op: F,
    ) -> Result<T, ResilienceError<E>>
    where
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut trial = TrialGuard {
            breaker: self,
            armed: self.permit()?,
        };
        let outcome = op().await;
        trial.armed = false;
        match outcome {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                if is_handled(&err) {
                    self.on_failure(&err);
                } else {
                    self.release_trial();
                }
                Err(ResilienceError::Inner(err))
            }
        }
    }

    /// 放行时返回本次调用是否为半开试探
    fn permit<E>(&self) -> Result<bool, ResilienceError<E>> {
        let mut circuit = self.lock();
        match *circuit {
            Circuit::Closed { .. } => Ok(false),
            Circuit::Open { until } => {
                let now = Instant::now();
                if now >= until {
                    tracing::info!(circuit = %self.name, "circuit half-open, allowing a trial call");
                    *circuit = Circuit::HalfOpen { probing: true };
                    Ok(true)
                } else {
                    Err(self.rejected(until - now))
                }
            }
            Circuit::HalfOpen { probing: false } => {
                *circuit = Circuit::HalfOpen { probing: true };
                Ok(true)
            }
            Circuit::HalfOpen { probing: true } => Err(self.rejected(Duration::ZERO)),
        }
    }

    fn on_success(&self) {
        let mut circuit = self.lock();
        if !matches!(*circuit, Circuit::Closed { .. }) {
            tracing::info!(circuit = %self.name, "circuit reset, allowing calls again");
        }
        *circuit = Circuit::Closed { failures: 0 };
    }

    fn on_failure(&self, err: &impl Display) {
        let mut circuit = self.lock();
        let failures = match *circuit {
            Circuit::Closed { failures } => failures + 1,
            Circuit::HalfOpen { .. } => self.failure_threshold,
            Circuit::Open { .. } => return,
        };

        if failures >= self.failure_threshold {
            tracing::warn!(
                circuit = %self.name,
                failures,
                break_secs = self.break_duration.as_secs_f64(),
                error = %err,
                "circuit opened, blocking calls"
            );
            *circuit = Circuit::Open {
                until: Instant::now() + self.break_duration,
            };
        } else {
            *circuit = Circuit::Closed { failures };
        }
    }

    fn release_trial(&self) {
        let mut circuit = self.lock();
        if let Circuit::HalfOpen { probing } = &mut *circuit {
            *probing = false;
        }
    }

    fn rejected<E>(&self, remaining: Duration) -> ResilienceError<E> {
        ResilienceError::CircuitOpen {
            circuit: self.name.to_string(),
            remaining,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// 试探调用的 future 被丢弃（超时、select!）时归还试探名额
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(circuit = %self.breaker.name, "trial call abandoned");
            self.breaker.release_trial();
        }
    }
}
