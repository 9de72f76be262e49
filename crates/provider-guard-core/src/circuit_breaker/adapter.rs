//! Function adapter that routes every call through a breaker.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::{CircuitBreaker, CircuitBreakerError};

/// A function whose every call goes through [`CircuitBreaker::execute`].
///
/// Built by [`with_circuit_breaker`]. Functions of several arguments take
/// them as a tuple.
pub struct ProtectedCall<F> {
    inner: F,
    breaker: Arc<CircuitBreaker>,
}

impl<F> ProtectedCall<F> {
    /// Invoke the wrapped function under the breaker.
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, CircuitBreakerError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.breaker.execute(|| (self.inner)(args)).await
    }

    /// Breaker guarding the calls.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

impl<F: Clone> Clone for ProtectedCall<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            breaker: Arc::clone(&self.breaker),
        }
    }
}

impl<F> fmt::Debug for ProtectedCall<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectedCall")
            .field("provider", self.breaker.provider())
            .finish_non_exhaustive()
    }
}

/// Wrap `f` so each call is gated by `breaker`.
///
/// # Examples
///
/// ```rust
/// use provider_guard_core::circuit_breaker::{create_circuit_breaker, with_circuit_breaker};
/// use std::sync::Arc;
///
/// # async fn example() {
/// let breaker = Arc::new(create_circuit_breaker("anthropic", None));
/// let complete = with_circuit_breaker(
///     |(prompt, max_tokens): (String, u32)| async move {
///         Ok::<_, std::io::Error>(format!("{prompt}:{max_tokens}"))
///     },
///     breaker,
/// );
///
/// assert_eq!(complete.call(("hello".to_string(), 16)).await.unwrap(), "hello:16");
/// # }
/// ```
pub fn with_circuit_breaker<F>(f: F, breaker: Arc<CircuitBreaker>) -> ProtectedCall<F> {
    ProtectedCall { inner: f, breaker }
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
