//! Call-depth limiting for guest code.
//!
//! Guest recursion is executed on the Rust stack, so unbounded recursion
//! would overflow it. The limiter turns that into a guest `RecursionError`.

use crate::runtime::exceptions::{self, raise};
use crate::runtime::VmResult;

/// Default maximum depth of nested guest function calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Tracks the depth of nested guest calls.
#[derive(Debug, Clone)]
pub struct CallDepthLimiter {
    /// Maximum call depth.
    max_depth: usize,
    /// Current call depth.
    current_depth: usize,
    /// Peak call depth (highest ever seen).
    peak_depth: usize,
    /// Whether the limit has been hit.
    limit_exceeded: bool,
}

impl CallDepthLimiter {
    /// Create a new limiter with the specified maximum depth.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            current_depth: 0,
            peak_depth: 0,
            limit_exceeded: false,
        }
    }

    /// Enter a call frame, raising `RecursionError` past the limit.
    pub fn enter(&mut self) -> VmResult<()> {
        if self.current_depth >= self.max_depth {
            self.limit_exceeded = true;
            return raise(
                &exceptions::RECURSION_ERROR,
                "maximum recursion depth exceeded",
            );
        }
        self.current_depth += 1;
        self.peak_depth = self.peak_depth.max(self.current_depth);
        Ok(())
    }

    /// Leave a call frame entered with [`enter`](Self::enter).
    pub fn exit(&mut self) {
        self.current_depth = self.current_depth.saturating_sub(1);
    }

    /// Check if the limit has been hit.
    pub fn limit_exceeded(&self) -> bool {
        self.limit_exceeded
    }

    /// Get the current call depth.
    pub fn current_depth(&self) -> usize {
        self.current_depth
    }

    /// Get the peak call depth (highest ever observed).
    pub fn peak_depth(&self) -> usize {
        self.peak_depth
    }

    /// Get the configured maximum depth.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

impl Default for CallDepthLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALL_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_allows_within_limit() {
        let mut limiter = CallDepthLimiter::new(2);

        assert!(limiter.enter().is_ok());
        assert!(limiter.enter().is_ok());
        assert!(!limiter.limit_exceeded());
        assert_eq!(limiter.peak_depth(), 2);
    }

    #[test]
    fn test_limiter_denies_over_limit() {
        let mut limiter = CallDepthLimiter::new(1);

        assert!(limiter.enter().is_ok());
        let err = limiter.enter().unwrap_err();
        assert!(err
            .as_exception()
            .is_some_and(|e| e.is_instance(&exceptions::RECURSION_ERROR)));
        assert!(limiter.limit_exceeded());
        assert_eq!(limiter.current_depth(), 1);
    }

    #[test]
    fn test_exit_restores_depth() {
        let mut limiter = CallDepthLimiter::default();
        limiter.enter().unwrap();
        limiter.exit();
        limiter.exit();
        assert_eq!(limiter.current_depth(), 0);
        assert_eq!(limiter.max_depth(), DEFAULT_MAX_CALL_DEPTH);
    }
}
