use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::time::Instant;

use crate::error::Error;

#[derive(Debug)]
struct WindowState {
    start: Instant,
    count: u32,
}

/// Fixed one-second window shared by every route the layer wraps.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    window: Arc<Mutex<WindowState>>,
}

impl RateLimiter {
    pub fn new(rps: u32) -> Self {
        Self {
            rps: rps.max(1),
            window: Arc::new(Mutex::new(WindowState {
                start: Instant::now(),
                count: 0,
            })),
        }
    }

    pub fn allow(&self) -> bool {
        let mut guard = self.window.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        if now.duration_since(guard.start) >= Duration::from_secs(1) {
            guard.start = now;
            guard.count = 0;
        }
        if guard.count < self.rps {
            guard.count += 1;
            true
        } else {
            false
        }
    }
}

pub async fn rps_middleware(
    State(state): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.allow() {
        tracing::warn!(path = %req.uri().path(), "rate limit exceeded");
        return Error::RateLimited.into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn window_resets_every_second() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert!(limiter.allow());
    }
}
