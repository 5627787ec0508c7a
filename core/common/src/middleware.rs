// core/common/src/middleware.rs
// Rate limiting and request metrics middleware shared by services

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::logging::log_rate_limit_exceeded;
use crate::metrics::{MetricsTimer, ServiceMetrics};
use crate::rate_limit::{RateLimit, RateLimitError, RateLimiter};

// ============================================================================
// RATE LIMITING
// ============================================================================

pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let limiter = self.limiter.clone();
        let service = self.service.clone();
        let endpoint = req.path().to_string();

        // Unlimited endpoints skip the limiter entirely
        if !limiter.has_limit(&endpoint) {
            return Box::pin(async move { service.call(req).await });
        }

        let key = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        Box::pin(async move {
            match limiter.check_rate_limit(&endpoint, &key).await {
                Ok(info) => {
                    let mut res = service.call(req).await?;

                    let headers = res.headers_mut();
                    for (name, value) in info.to_headers() {
                        if let (Ok(name), Ok(value)) = (
                            HeaderName::from_bytes(name.as_bytes()),
                            HeaderValue::from_str(&value),
                        ) {
                            headers.insert(name, value);
                        }
                    }

                    Ok(res)
                }
                Err(RateLimitError::LimitExceeded(msg)) => {
                    log_rate_limit_exceeded(&endpoint, &key);
                    Err(ServiceError::RateLimitExceeded(msg).into())
                }
                // Limit vanished between has_limit and check; fail open
                Err(RateLimitError::NoLimitConfigured(_)) => service.call(req).await,
            }
        })
    }
}

/// Register limits for the endpoints that trigger SMS or money movement
pub fn configure_rate_limits(limiter: &mut RateLimiter, otp_per_minute: u32) {
    limiter.add_limit("/auth/otp/send", RateLimit::per_minute(otp_per_minute));
    limiter.add_limit("/auth/otp/verify", RateLimit::per_minute(otp_per_minute * 2));
    limiter.add_limit("/payments/initiate", RateLimit::per_minute(10));
    limiter.add_limit("/auth/lookup", RateLimit::per_minute(30));
}

// ============================================================================
// METRICS
// ============================================================================

pub struct MetricsMiddleware {
    metrics: Rc<ServiceMetrics>,
}

impl MetricsMiddleware {
    pub fn new(metrics: ServiceMetrics) -> Self {
        Self {
            metrics: Rc::new(metrics),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Rc::new(service),
            metrics: self.metrics.clone(),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Rc<S>,
    metrics: Rc<ServiceMetrics>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let metrics = self.metrics.clone();
        let service = self.service.clone();

        let method = req.method().to_string();
        // Route pattern keeps path parameters out of label cardinality
        let endpoint = req
            .match_pattern()
            .unwrap_or_else(|| req.path().to_string());

        let timer = MetricsTimer::new();

        Box::pin(async move {
            let result = service.call(req).await;
            let duration = timer.elapsed_seconds();

            match &result {
                Ok(response) => {
                    let status = response.status();
                    metrics.record_http_request(&method, &endpoint, status.as_u16(), duration);
                    if status.is_server_error() {
                        metrics.record_error("server_error", &endpoint);
                    }
                }
                Err(err) => {
                    let status = err.as_response_error().status_code().as_u16();
                    metrics.record_http_request(&method, &endpoint, status, duration);
                    metrics.record_error("unhandled", &endpoint);
                }
            }

            result
        })
    }
}
