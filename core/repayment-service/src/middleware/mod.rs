// core/repayment-service/src/middleware/mod.rs
// Service-specific middleware; rate limiting and metrics live in loanpay-common

pub mod auth;
