//! 영속성 계층.
//!
//! `trader_core::TokenStore`의 PostgreSQL 구현과 스키마 마이그레이션을 제공합니다.

pub mod storage;

pub use storage::{migrate, EtradeTokenRepository};
