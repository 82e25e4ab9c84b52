//! 브로커 커넥터 구현.

pub mod etrade;
