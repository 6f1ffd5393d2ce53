// Adapters layer: concrete implementations for external systems (http APIs, local storage).

pub mod http;
pub mod storage;
