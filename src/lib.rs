// lib.rs
//
// ================================================================================
// NapCat Adapter - QQ notice 事件适配层
//
// 上游：NapCat (OneBot v11) 正向 WebSocket
// 下游：MaiBot 消息总线
// 职责：notice 规范化 | 禁言跟踪 | 自然解禁播报 | 有界投递与重试
// ================================================================================

pub mod access;
pub mod adapters;
pub mod ban;
pub mod clock;
pub mod config;
pub mod db;
pub mod delivery;
pub mod envelope;
pub mod event;
pub mod fetcher;
pub mod log;
pub mod matcher;
pub mod notice;
pub mod scheduler;

#[cfg(test)]
mod testing;
