//! # Cambio 核心逻辑库
//!
//! 这个 `core` crate 包含了 Cambio 纸牌游戏的所有核心状态管理、
//! 回合状态机、能力结算、淘汰规则、计分逻辑，
//! 以及客户端-服务器通信消息的定义。
//! 它的设计目标是与具体实现（如网络服务器、客户端UI）解耦：
//! 引擎本身不做任何 I/O，每个动作同步地修改房间状态，
//! 并返回一组待分发的事件（`Effect`），由上层传输层异步发送。
//!
//! 并发约定：同一房间的状态修改必须被串行化（上层用锁或 actor 保证），
//! 不同房间之间完全独立。

mod card;
mod error;
mod logic;
mod message;
mod state;

pub use card::*;

pub use error::*;

pub use message::*;

pub use state::*;
