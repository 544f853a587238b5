use thiserror::Error;

/// 动作被拒绝时返回的错误
///
/// 所有错误都是单个动作级别可恢复的：被拒绝的动作不会修改房间状态，
/// 错误只报告给提交动作的玩家，不影响其他人。
/// 引擎内部的不变量被破坏属于缺陷（用断言处理），不在此列。
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum GameError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("Game already started or finished")]
    GameAlreadyStarted,
    #[error("Need at least {min} players to start, currently {current}")]
    NotEnoughPlayers { min: usize, current: usize },
    #[error("Game is not active")]
    GameNotActive,
    #[error("Action not allowed in the current phase")]
    WrongPhase,
    #[error("Not your turn")]
    NotYourTurn,
    #[error("Invalid hand index or empty slot")]
    InvalidHandIndex,
    #[error("Card not in hand or already eliminated")]
    CardNotInHand,
    #[error("Resolve your pending draw or ability first")]
    PendingActionExists,
    #[error("Deck is empty and cannot be reshuffled")]
    DeckExhausted,
    #[error("Discard pile is empty")]
    EmptyDiscardPile,
    #[error("Not enough cards in the deck to deal all hands")]
    InsufficientCards,
    #[error("You must swap when drawing from the discard pile")]
    MustSwapDiscardDraw,
    #[error("Cambio has already been called")]
    CambioAlreadyCalled,
    #[error("Cannot swap with a player who called Cambio")]
    CambioImmunity,
    #[error("Invalid ability usage")]
    InvalidAbilityUsage,
    #[error("No pending ability")]
    NoPendingAbility,
    #[error("No pending drawn card")]
    NoPendingDraw,
    #[error("No pending swap decision")]
    NoPendingSwapDecision,
    #[error("Game is not finished yet")]
    GameNotFinished,
    #[error("Player not found in this room")]
    PlayerNotFound,
}
