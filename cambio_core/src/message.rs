use crate::card::{Ability, Card};
use crate::state::{DrawSource, PlayerId, Room, SlotRef};
use serde::{Deserialize, Serialize};

// --- 客户端 -> 服务器 的消息 ---
// 每个游戏动作对应一个带强类型字段的变体，
// 在边界处完成反序列化校验，引擎内部不再出现"字段可能缺失"的情况。

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ClientMessage {
    /// WebSocket 连接后的第一条消息，把连接绑定到房间里的某个玩家
    Join { player_id: PlayerId },
    /// 请求开始游戏（人数足够时）
    StartGame,
    /// 结束看牌阶段，进入正式回合（任何玩家都可发起，重复发送无副作用）
    EndViewing,
    /// 从牌堆抽一张牌
    DrawFromDeck,
    /// 从弃牌堆抽走堆顶的牌（之后必须换进手牌）
    DrawFromDiscard,
    /// 处理刚抽到的牌：换进手牌或直接弃掉
    ResolveDraw { resolution: DrawResolution },
    /// 使用待处理的能力
    UseAbility { targets: AbilityTargets },
    /// `LookAndSwap` 看过两张牌后，决定是否交换
    ResolveSwapDecision { swap: bool },
    /// 放弃待处理的能力
    SkipAbility,
    /// 叫 Cambio，宣布这是最后一轮
    CallCambio,
    /// 牺牲：把自己手里一张与弃牌堆顶同点数的牌打出去
    PlayCard { card_index: usize },
    /// 淘汰：指认任何玩家（含自己）手里与弃牌堆顶同点数的牌；
    /// 淘汰别人的牌时必须从自己手里选一张补给对方
    EliminateCard {
        target_player_id: PlayerId,
        card_index: usize,
        replacement_card_index: Option<usize>,
    },
    /// 主动把自己的一张牌亮给所有人看（记忆博弈的一部分）
    RevealCard { card_index: usize },
    /// 一局结束后重开，回到等待大厅
    PlayAgain,
    /// 请求当前完整游戏状态
    GameStateRequest,
}

/// 抽牌后的两种处理方式
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawResolution {
    /// 与手牌第 `card_index` 张交换，原牌进弃牌堆（换牌不触发能力）
    Swap { card_index: usize },
    /// 直接弃掉抽到的牌（只允许从牌堆抽的牌；可能触发能力）
    Discard,
}

/// 各能力的目标载荷，变体必须与玩家当前待处理的能力匹配
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbilityTargets {
    PeekSelf { card_index: usize },
    PeekOther { target_player_id: PlayerId, card_index: usize },
    /// 盲换是全局的：任意两名玩家的任意两个槽位
    BlindSwap { source: SlotRef, target: SlotRef },
    LookAndSwap { first: SlotRef, second: SlotRef },
}

// --- 服务器 -> 客户端 的消息 ---
// 引擎把这些事件连同受众一起返回给传输层，由传输层异步分发。

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ServerMessage {
    /// 新玩家加入了房间
    PlayerJoined { player_id: PlayerId, username: String },
    /// 玩家断开连接
    PlayerLeft { player_id: PlayerId },
    /// 游戏开始，进入看牌阶段
    GameStarted,
    /// 看牌阶段结束，正式回合开始
    RoundStarted,
    /// 私发给抽牌玩家：抽到的牌
    CardDrawn { card: Card, source: DrawSource },
    /// 广播给其他人：有人抽了牌（不含牌面）
    PlayerDrewCard { player_id: PlayerId, source: DrawSource },
    /// 牌堆耗尽后弃牌堆被重新洗入
    DeckReshuffled,
    /// 两个槽位的牌被交换（或抽牌换进手牌，此时 second 为 None）
    CardsSwapped {
        message: String,
        first: SlotRef,
        second: Option<SlotRef>,
    },
    /// 回合结束，轮到下一位玩家
    TurnEnded {
        current_turn: Option<PlayerId>,
        turn_number: u32,
    },
    /// 私发：弃掉的牌带有能力，可以使用或放弃
    AbilityOpportunity { ability: Ability },
    /// 私发：能力结算结果（偷看/先看后换时附带亮出的牌）
    AbilityResolution {
        ability: Ability,
        reveals: Vec<RevealedSlot>,
    },
    /// 广播：某个槽位正在被偷看（不含牌面）
    CardBeingLookedAt { player_id: PlayerId, target: SlotRef },
    /// `LookAndSwap` 的发起者决定不交换
    SwapDeclined { player_id: PlayerId },
    /// 有玩家叫了 Cambio
    CambioCalled { player_id: PlayerId, message: String },
    /// 牺牲成功：一张手牌进了弃牌堆
    CardPlayed { player_id: PlayerId, card: Card },
    /// 淘汰成功
    CardEliminated {
        initiator: PlayerId,
        target: SlotRef,
        removed_card: Card,
        /// 淘汰他人的牌时，发起者是否把自己的牌补进了目标槽位
        replacement_given: bool,
        message: String,
    },
    /// 私发：指认错误，被罚抽一张牌
    WrongSacrificePenalty { message: String },
    /// 广播给其他人：有人指认错误被罚牌
    PlayerPenaltyDraw { player_id: PlayerId, message: String },
    /// 玩家主动亮牌
    CardRevealed { player_id: PlayerId, card: Card },
    /// 一局结束（瞬间胜利或 Cambio 结算）
    GameEnded {
        winner_id: PlayerId,
        winner_username: String,
    },
    /// 房间重置，回到等待大厅
    GameReset { message: String },
    /// 完整游戏状态快照（发送前按接收方净化）
    GameStateSnapshot { room: Room, your_player_id: PlayerId },
    Info { message: String },
    Error { message: String },
}

/// 能力结算时亮出的一个槽位
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct RevealedSlot {
    pub slot: SlotRef,
    pub card: Card,
}

// --- 事件分发模型 ---

/// 事件的接收范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// 只发给动作发起者
    Private(PlayerId),
    /// 发给房间内所有人（可排除某个玩家）
    Broadcast { exclude: Option<PlayerId> },
    /// 定向发给动作发起者之外的某个玩家（例如牌被偷看的一方）
    Targeted(PlayerId),
}

/// 引擎返回的待分发事件：状态修改完成后由传输层异步发送
#[derive(Debug, Clone)]
pub struct Effect {
    pub audience: Audience,
    pub message: ServerMessage,
}

impl Effect {
    pub fn private(player_id: PlayerId, message: ServerMessage) -> Effect {
        Effect { audience: Audience::Private(player_id), message }
    }

    pub fn broadcast(message: ServerMessage) -> Effect {
        Effect { audience: Audience::Broadcast { exclude: None }, message }
    }

    pub fn broadcast_except(player_id: PlayerId, message: ServerMessage) -> Effect {
        Effect { audience: Audience::Broadcast { exclude: Some(player_id) }, message }
    }

    pub fn targeted(player_id: PlayerId, message: ServerMessage) -> Effect {
        Effect { audience: Audience::Targeted(player_id), message }
    }
}

// --- 单元测试 ---
