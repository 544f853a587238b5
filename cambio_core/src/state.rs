use crate::card::{Ability, Card};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

pub type RoomId = Uuid;
pub type PlayerId = Uuid;

/// 手牌槽位 (Slot)
///
/// 被淘汰的牌不会从手牌中移除，而是把槽位变成 `Empty`（"洞"），
/// 这样后续能力/淘汰按索引引用其他牌时索引保持稳定。
/// 不变量：洞永远不是合法的能力/交换/淘汰目标。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    Occupied(Card),
    Empty,
}

impl Slot {
    pub fn card(&self) -> Option<&Card> {
        match self {
            Slot::Occupied(card) => Some(card),
            Slot::Empty => None,
        }
    }

    pub fn is_occupied(&self) -> bool {
        matches!(self, Slot::Occupied(_))
    }

    /// 取走槽位里的牌，留下一个洞
    pub fn take(&mut self) -> Option<Card> {
        match std::mem::replace(self, Slot::Empty) {
            Slot::Occupied(card) => Some(card),
            Slot::Empty => None,
        }
    }
}

/// 抽牌来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawSource {
    Deck,
    Discard,
}

/// 游戏阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    Waiting,
    Dealing,
    Viewing,
    Playing,
    Finished,
}

/// 房间状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

/// 指向某个玩家手牌中某个槽位的引用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRef {
    pub player_id: PlayerId,
    pub card_index: usize,
}

/// `LookAndSwap` 第一阶段记录下来的两个目标，等待玩家决定是否交换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapTargets {
    pub first: SlotRef,
    pub second: SlotRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub hand: Vec<Slot>,
    pub score: i32,
    pub connected: bool,
    // --- 回合内的临时字段 ---
    // 不变量：pending_drawn_card 和 pending_ability 互斥，
    // 一个玩家同一时刻至多有"待处理的抽牌"或"待使用的能力"之一。
    pub last_draw_source: Option<DrawSource>,
    pub last_drawn_card: Option<Card>,
    pub pending_drawn_card: Option<Card>,
    pub pending_ability: Option<Ability>,
    // 仅当 pending_ability == Some(SwapDecision) 时存在
    pub pending_swap_targets: Option<SwapTargets>,
}

impl Player {
    pub fn new(username: String) -> Player {
        Player {
            id: Uuid::new_v4(),
            username,
            hand: Vec::new(),
            score: 0,
            connected: false,
            last_draw_source: None,
            last_drawn_card: None,
            pending_drawn_card: None,
            pending_ability: None,
            pending_swap_targets: None,
        }
    }

    /// 仍被占用的槽位数量（不含洞）
    pub fn occupied_count(&self) -> usize {
        self.hand.iter().filter(|s| s.is_occupied()).count()
    }

    /// 索引处的牌；索引越界或是洞时返回 None
    pub fn card_at(&self, index: usize) -> Option<&Card> {
        self.hand.get(index).and_then(|s| s.card())
    }

    /// 清除所有回合内临时字段（发牌或重开时调用）
    pub fn clear_transient(&mut self) {
        self.last_draw_source = None;
        self.last_drawn_card = None;
        self.pending_drawn_card = None;
        self.pending_ability = None;
        self.pending_swap_targets = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub current_turn: Option<PlayerId>,
    // 服务端持有的完整牌堆（从末尾抽牌），不会被序列化发给客户端
    #[serde(skip)]
    pub deck: Vec<Card>,
    // 弃牌堆，最后一个元素是堆顶
    pub discard_pile: Vec<Card>,
    pub phase: GamePhase,
    pub turn_number: u32,
    pub cambio_called: bool,
    pub cambio_caller: Option<PlayerId>,
    // Cambio 被叫后的最终轮倒计时，在第一次换人时初始化为 玩家数-1
    pub final_round_turns: Option<i32>,
    // 玩家主动亮出的牌
    pub revealed_cards: HashMap<PlayerId, Vec<Card>>,
}

impl Default for GameState {
    fn default() -> GameState {
        GameState {
            current_turn: None,
            deck: Vec::new(),
            discard_pile: Vec::new(),
            phase: GamePhase::Waiting,
            turn_number: 0,
            cambio_called: false,
            cambio_caller: None,
            final_round_turns: None,
            revealed_cards: HashMap::new(),
        }
    }
}

impl GameState {
    pub fn top_discard(&self) -> Option<&Card> {
        self.discard_pile.last()
    }
}

/// 创建房间时的可选参数，缺省字段取默认值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    pub max_players: usize,
    // None 表示按人数自动决定：max_players > 5 时用 2 副牌
    pub num_decks: Option<usize>,
    pub initial_hand_size: usize,
    pub red_king_variant: bool,
}

impl Default for RoomConfig {
    fn default() -> RoomConfig {
        RoomConfig {
            max_players: 4,
            num_decks: None,
            initial_hand_size: 4,
            red_king_variant: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    // 玩家顺序即回合顺序
    pub players: Vec<Player>,
    pub game_state: GameState,
    pub status: RoomStatus,
    #[serde(skip, default = "Instant::now")]
    pub created_at: Instant,
    #[serde(skip, default = "Instant::now")]
    pub last_activity: Instant,
    pub max_players: usize,
    pub min_players: usize,
    pub num_decks: usize,
    pub initial_hand_size: usize,
    pub red_king_variant: bool,
    pub last_winner_id: Option<PlayerId>,
}

impl Room {
    /// 创建新房间并让第一位玩家入座，返回 (房间, 该玩家id)
    pub fn new(config: RoomConfig, username: String) -> (Room, PlayerId) {
        let num_decks = config
            .num_decks
            .unwrap_or(if config.max_players > 5 { 2 } else { 1 });

        let player = Player::new(username);
        let player_id = player.id;

        let room = Room {
            id: Uuid::new_v4(),
            players: vec![player],
            game_state: GameState::default(),
            status: RoomStatus::Waiting,
            created_at: Instant::now(),
            last_activity: Instant::now(),
            max_players: config.max_players,
            min_players: 2,
            num_decks,
            initial_hand_size: config.initial_hand_size,
            red_king_variant: config.red_king_variant,
            last_winner_id: None,
        };
        (room, player_id)
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn player_index(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    /// 记录活跃时间，供闲置房间回收器使用
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.connected).count()
    }

    /// 生成发给某个客户端的净化视图：
    /// 隐藏其他玩家尚未处理的抽牌（牌堆本身不参与序列化）。
    pub fn for_client(&self, viewer: PlayerId) -> Room {
        let mut view = self.clone();
        for p in view.players.iter_mut() {
            if p.id != viewer {
                p.pending_drawn_card = None;
                p.last_drawn_card = None;
            }
        }
        view
    }
}
