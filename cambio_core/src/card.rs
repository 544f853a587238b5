use serde::{Deserialize, Serialize};
use std::fmt;
// --- 核心数据结构定义 ---

/// 花色 (Suit)
/// Joker 作为一种独立的花色，这样 (suit, rank) 二元组就能唯一描述任何一张牌
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Suit {
    Hearts,   // 红心 ♥️
    Diamonds, // 方块 ♦️
    Clubs,    // 梅花 ♣️
    Spades,   // 黑桃 ♠️
    Joker,    // 鬼牌 🃏
}

/// 点数 (Rank)
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Joker,
}

/// 单张纸牌 (Card)
/// 不可变值类型，相等性由 (suit, rank) 决定
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct Card {
    pub suit: Suit,
    pub rank: Rank,
}

/// 特殊能力 (Ability)
///
/// 只有"直接弃掉刚抽到的牌"才会触发能力；换牌进手再弃出的牌不触发。
/// `SwapDecision` 不对应任何点数，它是 `LookAndSwap` 第一阶段结算后
/// 玩家进入"决定是否交换"时的挂起状态。
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Ability {
    PeekSelf,
    PeekOther,
    BlindSwap,
    LookAndSwap,
    SwapDecision,
}

/// 单副牌的张数：52 张普通牌 + 2 张鬼牌
pub const CARDS_PER_DECK: usize = 54;

impl Card {
    pub fn new(suit: Suit, rank: Rank) -> Card {
        Card { suit, rank }
    }

    /// 是否为红色牌（红心/方块）
    pub fn is_red(&self) -> bool {
        matches!(self.suit, Suit::Hearts | Suit::Diamonds)
    }

    /// Cambio 计分值
    ///
    /// - Ace = 1，数字牌 = 面值，Jack/Queen = 10
    /// - 黑 King = 10，红 King = -1（开启变体规则时为 -2）
    /// - Joker = 0
    pub fn value(&self, red_king_variant: bool) -> i32 {
        match self.rank {
            Rank::Ace => 1,
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten => 10,
            Rank::Jack | Rank::Queen => 10,
            Rank::King => {
                if self.is_red() {
                    if red_king_variant { -2 } else { -1 }
                } else {
                    10
                }
            }
            Rank::Joker => 0,
        }
    }

    /// 点数对应的特殊能力
    ///
    /// 7/8 → 看自己的牌；9/10 → 看别人的牌；J/Q → 盲换任意两张牌；
    /// 黑 King → 先看后换；红 King 没有能力（它的价值在计分上）。
    pub fn ability(&self) -> Option<Ability> {
        match self.rank {
            Rank::Seven | Rank::Eight => Some(Ability::PeekSelf),
            Rank::Nine | Rank::Ten => Some(Ability::PeekOther),
            Rank::Jack | Rank::Queen => Some(Ability::BlindSwap),
            Rank::King if !self.is_red() => Some(Ability::LookAndSwap),
            _ => None,
        }
    }
}

// --- 实现辅助功能 ---

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Suit::Hearts => "Hearts",
            Suit::Diamonds => "Diamonds",
            Suit::Clubs => "Clubs",
            Suit::Spades => "Spades",
            Suit::Joker => "Joker",
        })
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Rank::Ace => "Ace",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "Jack",
            Rank::Queen => "Queen",
            Rank::King => "King",
            Rank::Joker => "Joker",
        })
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.rank == Rank::Joker {
            write!(f, "Joker")
        } else {
            write!(f, "{} of {}", self.rank, self.suit)
        }
    }
}

// --- 牌堆生成 ---

/// 创建 `num_decks` 副完整的 54 张牌（52 张普通牌 + 每副 2 张鬼牌）
///
/// 不包含任何随机性，洗牌由调用方负责。
pub fn create_deck(num_decks: usize) -> Vec<Card> {
    let suits = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];
    let ranks = [
        Rank::Ace, Rank::Two, Rank::Three, Rank::Four, Rank::Five, Rank::Six, Rank::Seven,
        Rank::Eight, Rank::Nine, Rank::Ten, Rank::Jack, Rank::Queen, Rank::King,
    ];

    let mut deck = Vec::with_capacity(num_decks * CARDS_PER_DECK);
    for _ in 0..num_decks {
        for &suit in &suits {
            for &rank in &ranks {
                deck.push(Card { suit, rank });
            }
        }
        deck.push(Card { suit: Suit::Joker, rank: Rank::Joker });
        deck.push(Card { suit: Suit::Joker, rank: Rank::Joker });
    }
    deck
}

// --- 单元测试 ---
