use crate::card::*;
use crate::error::GameError;
use crate::message::*;
use crate::state::*;
use rand::prelude::*;

// --- 核心游戏流程 ---

impl Room {
    /// 新玩家加入房间
    ///
    /// 只有等待中的房间可以加入；座位顺序即回合顺序。
    pub fn join(&mut self, username: String) -> Result<(PlayerId, Vec<Effect>), GameError> {
        if self.status != RoomStatus::Waiting {
            return Err(GameError::GameAlreadyStarted);
        }
        if self.players.len() >= self.max_players {
            return Err(GameError::RoomFull);
        }

        let player = Player::new(username.clone());
        let player_id = player.id;
        self.players.push(player);

        let effects = vec![Effect::broadcast_except(
            player_id,
            ServerMessage::PlayerJoined { player_id, username },
        )];
        Ok((player_id, effects))
    }

    /// 开始一局游戏
    ///
    /// - 按需自动调整副数，创建并洗好牌堆。
    /// - 按座位顺序给每位玩家发 `initial_hand_size` 张牌。
    /// - 翻开第一张弃牌，允许立刻开始淘汰。
    /// - 进入看牌阶段，起始玩家为上一局赢家（若仍在房间），否则随机。
    pub fn start_game<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<Effect>, GameError> {
        if self.status != RoomStatus::Waiting {
            return Err(GameError::GameAlreadyStarted);
        }
        if self.players.len() < self.min_players {
            return Err(GameError::NotEnoughPlayers {
                min: self.min_players,
                current: self.players.len(),
            });
        }

        // 发出的牌超过半副时升到两副。这是防止手牌吃空牌堆的兜底，
        // 不是玩家直接控制的房规。
        let total_drawn = self.players.len() * self.initial_hand_size;
        let mut num_decks = self.num_decks;
        if total_drawn > 26 && num_decks == 1 {
            num_decks = 2;
        }
        if total_drawn > 48 && num_decks < 2 {
            num_decks = 2;
        }

        let mut deck = create_deck(num_decks);
        deck.shuffle(rng);
        if deck.len() < total_drawn + 1 {
            return Err(GameError::InsufficientCards);
        }

        self.num_decks = num_decks;
        self.status = RoomStatus::Playing;
        self.game_state = GameState {
            phase: GamePhase::Dealing,
            ..GameState::default()
        };

        for player in self.players.iter_mut() {
            player.clear_transient();
            player.hand = (0..self.initial_hand_size)
                .map(|_| Slot::Occupied(deck.pop().unwrap()))
                .collect();
        }

        let starter_card = deck.pop().unwrap();
        self.game_state.deck = deck;
        self.game_state.discard_pile.push(starter_card);
        self.game_state.phase = GamePhase::Viewing;

        let starter = self
            .last_winner_id
            .filter(|id| self.players.iter().any(|p| p.id == *id))
            .unwrap_or_else(|| self.players.choose(rng).map(|p| p.id).unwrap());
        self.game_state.current_turn = Some(starter);
        self.game_state.turn_number = 1;

        Ok(vec![Effect::broadcast(ServerMessage::GameStarted)])
    }

    /// 处理单个玩家的动作
    ///
    /// 这是引擎的统一入口。它接收一个已反序列化的玩家消息，
    /// 验证其合法性，同步修改房间状态，并返回待分发的事件列表。
    /// 被拒绝的动作不修改任何状态，错误只报告给提交者。
    ///
    /// 调用方必须保证：同一房间的调用被串行化；`player_id` 确实
    /// 坐在这个房间里（这里会再校验一次）。
    pub fn handle_message<R: Rng + ?Sized>(
        &mut self,
        player_id: PlayerId,
        msg: ClientMessage,
        rng: &mut R,
    ) -> Result<Vec<Effect>, GameError> {
        if self.player(player_id).is_none() {
            return Err(GameError::PlayerNotFound);
        }
        self.touch();

        match msg {
            ClientMessage::Join { .. } | ClientMessage::GameStateRequest => {
                Ok(vec![Effect::private(
                    player_id,
                    ServerMessage::GameStateSnapshot {
                        room: self.for_client(player_id),
                        your_player_id: player_id,
                    },
                )])
            }
            ClientMessage::StartGame => self.start_game(rng),
            ClientMessage::EndViewing => self.end_viewing(player_id),
            ClientMessage::DrawFromDeck => self.draw_from_deck(player_id, rng),
            ClientMessage::DrawFromDiscard => self.draw_from_discard(player_id),
            ClientMessage::ResolveDraw { resolution } => self.resolve_draw(player_id, resolution),
            ClientMessage::UseAbility { targets } => self.use_ability(player_id, targets),
            ClientMessage::ResolveSwapDecision { swap } => {
                self.resolve_swap_decision(player_id, swap)
            }
            ClientMessage::SkipAbility => self.skip_ability(player_id),
            ClientMessage::CallCambio => self.call_cambio(player_id),
            ClientMessage::PlayCard { card_index } => self.play_card(player_id, card_index, rng),
            ClientMessage::EliminateCard {
                target_player_id,
                card_index,
                replacement_card_index,
            } => self.eliminate_card(
                player_id,
                target_player_id,
                card_index,
                replacement_card_index,
                rng,
            ),
            ClientMessage::RevealCard { card_index } => self.reveal_card(player_id, card_index),
            ClientMessage::PlayAgain => self.play_again(player_id),
        }
    }

    /// 结束看牌阶段，进入正式回合
    ///
    /// 任何玩家都可以发起；已经在进行中时重复请求是无副作用的。
    pub fn end_viewing(&mut self, _player_id: PlayerId) -> Result<Vec<Effect>, GameError> {
        self.ensure_active()?;
        match self.game_state.phase {
            GamePhase::Viewing => {
                self.game_state.phase = GamePhase::Playing;
                if self.game_state.current_turn.is_none() {
                    self.game_state.current_turn = self.players.first().map(|p| p.id);
                }
                self.game_state.turn_number = 1;
                Ok(vec![Effect::broadcast(ServerMessage::RoundStarted)])
            }
            GamePhase::Playing => Ok(Vec::new()),
            _ => Err(GameError::WrongPhase),
        }
    }

    /// 从牌堆抽一张牌，进入"等待处理抽牌"状态
    pub fn draw_from_deck<R: Rng + ?Sized>(
        &mut self,
        player_id: PlayerId,
        rng: &mut R,
    ) -> Result<Vec<Effect>, GameError> {
        self.ensure_active()?;
        self.ensure_playing_phase()?;
        if self.game_state.current_turn != Some(player_id) {
            return Err(GameError::NotYourTurn);
        }
        self.ensure_no_pending(player_id)?;

        let mut effects = Vec::new();
        if self.game_state.deck.is_empty() {
            self.reshuffle_deck(rng)?;
            effects.push(Effect::broadcast(ServerMessage::DeckReshuffled));
        }

        let card = self.game_state.deck.pop().unwrap();
        let player = self.player_mut(player_id).unwrap();
        player.pending_drawn_card = Some(card);
        player.last_draw_source = Some(DrawSource::Deck);
        player.last_drawn_card = Some(card);

        effects.push(Effect::private(
            player_id,
            ServerMessage::CardDrawn { card, source: DrawSource::Deck },
        ));
        effects.push(Effect::broadcast_except(
            player_id,
            ServerMessage::PlayerDrewCard { player_id, source: DrawSource::Deck },
        ));
        Ok(effects)
    }

    /// 从弃牌堆拿走堆顶的牌（之后只能换进手牌，不能弃回去）
    pub fn draw_from_discard(&mut self, player_id: PlayerId) -> Result<Vec<Effect>, GameError> {
        self.ensure_active()?;
        self.ensure_playing_phase()?;
        if self.game_state.current_turn != Some(player_id) {
            return Err(GameError::NotYourTurn);
        }
        self.ensure_no_pending(player_id)?;
        if self.game_state.discard_pile.is_empty() {
            return Err(GameError::EmptyDiscardPile);
        }

        let card = self.game_state.discard_pile.pop().unwrap();
        let player = self.player_mut(player_id).unwrap();
        player.pending_drawn_card = Some(card);
        player.last_draw_source = Some(DrawSource::Discard);
        player.last_drawn_card = Some(card);

        Ok(vec![
            Effect::private(
                player_id,
                ServerMessage::CardDrawn { card, source: DrawSource::Discard },
            ),
            Effect::broadcast_except(
                player_id,
                ServerMessage::PlayerDrewCard { player_id, source: DrawSource::Discard },
            ),
        ])
    }

    /// 处理抽到的牌：换进手牌或直接弃掉
    ///
    /// 换牌不触发能力——能力只在"直接弃掉刚抽的牌"时触发。
    /// 从弃牌堆抽的牌弃回去会被拒绝。
    pub fn resolve_draw(
        &mut self,
        player_id: PlayerId,
        resolution: DrawResolution,
    ) -> Result<Vec<Effect>, GameError> {
        self.ensure_active()?;
        let (drawn, source) = {
            let player = self.player(player_id).ok_or(GameError::PlayerNotFound)?;
            (
                player.pending_drawn_card.ok_or(GameError::NoPendingDraw)?,
                player.last_draw_source,
            )
        };

        let mut effects = Vec::new();
        match resolution {
            DrawResolution::Swap { card_index } => {
                if self.player(player_id).unwrap().card_at(card_index).is_none() {
                    return Err(GameError::InvalidHandIndex);
                }
                let player = self.player_mut(player_id).unwrap();
                let old = player.hand[card_index].take().unwrap();
                player.hand[card_index] = Slot::Occupied(drawn);
                player.pending_drawn_card = None;
                let username = player.username.clone();
                self.game_state.discard_pile.push(old);

                effects.push(Effect::broadcast(ServerMessage::CardsSwapped {
                    message: format!(
                        "{} swapped their card #{} with the drawn card.",
                        username,
                        card_index + 1
                    ),
                    first: SlotRef { player_id, card_index },
                    second: None,
                }));
                effects.extend(self.advance_turn());
            }
            DrawResolution::Discard => {
                if source == Some(DrawSource::Discard) {
                    return Err(GameError::MustSwapDiscardDraw);
                }
                self.player_mut(player_id).unwrap().pending_drawn_card = None;
                self.game_state.discard_pile.push(drawn);

                if let Some(ability) = drawn.ability() {
                    self.player_mut(player_id).unwrap().pending_ability = Some(ability);
                    effects.push(Effect::private(
                        player_id,
                        ServerMessage::AbilityOpportunity { ability },
                    ));
                    // 回合还没结束，等待玩家使用或放弃能力
                } else {
                    effects.extend(self.advance_turn());
                }
            }
        }
        Ok(effects)
    }

    /// 使用待处理的能力
    ///
    /// 校验失败返回通用的 `InvalidAbilityUsage` 且不消耗能力
    /// （玩家可以换个目标重试）；豁免冲突单独报 `CambioImmunity`。
    pub fn use_ability(
        &mut self,
        player_id: PlayerId,
        targets: AbilityTargets,
    ) -> Result<Vec<Effect>, GameError> {
        self.ensure_active()?;
        let pending = self
            .player(player_id)
            .ok_or(GameError::PlayerNotFound)?
            .pending_ability
            .ok_or(GameError::NoPendingAbility)?;

        let mut effects = Vec::new();
        match (pending, targets) {
            (Ability::PeekSelf, AbilityTargets::PeekSelf { card_index }) => {
                let slot = SlotRef { player_id, card_index };
                let card = self.ability_slot_card(slot)?;
                effects.push(Effect::private(
                    player_id,
                    ServerMessage::AbilityResolution {
                        ability: Ability::PeekSelf,
                        reveals: vec![RevealedSlot { slot, card }],
                    },
                ));
                effects.extend(Self::looked_at_effects(player_id, slot));
            }
            (Ability::PeekOther, AbilityTargets::PeekOther { target_player_id, card_index }) => {
                let slot = SlotRef { player_id: target_player_id, card_index };
                let card = self.ability_slot_card(slot)?;
                effects.push(Effect::private(
                    player_id,
                    ServerMessage::AbilityResolution {
                        ability: Ability::PeekOther,
                        reveals: vec![RevealedSlot { slot, card }],
                    },
                ));
                effects.extend(Self::looked_at_effects(player_id, slot));
            }
            (Ability::BlindSwap, AbilityTargets::BlindSwap { source, target }) => {
                // 盲换是全局的：任意两名玩家的任意两个槽位，牌面不公开
                self.check_immunity(source, target)?;
                self.ability_slot_card(source)?;
                self.ability_slot_card(target)?;
                self.swap_cards(source, target);

                let message = format!(
                    "{} blind swapped {}'s card #{} with {}'s card #{}.",
                    self.username(player_id),
                    self.username(source.player_id),
                    source.card_index + 1,
                    self.username(target.player_id),
                    target.card_index + 1
                );
                effects.push(Effect::broadcast(ServerMessage::CardsSwapped {
                    message,
                    first: source,
                    second: Some(target),
                }));
            }
            (Ability::LookAndSwap, AbilityTargets::LookAndSwap { first, second }) => {
                // 第一阶段：只看不换。记录目标，等待玩家决定。
                self.check_immunity(first, second)?;
                let first_card = self.ability_slot_card(first)?;
                let second_card = self.ability_slot_card(second)?;

                let player = self.player_mut(player_id).unwrap();
                player.pending_swap_targets = Some(SwapTargets { first, second });
                player.pending_ability = Some(Ability::SwapDecision);

                effects.push(Effect::private(
                    player_id,
                    ServerMessage::AbilityResolution {
                        ability: Ability::LookAndSwap,
                        reveals: vec![
                            RevealedSlot { slot: first, card: first_card },
                            RevealedSlot { slot: second, card: second_card },
                        ],
                    },
                ));
                effects.extend(Self::looked_at_effects(player_id, first));
                effects.extend(Self::looked_at_effects(player_id, second));
                // 不结束回合，等待 ResolveSwapDecision
                return Ok(effects);
            }
            _ => return Err(GameError::InvalidAbilityUsage),
        }

        // 直接结算的能力：清除挂起状态并结束回合
        self.player_mut(player_id).unwrap().pending_ability = None;
        effects.extend(self.advance_turn());
        Ok(effects)
    }

    /// `LookAndSwap` 第二阶段：决定是否交换
    ///
    /// 看牌到决定之间可能发生淘汰；若任一槽位已变成洞，
    /// 交换被静默跳过。无论交换与否都结束回合。
    pub fn resolve_swap_decision(
        &mut self,
        player_id: PlayerId,
        swap: bool,
    ) -> Result<Vec<Effect>, GameError> {
        self.ensure_active()?;
        let targets = {
            let player = self.player(player_id).ok_or(GameError::PlayerNotFound)?;
            if player.pending_ability != Some(Ability::SwapDecision) {
                return Err(GameError::NoPendingSwapDecision);
            }
            player
                .pending_swap_targets
                .ok_or(GameError::NoPendingSwapDecision)?
        };

        let mut effects = Vec::new();
        if swap {
            let first_ok = self.slot_occupied(targets.first);
            let second_ok = self.slot_occupied(targets.second);
            if first_ok && second_ok {
                self.swap_cards(targets.first, targets.second);
                let message = format!(
                    "{} swapped {}'s card #{} with {}'s card #{}.",
                    self.username(player_id),
                    self.username(targets.first.player_id),
                    targets.first.card_index + 1,
                    self.username(targets.second.player_id),
                    targets.second.card_index + 1
                );
                effects.push(Effect::broadcast(ServerMessage::CardsSwapped {
                    message,
                    first: targets.first,
                    second: Some(targets.second),
                }));
            }
        } else {
            effects.push(Effect::broadcast(ServerMessage::SwapDeclined { player_id }));
        }

        let player = self.player_mut(player_id).unwrap();
        player.pending_ability = None;
        player.pending_swap_targets = None;
        effects.extend(self.advance_turn());
        Ok(effects)
    }

    /// 放弃待处理的能力并结束回合
    pub fn skip_ability(&mut self, player_id: PlayerId) -> Result<Vec<Effect>, GameError> {
        self.ensure_active()?;
        let player = self.player_mut(player_id).ok_or(GameError::PlayerNotFound)?;
        if player.pending_ability.is_none() {
            return Err(GameError::NoPendingAbility);
        }
        player.pending_ability = None;
        player.pending_swap_targets = None;
        Ok(self.advance_turn())
    }

    /// 叫 Cambio：宣布最后一轮
    ///
    /// 只能在自己回合开始、尚未抽牌时叫，且一局只能叫一次。
    /// 叫完立即结束自己的回合；倒计时在第一次换人时初始化。
    pub fn call_cambio(&mut self, player_id: PlayerId) -> Result<Vec<Effect>, GameError> {
        self.ensure_active()?;
        self.ensure_playing_phase()?;
        if self.game_state.current_turn != Some(player_id) {
            return Err(GameError::NotYourTurn);
        }
        self.ensure_no_pending(player_id)?;
        if self.game_state.cambio_called {
            return Err(GameError::CambioAlreadyCalled);
        }

        self.game_state.cambio_called = true;
        self.game_state.cambio_caller = Some(player_id);

        let mut effects = vec![Effect::broadcast(ServerMessage::CambioCalled {
            player_id,
            message: format!("{} called Cambio!", self.username(player_id)),
        })];
        effects.extend(self.advance_turn());
        Ok(effects)
    }

    /// 牺牲：打出自己手里一张与弃牌堆顶同点数的牌
    ///
    /// 任何玩家在 playing 阶段的任何时刻都可以发起（看牌阶段除外）。
    /// 指认错误只罚抽一张牌，不结束回合——自我牺牲是无限制的自由动作。
    pub fn play_card<R: Rng + ?Sized>(
        &mut self,
        player_id: PlayerId,
        card_index: usize,
        rng: &mut R,
    ) -> Result<Vec<Effect>, GameError> {
        self.ensure_active()?;
        self.ensure_playing_phase()?;
        let played = *self
            .player(player_id)
            .ok_or(GameError::PlayerNotFound)?
            .card_at(card_index)
            .ok_or(GameError::CardNotInHand)?;
        let top = *self.game_state.top_discard().ok_or(GameError::EmptyDiscardPile)?;

        let mut effects = Vec::new();
        if played.rank != top.rank {
            self.penalty_draw(player_id, rng, &mut effects)?;
            effects.push(Effect::private(
                player_id,
                ServerMessage::WrongSacrificePenalty {
                    message: "Wrong card! That doesn't match the discard. You drew a penalty card."
                        .to_string(),
                },
            ));
            effects.push(Effect::broadcast_except(
                player_id,
                ServerMessage::PlayerPenaltyDraw {
                    player_id,
                    message: format!(
                        "{} played the wrong card and drew a penalty!",
                        self.username(player_id)
                    ),
                },
            ));
            return Ok(effects);
        }

        // 命中：槽位变洞，牌进弃牌堆。牺牲不触发能力。
        self.player_mut(player_id).unwrap().hand[card_index].take();
        self.game_state.discard_pile.push(played);

        effects.push(Effect::broadcast(ServerMessage::CardPlayed { player_id, card: played }));
        effects.extend(self.check_instant_win());
        Ok(effects)
    }

    /// 淘汰：指认任何玩家（含自己）手里与弃牌堆顶同点数的牌
    ///
    /// 淘汰别人的牌时，发起者必须交出自己的一张牌补进对方的槽位
    /// （对方手牌张数不变，发起者少一张）。成功的淘汰不结束回合，
    /// 可以连续进行任意多次。
    ///
    /// 指认错误时发起者罚抽一张牌；与自我牺牲不同，如果此刻正轮到
    /// 发起者行动，错误的淘汰还会结束其回合——指认别人要担真风险。
    pub fn eliminate_card<R: Rng + ?Sized>(
        &mut self,
        player_id: PlayerId,
        target_player_id: PlayerId,
        card_index: usize,
        replacement_card_index: Option<usize>,
        rng: &mut R,
    ) -> Result<Vec<Effect>, GameError> {
        self.ensure_active()?;
        self.ensure_playing_phase()?;
        let top = *self.game_state.top_discard().ok_or(GameError::EmptyDiscardPile)?;
        let target_card = *self
            .player(target_player_id)
            .ok_or(GameError::PlayerNotFound)?
            .card_at(card_index)
            .ok_or(GameError::InvalidHandIndex)?;

        // 所有校验先于任何状态修改：淘汰别人的牌必须先选好补给对方的牌
        let replacement = if target_player_id != player_id {
            let idx = replacement_card_index.ok_or(GameError::InvalidHandIndex)?;
            self.player(player_id)
                .ok_or(GameError::PlayerNotFound)?
                .card_at(idx)
                .ok_or(GameError::InvalidHandIndex)?;
            Some(idx)
        } else {
            None
        };

        let mut effects = Vec::new();

        if target_card.rank != top.rank {
            self.penalty_draw(player_id, rng, &mut effects)?;
            let initiator = self.player_mut(player_id).unwrap();
            initiator.last_draw_source = None;
            initiator.last_drawn_card = None;

            effects.push(Effect::private(
                player_id,
                ServerMessage::WrongSacrificePenalty {
                    message:
                        "Wrong guess! That card doesn't match the discard. You drew a penalty card."
                            .to_string(),
                },
            ));
            effects.push(Effect::broadcast_except(
                player_id,
                ServerMessage::PlayerPenaltyDraw {
                    player_id,
                    message: format!("{} guessed wrong and drew a penalty!", self.username(player_id)),
                },
            ));
            if self.game_state.current_turn == Some(player_id) {
                effects.extend(self.advance_turn());
            }
            return Ok(effects);
        }

        let removed = self.player_mut(target_player_id).unwrap().hand[card_index]
            .take()
            .unwrap();
        self.game_state.discard_pile.push(removed);

        let replacement_given = if let Some(idx) = replacement {
            // 补牌填进对方的洞，发起者自己留下一个洞
            let card = self.player_mut(player_id).unwrap().hand[idx].take().unwrap();
            self.player_mut(target_player_id).unwrap().hand[card_index] = Slot::Occupied(card);
            true
        } else {
            false
        };

        let message = format!(
            "{} eliminated {}'s card{}.",
            self.username(player_id),
            self.username(target_player_id),
            if replacement_given { " and gave them a replacement card" } else { "" }
        );
        effects.push(Effect::broadcast(ServerMessage::CardEliminated {
            initiator: player_id,
            target: SlotRef { player_id: target_player_id, card_index },
            removed_card: removed,
            replacement_given,
            message,
        }));
        effects.extend(self.check_instant_win());
        Ok(effects)
    }

    /// 主动把自己的一张牌亮给所有人
    pub fn reveal_card(
        &mut self,
        player_id: PlayerId,
        card_index: usize,
    ) -> Result<Vec<Effect>, GameError> {
        self.ensure_active()?;
        let card = *self
            .player(player_id)
            .ok_or(GameError::PlayerNotFound)?
            .card_at(card_index)
            .ok_or(GameError::CardNotInHand)?;

        self.game_state.revealed_cards.entry(player_id).or_default().push(card);
        Ok(vec![Effect::broadcast(ServerMessage::CardRevealed { player_id, card })])
    }

    /// 一局结束后重开：回到等待大厅，保留成员和累计分数
    pub fn play_again(&mut self, player_id: PlayerId) -> Result<Vec<Effect>, GameError> {
        if self.status != RoomStatus::Finished {
            return Err(GameError::GameNotFinished);
        }
        let username = self
            .player(player_id)
            .ok_or(GameError::PlayerNotFound)?
            .username
            .clone();

        self.status = RoomStatus::Waiting;
        self.game_state = GameState::default();
        for p in self.players.iter_mut() {
            p.hand.clear();
            p.clear_transient();
        }

        Ok(vec![Effect::broadcast(ServerMessage::GameReset {
            message: format!("{username} requested to play again."),
        })])
    }
}

// --- 辅助逻辑函数 ---

impl Room {
    fn ensure_active(&self) -> Result<(), GameError> {
        if self.status != RoomStatus::Playing {
            return Err(GameError::GameNotActive);
        }
        Ok(())
    }

    fn ensure_playing_phase(&self) -> Result<(), GameError> {
        if self.game_state.phase != GamePhase::Playing {
            return Err(GameError::WrongPhase);
        }
        Ok(())
    }

    /// 抽牌/叫 Cambio 之前，玩家不能有未处理的抽牌或能力
    fn ensure_no_pending(&self, player_id: PlayerId) -> Result<(), GameError> {
        let player = self.player(player_id).ok_or(GameError::PlayerNotFound)?;
        if player.pending_drawn_card.is_some() || player.pending_ability.is_some() {
            return Err(GameError::PendingActionExists);
        }
        Ok(())
    }

    fn username(&self, id: PlayerId) -> String {
        self.player(id)
            .map(|p| p.username.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    fn slot_occupied(&self, slot: SlotRef) -> bool {
        self.player(slot.player_id)
            .and_then(|p| p.card_at(slot.card_index))
            .is_some()
    }

    /// 能力目标校验：玩家存在且槽位被占用，否则统一报 `InvalidAbilityUsage`
    fn ability_slot_card(&self, slot: SlotRef) -> Result<Card, GameError> {
        self.player(slot.player_id)
            .ok_or(GameError::InvalidAbilityUsage)?
            .card_at(slot.card_index)
            .copied()
            .ok_or(GameError::InvalidAbilityUsage)
    }

    /// "有人在看这张牌"的通知：被看牌的玩家收到定向消息，其余人收到广播
    fn looked_at_effects(actor: PlayerId, target: SlotRef) -> Vec<Effect> {
        let notice = ServerMessage::CardBeingLookedAt { player_id: actor, target };
        if target.player_id == actor {
            vec![Effect::broadcast(notice)]
        } else {
            vec![
                Effect::targeted(target.player_id, notice.clone()),
                Effect::broadcast_except(target.player_id, notice),
            ]
        }
    }

    /// Cambio 被叫后，叫牌者的牌不能作为任何交换的来源或目标
    fn check_immunity(&self, a: SlotRef, b: SlotRef) -> Result<(), GameError> {
        if let Some(caller) = self.game_state.cambio_caller {
            if a.player_id == caller || b.player_id == caller {
                return Err(GameError::CambioImmunity);
            }
        }
        Ok(())
    }

    /// 交换两个已校验为占用的槽位
    fn swap_cards(&mut self, a: SlotRef, b: SlotRef) {
        if a == b {
            return;
        }
        let card_a = self.player_mut(a.player_id).unwrap().hand[a.card_index].take().unwrap();
        let card_b = self.player_mut(b.player_id).unwrap().hand[b.card_index].take().unwrap();
        self.player_mut(a.player_id).unwrap().hand[a.card_index] = Slot::Occupied(card_b);
        self.player_mut(b.player_id).unwrap().hand[b.card_index] = Slot::Occupied(card_a);
    }

    /// 把弃牌堆（保留堆顶一张）洗回牌堆
    fn reshuffle_deck<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), GameError> {
        if self.game_state.discard_pile.len() <= 1 {
            return Err(GameError::DeckExhausted);
        }
        let top = self.game_state.discard_pile.pop().unwrap();
        let mut rest = std::mem::take(&mut self.game_state.discard_pile);
        self.game_state.discard_pile.push(top);
        rest.shuffle(rng);
        self.game_state.deck.append(&mut rest);
        Ok(())
    }

    /// 罚抽一张牌，追加到发起者手牌末尾（必要时先重洗牌堆）
    fn penalty_draw<R: Rng + ?Sized>(
        &mut self,
        player_id: PlayerId,
        rng: &mut R,
        effects: &mut Vec<Effect>,
    ) -> Result<(), GameError> {
        if self.game_state.deck.is_empty() {
            self.reshuffle_deck(rng)?;
            effects.push(Effect::broadcast(ServerMessage::DeckReshuffled));
        }
        let card = self.game_state.deck.pop().unwrap();
        self.player_mut(player_id).unwrap().hand.push(Slot::Occupied(card));
        Ok(())
    }

    /// 把行动权交给座位顺序上的下一位玩家
    ///
    /// Cambio 已被叫时维护最终轮倒计时：叫完后的第一次换人初始化为
    /// 玩家数-1，之后每次换人递减，归零触发结算。叫牌者自己的回合
    /// 不会被跳过。
    fn advance_turn(&mut self) -> Vec<Effect> {
        if let Some(idx) = self.game_state.current_turn.and_then(|id| self.player_index(id)) {
            let next = (idx + 1) % self.players.len();
            self.game_state.current_turn = Some(self.players[next].id);
        }
        self.game_state.turn_number += 1;

        let mut effects = vec![Effect::broadcast(ServerMessage::TurnEnded {
            current_turn: self.game_state.current_turn,
            turn_number: self.game_state.turn_number,
        })];

        if self.game_state.cambio_called {
            match self.game_state.final_round_turns {
                None => {
                    self.game_state.final_round_turns = Some(self.players.len() as i32 - 1);
                }
                Some(remaining) => {
                    let remaining = remaining - 1;
                    self.game_state.final_round_turns = Some(remaining);
                    if remaining <= 0 {
                        effects.extend(self.finish_round());
                    }
                }
            }
        }
        effects
    }

    /// 任何让手牌变少的动作之后检查：有人清空手牌即瞬间获胜
    fn check_instant_win(&mut self) -> Vec<Effect> {
        let winner = self.players.iter().find(|p| p.occupied_count() == 0).map(|p| p.id);
        match winner {
            Some(id) => self.end_game(id),
            None => Vec::new(),
        }
    }

    /// Cambio 最终轮结束：重算分数并决出赢家
    ///
    /// 最低分获胜；平分时占用槽位少者胜；仍平时叫 Cambio 的一方判负。
    fn finish_round(&mut self) -> Vec<Effect> {
        let variant = self.red_king_variant;
        for p in self.players.iter_mut() {
            p.score = p.hand.iter().filter_map(|s| s.card()).map(|c| c.value(variant)).sum();
        }

        let caller = self.game_state.cambio_caller;
        let winner = self
            .players
            .iter()
            .min_by_key(|p| (p.score, p.occupied_count(), u8::from(caller == Some(p.id))))
            .map(|p| p.id);
        match winner {
            Some(id) => self.end_game(id),
            None => Vec::new(),
        }
    }

    /// 结束一局并记录赢家（下一局由其先手）
    fn end_game(&mut self, winner_id: PlayerId) -> Vec<Effect> {
        self.status = RoomStatus::Finished;
        self.game_state.phase = GamePhase::Finished;
        self.last_winner_id = Some(winner_id);
        vec![Effect::broadcast(ServerMessage::GameEnded {
            winner_id,
            winner_username: self.username(winner_id),
        })]
    }
}

// --- 单元测试 ---
