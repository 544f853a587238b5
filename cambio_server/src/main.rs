use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use futures_util::{stream::StreamExt, SinkExt};
use parking_lot::Mutex as P_Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cambio_core::{
    Audience, ClientMessage, Effect, GameError, PlayerId, Room, RoomConfig, RoomId, RoomStatus,
    ServerMessage,
};

// --- 闲置房间回收阈值 ---

const REAPER_INTERVAL: Duration = Duration::from_secs(10 * 60);
const FINISHED_TIMEOUT: Duration = Duration::from_secs(15 * 60);
const WAITING_EMPTY_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const WAITING_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
const PLAYING_ABANDONED_TIMEOUT: Duration = Duration::from_secs(60 * 60);

// 服务器全局状态：房间注册表本身无锁并发，游戏状态由每个房间自己的锁保护
struct AppState {
    rooms: DashMap<RoomId, Arc<RoomHandle>>,
}

// 单个房间的运行时句柄
// 重要‼️：严格规定使用锁的顺序，避免死锁：
// connections -> room
// 引擎调用（room 锁内）是纯同步的，绝不跨 await 持锁。
struct RoomHandle {
    room: P_Mutex<Room>,
    // 将 PlayerId 映射到该玩家 WebSocket 任务的发送通道
    connections: RwLock<HashMap<PlayerId, mpsc::Sender<ServerMessage>>>,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let state = SharedState::new(AppState {
        rooms: DashMap::new(),
    });

    // 定期清理无人使用的房间
    tokio::spawn(reap_idle_rooms(state.clone()));

    let app = Router::new()
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/{room_id}", get(get_room))
        .route("/api/rooms/{room_id}/join", post(join_room))
        .route("/api/rooms/{room_id}/start", post(start_room))
        .route("/ws/{room_id}", get(websocket_handler))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8000));
    info!("服务器正在监听 {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await.unwrap(), app)
        .await
        .unwrap();
}

// --- REST 接口 ---

#[derive(Deserialize)]
struct CreateRoomRequest {
    username: String,
    #[serde(default)]
    config: RoomConfig,
}

#[derive(Serialize)]
struct CreateRoomResponse {
    room_id: RoomId,
    player_id: PlayerId,
}

#[derive(Deserialize)]
struct JoinRoomRequest {
    username: String,
}

#[derive(Serialize)]
struct JoinRoomResponse {
    player_id: PlayerId,
}

#[derive(Serialize)]
struct RoomSummary {
    room_id: RoomId,
    status: RoomStatus,
    player_count: usize,
    max_players: usize,
    usernames: Vec<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: &impl ToString) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error: error.to_string() }))
}

fn game_error_response(err: GameError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err {
        GameError::RoomNotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::CONFLICT,
    };
    error_response(status, &err)
}

/// 创建新房间，创建者自动入座
async fn create_room(
    State(state): State<SharedState>,
    Json(req): Json<CreateRoomRequest>,
) -> impl IntoResponse {
    let (room, player_id) = Room::new(req.config, req.username);
    let room_id = room.id;

    state.rooms.insert(
        room_id,
        Arc::new(RoomHandle {
            room: P_Mutex::new(room),
            connections: RwLock::new(HashMap::new()),
        }),
    );

    info!("玩家 {} 创建了新房间 {}", player_id, room_id);
    Json(CreateRoomResponse { room_id, player_id })
}

/// 查询房间概要（大厅列表用，不含手牌信息）
async fn get_room(
    State(state): State<SharedState>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RoomSummary>, (StatusCode, Json<ErrorResponse>)> {
    let handle = state
        .rooms
        .get(&room_id)
        .map(|r| r.clone())
        .ok_or_else(|| game_error_response(GameError::RoomNotFound))?;

    let room = handle.room.lock();
    Ok(Json(RoomSummary {
        room_id,
        status: room.status,
        player_count: room.players.len(),
        max_players: room.max_players,
        usernames: room.players.iter().map(|p| p.username.clone()).collect(),
    }))
}

/// 加入已有房间，返回之后用于 WebSocket 认证的 player_id
async fn join_room(
    State(state): State<SharedState>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<JoinRoomRequest>,
) -> Result<Json<JoinRoomResponse>, (StatusCode, Json<ErrorResponse>)> {
    let handle = state
        .rooms
        .get(&room_id)
        .map(|r| r.clone())
        .ok_or_else(|| game_error_response(GameError::RoomNotFound))?;

    let (player_id, effects) = {
        let mut room = handle.room.lock();
        room.touch();
        room.join(req.username).map_err(game_error_response)?
    };

    info!("玩家 {} 加入了房间 {}", player_id, room_id);
    dispatch_effects(&handle, effects).await;
    Ok(Json(JoinRoomResponse { player_id }))
}

/// 通过 REST 开始游戏（也可以通过 WebSocket 的 StartGame 消息）
async fn start_room(
    State(state): State<SharedState>,
    Path(room_id): Path<RoomId>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let handle = state
        .rooms
        .get(&room_id)
        .map(|r| r.clone())
        .ok_or_else(|| game_error_response(GameError::RoomNotFound))?;

    let effects = {
        let mut room = handle.room.lock();
        room.touch();
        room.start_game(&mut rand::rng()).map_err(game_error_response)?
    };

    info!("房间 {} 开始游戏", room_id);
    dispatch_effects(&handle, effects).await;
    Ok(StatusCode::OK)
}

// --- WebSocket ---

/// 处理 WebSocket 连接请求
async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<RoomId>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, room_id))
}

/// 处理单个 WebSocket 连接的生命周期
///
/// 连接后的第一条消息必须是 `Join { player_id }`，把连接绑定到
/// 房间里已入座的玩家；之后进入游戏消息循环。
async fn handle_socket(socket: WebSocket, state: SharedState, room_id: RoomId) {
    let (mut sender, mut receiver) = socket.split();

    // 创建一个 MPSC 通道，用于从其他任务接收要发送的消息
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(32);

    // 启动一个新任务，专门负责将 MPSC 通道中的消息发送到 WebSocket
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = serde_json::to_string(&msg).unwrap();
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 发送失败，说明客户端已断开，退出任务
                break;
            }
        }
    });

    let handle = match state.rooms.get(&room_id) {
        Some(r) => r.clone(),
        None => {
            let _ = tx
                .send(ServerMessage::Error { message: "Room not found".to_string() })
                .await;
            return;
        }
    };

    // 等待绑定消息
    let player_id = match authenticate(&handle, &mut receiver, &tx).await {
        Some(pid) => pid,
        None => return,
    };

    // 注册连接并推送初始快照
    handle.connections.write().await.insert(player_id, tx.clone());
    let snapshot = {
        let mut room = handle.room.lock();
        if let Some(p) = room.player_mut(player_id) {
            p.connected = true;
        }
        room.handle_message(player_id, ClientMessage::GameStateRequest, &mut rand::rng())
    };
    if let Ok(effects) = snapshot {
        dispatch_effects(&handle, effects).await;
    }
    info!("玩家 {} 连接到房间 {}", player_id, room_id);

    // 主循环，处理从客户端接收到的消息
    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(client_msg) => {
                // 引擎调用在锁内同步完成，事件在锁外异步分发
                let result = {
                    let mut room = handle.room.lock();
                    room.handle_message(player_id, client_msg, &mut rand::rng())
                };
                match result {
                    Ok(effects) => dispatch_effects(&handle, effects).await,
                    Err(e) => {
                        // 被拒绝的动作只通知提交者，其他人毫无感知
                        let _ = tx.send(ServerMessage::Error { message: e.to_string() }).await;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("解析消息失败: {}", e);
                let _ = tx
                    .send(ServerMessage::Error { message: format!("Malformed message: {e}") })
                    .await;
            }
        }
    }

    // 客户端断开连接，执行清理工作
    handle_disconnect(&handle, player_id).await;
    info!("玩家 {} 与房间 {} 的连接关闭", player_id, room_id);
}

/// 读取并校验连接的第一条消息（必须是 Join）
async fn authenticate(
    handle: &RoomHandle,
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    tx: &mpsc::Sender<ServerMessage>,
) -> Option<PlayerId> {
    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => return None,
            _ => continue,
        };
        return match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Join { player_id }) => {
                if handle.room.lock().player(player_id).is_none() {
                    let _ = tx
                        .send(ServerMessage::Error {
                            message: GameError::PlayerNotFound.to_string(),
                        })
                        .await;
                    return None;
                }
                Some(player_id)
            }
            _ => {
                let _ = tx
                    .send(ServerMessage::Error {
                        message: "First message must be Join".to_string(),
                    })
                    .await;
                None
            }
        };
    }
    None
}

/// 玩家断开连接后的处理
///
/// 只标记离线、通知其他人，不把玩家从座位上移除——
/// 断线重连后用同一个 player_id 重新绑定即可继续游戏。
/// 空房间交给回收器按阈值清理。
async fn handle_disconnect(handle: &RoomHandle, player_id: PlayerId) {
    handle.connections.write().await.remove(&player_id);
    {
        let mut room = handle.room.lock();
        if let Some(p) = room.player_mut(player_id) {
            p.connected = false;
        }
        room.touch();
    }
    dispatch_effects(
        handle,
        vec![Effect::broadcast_except(player_id, ServerMessage::PlayerLeft { player_id })],
    )
    .await;
}

/// 把引擎返回的事件按受众分发出去
async fn dispatch_effects(handle: &RoomHandle, effects: Vec<Effect>) {
    let connections = handle.connections.read().await;
    for effect in effects {
        match effect.audience {
            Audience::Private(player_id) | Audience::Targeted(player_id) => {
                if let Some(conn) = connections.get(&player_id) {
                    let _ = conn.send(effect.message).await;
                }
            }
            Audience::Broadcast { exclude } => {
                for (player_id, conn) in connections.iter() {
                    if Some(*player_id) == exclude {
                        continue;
                    }
                    if conn.send(effect.message.clone()).await.is_err() {
                        // 发送失败说明该玩家也断开了，由其自己的连接任务处理
                        tracing::warn!("向玩家 {} 发送消息失败（可能已断开）", player_id);
                    }
                }
            }
        }
    }
}

// --- 闲置房间回收 ---

/// 每 10 分钟扫一遍房间注册表，按状态和闲置时长回收房间
async fn reap_idle_rooms(state: SharedState) {
    let mut interval = tokio::time::interval(REAPER_INTERVAL);
    loop {
        interval.tick().await;

        let mut stale: Vec<RoomId> = Vec::new();
        for entry in state.rooms.iter() {
            let room = entry.value().room.lock();
            let idle = room.last_activity.elapsed();
            let abandoned = room.connected_count() == 0;

            let expired = match room.status {
                RoomStatus::Finished => idle > FINISHED_TIMEOUT,
                RoomStatus::Waiting => {
                    (abandoned && idle > WAITING_EMPTY_TIMEOUT) || idle > WAITING_TIMEOUT
                }
                RoomStatus::Playing => abandoned && idle > PLAYING_ABANDONED_TIMEOUT,
            };
            if expired {
                stale.push(*entry.key());
            }
        }

        for room_id in stale {
            state.rooms.remove(&room_id);
            info!("房间 {} 闲置超时，已被回收", room_id);
        }
    }
}
