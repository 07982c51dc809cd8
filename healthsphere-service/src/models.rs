use serde::{Deserialize, Serialize};
use session_flow::ChatTurn;

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatSessionResponse {
    pub session_id: String,
    pub history: Vec<ChatTurn>,
}
