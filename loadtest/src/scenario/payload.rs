//! Request payload posted every iteration

use serde::{Deserialize, Serialize};

/// Score submission for one gamer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePayload {
    pub game: String,
    #[serde(rename = "gamerID")]
    pub gamer_id: String,
    pub points: i64,
}

impl ScorePayload {
    /// The fixed submission every iteration sends
    pub fn fixed() -> Self {
        Self {
            game: "Mobile Legends".to_string(),
            gamer_id: "GYUTDTE".to_string(),
            points: 20,
        }
    }
}

impl Default for ScorePayload {
    fn default() -> Self {
        Self::fixed()
    }
}
