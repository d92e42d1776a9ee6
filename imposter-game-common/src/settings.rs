use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_PLAYERS: usize = 15;
pub const DEFAULT_TIMER_SECS: u32 = 180;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSettings {
    pub imposter_count: usize,
    /// Discussion timer length in seconds. The server never runs the timer;
    /// clients drive it from this value.
    pub timer_duration: u32,
    pub selected_categories: Vec<String>,
    /// Set at game start when the round has zero imposters or only imposters.
    pub is_special_mode: bool,
    pub max_players: usize,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            imposter_count: 1,
            timer_duration: DEFAULT_TIMER_SECS,
            selected_categories: vec!["general".to_string()],
            is_special_mode: false,
            max_players: DEFAULT_MAX_PLAYERS,
        }
    }
}

impl GameSettings {
    /// How many votes each player may cast: one in a special mode, otherwise
    /// one per imposter.
    pub fn votes_per_player(&self) -> usize {
        if self.is_special_mode {
            1
        } else {
            self.imposter_count.max(1)
        }
    }

    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(imposter_count) = patch.imposter_count {
            self.imposter_count = imposter_count;
        }
        if let Some(timer_duration) = patch.timer_duration {
            self.timer_duration = timer_duration;
        }
        if let Some(selected_categories) = patch.selected_categories {
            self.selected_categories = selected_categories;
        }
        if let Some(max_players) = patch.max_players {
            self.max_players = max_players;
        }
    }
}

/// Partial settings sent by the host; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub imposter_count: Option<usize>,
    pub timer_duration: Option<u32>,
    pub selected_categories: Option<Vec<String>>,
    pub max_players: Option<usize>,
}
