use serde::{Deserialize, Serialize};

pub type PlayerId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Crewmate,
    Imposter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    #[serde(default)]
    pub has_revealed: bool,
    #[serde(default)]
    pub has_voted: bool,
    #[serde(default)]
    pub votes: Vec<PlayerId>,
    #[serde(default)]
    pub is_eliminated: bool,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: None,
            word: None,
            has_revealed: false,
            has_voted: false,
            votes: Vec::new(),
            is_eliminated: false,
        }
    }

    pub fn is_imposter(&self) -> bool {
        self.role == Some(Role::Imposter)
    }

    /// Copy with the role and word stripped, for snapshots sent to other players.
    pub(crate) fn redacted(&self) -> Player {
        Player {
            role: None,
            word: None,
            ..self.clone()
        }
    }

    pub(crate) fn clear_round_state(&mut self) {
        self.role = None;
        self.word = None;
        self.has_revealed = false;
        self.has_voted = false;
        self.votes.clear();
        self.is_eliminated = false;
    }
}
