pub mod lobby;
pub mod mirror;
pub mod player;
pub mod protocol;
pub mod settings;
pub mod words;

pub use lobby::{GamePhase, Lobby, LobbyError, LobbyEvent, LobbySnapshot, RoundState};
pub use mirror::{EventBus, SessionMirror, SubscriptionId};
pub use player::{Player, PlayerId, Role};
pub use protocol::{ChatMessage, ClientRequest, GameResults, ServerEvent, Winner};
pub use settings::{GameSettings, SettingsPatch};
pub use words::{Category, WordBank};
