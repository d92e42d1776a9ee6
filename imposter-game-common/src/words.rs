use rand::seq::SliceRandom;
use rand::Rng;

/// A named group of secret words the host can enable for a lobby.
#[derive(Debug, Clone)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub words: Vec<String>,
}

impl Category {
    pub fn new(id: &str, name: &str, words: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            words: words.iter().map(|w| w.to_string()).collect(),
        }
    }
}

/// Word-selection collaborator. The lobby state machine never reads this
/// directly; the dispatcher (or a local-mode embedder) draws one word and
/// hands it to `Lobby::start_game`.
#[derive(Debug, Clone)]
pub struct WordBank {
    categories: Vec<Category>,
}

impl Default for WordBank {
    fn default() -> Self {
        Self::new(vec![
            Category::new(
                "general",
                "General",
                &[
                    "Telescope", "Umbrella", "Lighthouse", "Backpack", "Campfire",
                    "Elevator", "Fountain", "Compass", "Anchor", "Lantern",
                ],
            ),
            Category::new(
                "food",
                "Food & Drink",
                &[
                    "Croissant", "Sushi", "Pancake", "Lemonade", "Meatball",
                    "Popcorn", "Burrito", "Espresso", "Waffle", "Dumpling",
                ],
            ),
            Category::new(
                "animals",
                "Animals",
                &[
                    "Penguin", "Octopus", "Hedgehog", "Flamingo", "Chameleon",
                    "Walrus", "Raccoon", "Mantis", "Otter", "Pelican",
                ],
            ),
            Category::new(
                "places",
                "Places",
                &[
                    "Airport", "Library", "Stadium", "Aquarium", "Bakery",
                    "Harbor", "Museum", "Casino", "Rooftop", "Subway",
                ],
            ),
            Category::new(
                "sports",
                "Sports",
                &[
                    "Bowling", "Archery", "Curling", "Fencing", "Surfing",
                    "Badminton", "Rowing", "Karate", "Cricket", "Snowboard",
                ],
            ),
        ])
    }
}

impl WordBank {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Draw one word uniformly from the union of the selected categories.
    /// An empty or entirely-unknown selection falls back to the whole bank;
    /// `None` means the bank itself is empty.
    pub fn random_word(&self, selected: &[String], rng: &mut impl Rng) -> Option<String> {
        let pool: Vec<&String> = self
            .categories
            .iter()
            .filter(|c| selected.iter().any(|id| *id == c.id))
            .flat_map(|c| c.words.iter())
            .collect();

        if pool.is_empty() {
            self.categories
                .iter()
                .flat_map(|c| c.words.iter())
                .collect::<Vec<_>>()
                .choose(rng)
                .copied()
                .cloned()
        } else {
            pool.choose(rng).copied().cloned()
        }
    }
}
