use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Taxonomic group a deck is built for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deck {
    #[default]
    Animals,
    Plants,
    Fungi,
}

impl Deck {
    /// Singular name used in intermediate file names (`Animal species.csv`).
    pub fn type_name(&self) -> &'static str {
        match self {
            Deck::Animals => "Animal",
            Deck::Plants => "Plant",
            Deck::Fungi => "Fungus",
        }
    }

    pub fn kingdom(&self) -> &'static str {
        match self {
            Deck::Animals => "Animals",
            Deck::Plants => "Plants",
            Deck::Fungi => "Fungi",
        }
    }

    /// `higherClassification` prefix every member of the group shares.
    pub fn taxa(&self) -> &'static str {
        match self {
            Deck::Animals => "Life|Cellular Organisms|Eukaryota|Opisthokonta|Metazoa",
            Deck::Plants => "Life|Cellular Organisms|Eukaryota|Archaeplastida|Chloroplastida",
            Deck::Fungi => "Life|Cellular Organisms|Eukaryota|Opisthokonta|Nucletmycea|Fungi",
        }
    }

    pub fn taxon_ranks(&self) -> &'static [&'static str] {
        match self {
            Deck::Animals => &["species"],
            Deck::Plants | Deck::Fungi => &["genus", "species"],
        }
    }

    pub fn default_name(&self) -> String {
        format!("The {} Deck", self.type_name())
    }
}

impl fmt::Display for Deck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Deck::Animals => "animals",
            Deck::Plants => "plants",
            Deck::Fungi => "fungi",
        })
    }
}

impl FromStr for Deck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "animals" | "animal" => Ok(Deck::Animals),
            "plants" | "plant" => Ok(Deck::Plants),
            "fungi" | "fungus" => Ok(Deck::Fungi),
            other => Err(format!(
                "unknown deck '{}', expected one of: animals, plants, fungi",
                other
            )),
        }
    }
}

/// A deck with config overrides applied.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckProfile {
    pub deck: Deck,
    pub name: String,
    pub notetype: String,
    pub taxa: String,
    pub ranks: Vec<String>,
}

impl DeckProfile {
    pub fn new(deck: Deck) -> Self {
        Self {
            deck,
            name: deck.default_name(),
            notetype: "Species".to_string(),
            taxa: deck.taxa().to_string(),
            ranks: deck.taxon_ranks().iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.deck.type_name()
    }

    /// `higherClassification` belongs to this deck: the prefix matches on a
    /// whole component, so `...|Metazoa` does not admit `...|Metazoans`.
    pub fn contains_classification(&self, classification: &str) -> bool {
        match classification.strip_prefix(self.taxa.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('|'),
            None => false,
        }
    }

    pub fn accepts_rank(&self, rank: &str) -> bool {
        self.ranks.iter().any(|r| r.eq_ignore_ascii_case(rank))
    }

    /// Position of `rank` in the deck's rank order; unknown ranks sort last.
    pub fn rank_order(&self, rank: &str) -> usize {
        self.ranks
            .iter()
            .position(|r| r.eq_ignore_ascii_case(rank))
            .unwrap_or(self.ranks.len())
    }

    pub fn has_multiple_ranks(&self) -> bool {
        self.ranks.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_parsing_and_names() {
        assert_eq!("Plants".parse::<Deck>().unwrap(), Deck::Plants);
        assert_eq!("fungus".parse::<Deck>().unwrap(), Deck::Fungi);
        assert!("bacteria".parse::<Deck>().is_err());
        assert_eq!(Deck::Fungi.type_name(), "Fungus");
        assert_eq!(Deck::Plants.kingdom(), "Plants");
        assert_eq!(Deck::Animals.default_name(), "The Animal Deck");
    }

    #[test]
    fn test_classification_prefix_matches_whole_components() {
        let profile = DeckProfile::new(Deck::Animals);
        assert!(profile.contains_classification(
            "Life|Cellular Organisms|Eukaryota|Opisthokonta|Metazoa|Bilateria"
        ));
        assert!(!profile.contains_classification(
            "Life|Cellular Organisms|Eukaryota|Opisthokonta|Metazoans"
        ));
        assert!(!profile.contains_classification(
            "Life|Cellular Organisms|Eukaryota|Archaeplastida|Chloroplastida"
        ));
    }

    #[test]
    fn test_rank_order() {
        let profile = DeckProfile::new(Deck::Plants);
        assert!(profile.accepts_rank("genus"));
        assert!(!profile.accepts_rank("family"));
        assert_eq!(profile.rank_order("genus"), 0);
        assert_eq!(profile.rank_order("species"), 1);
        assert_eq!(profile.rank_order("variety"), 2);
        assert!(profile.has_multiple_ranks());
    }
}
