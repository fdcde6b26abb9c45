//! Passage catalog - supplies the text and author choices for a round
//!
//! Loaded once at startup from two JSON files: the passages themselves and
//! the author pool the decoy choices are drawn from. The engine consumes
//! rounds; it never mutates the catalog.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::fs;

/// Number of author choices presented per round (true author + decoys)
pub const AUTHOR_CHOICES_PER_ROUND: usize = 4;

/// One passage as stored in the passages file
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub text: String,
    pub author_name: String,
    pub author_handle: String,
}

/// One author as stored in the authors file
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogAuthor {
    pub name: String,
    pub handle: String,
}

/// Everything a match needs for one round
#[derive(Debug, Clone)]
pub struct RoundPassage {
    pub passage: String,
    pub author: String,
    pub author_handle: String,
    /// True author plus decoys, shuffled
    pub author_choices: Vec<String>,
}

/// In-memory passage catalog
pub struct PassageCatalog {
    entries: Vec<CatalogEntry>,
    authors: Vec<CatalogAuthor>,
}

impl PassageCatalog {
    /// Load the catalog from its JSON files
    pub fn load(passages_path: &str, authors_path: &str) -> Result<Self, CatalogError> {
        let passages_raw = fs::read_to_string(passages_path)
            .map_err(|e| CatalogError::Io(passages_path.to_string(), e))?;
        let authors_raw = fs::read_to_string(authors_path)
            .map_err(|e| CatalogError::Io(authors_path.to_string(), e))?;

        let entries: Vec<CatalogEntry> = serde_json::from_str(&passages_raw)?;
        let authors: Vec<CatalogAuthor> = serde_json::from_str(&authors_raw)?;

        Self::from_parts(entries, authors)
    }

    /// Build a catalog from already-parsed parts
    pub fn from_parts(
        entries: Vec<CatalogEntry>,
        authors: Vec<CatalogAuthor>,
    ) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::NoPassages);
        }

        // The decoy draw needs at least 3 authors besides any passage's own
        let mut names: Vec<&str> = authors.iter().map(|a| a.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() < AUTHOR_CHOICES_PER_ROUND {
            return Err(CatalogError::NotEnoughAuthors(names.len()));
        }

        Ok(Self { entries, authors })
    }

    /// Draw a round: random passage, its true author, and shuffled choices
    pub fn draw(&self) -> RoundPassage {
        let mut rng = rand::thread_rng();
        let entry = &self.entries[rng.gen_range(0..self.entries.len())];

        // Decoy pool: distinct names, excluding the passage's own author
        let mut pool: Vec<&str> = self
            .authors
            .iter()
            .filter(|a| a.handle != entry.author_handle && a.name != entry.author_name)
            .map(|a| a.name.as_str())
            .collect();
        pool.sort_unstable();
        pool.dedup();
        pool.shuffle(&mut rng);

        let mut choices = vec![entry.author_name.clone()];
        choices.extend(
            pool.into_iter()
                .take(AUTHOR_CHOICES_PER_ROUND - 1)
                .map(str::to_string),
        );
        choices.shuffle(&mut rng);

        RoundPassage {
            passage: entry.text.clone(),
            author: entry.author_name.clone(),
            author_handle: entry.author_handle.clone(),
            author_choices: choices,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Failed to parse catalog file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Passages file contains no passages")]
    NoPassages,

    #[error("Author pool too small for decoy draws ({0} distinct authors)")]
    NotEnoughAuthors(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_catalog() -> PassageCatalog {
        let entries = vec![CatalogEntry {
            text: "the quick brown fox".to_string(),
            author_name: "Ada".to_string(),
            author_handle: "ada".to_string(),
        }];
        let authors = vec![
            CatalogAuthor { name: "Ada".to_string(), handle: "ada".to_string() },
            CatalogAuthor { name: "Grace".to_string(), handle: "grace".to_string() },
            CatalogAuthor { name: "Edsger".to_string(), handle: "edsger".to_string() },
            CatalogAuthor { name: "Barbara".to_string(), handle: "barbara".to_string() },
            CatalogAuthor { name: "Donald".to_string(), handle: "donald".to_string() },
        ];
        PassageCatalog::from_parts(entries, authors).unwrap()
    }

    #[test]
    fn draw_contains_true_author_among_distinct_choices() {
        let catalog = test_catalog();
        for _ in 0..20 {
            let round = catalog.draw();
            assert_eq!(round.author_choices.len(), AUTHOR_CHOICES_PER_ROUND);
            assert!(round.author_choices.contains(&round.author));

            let mut sorted = round.author_choices.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), AUTHOR_CHOICES_PER_ROUND);
        }
    }

    #[test]
    fn decoys_never_reuse_the_true_author() {
        let catalog = test_catalog();
        let round = catalog.draw();
        let true_author_count = round
            .author_choices
            .iter()
            .filter(|c| **c == round.author)
            .count();
        assert_eq!(true_author_count, 1);
    }

    #[test]
    fn rejects_empty_passages() {
        let authors = vec![
            CatalogAuthor { name: "A".to_string(), handle: "a".to_string() },
            CatalogAuthor { name: "B".to_string(), handle: "b".to_string() },
            CatalogAuthor { name: "C".to_string(), handle: "c".to_string() },
            CatalogAuthor { name: "D".to_string(), handle: "d".to_string() },
        ];
        assert!(matches!(
            PassageCatalog::from_parts(vec![], authors),
            Err(CatalogError::NoPassages)
        ));
    }

    #[test]
    fn rejects_author_pool_too_small_for_decoys() {
        let entries = vec![CatalogEntry {
            text: "x".to_string(),
            author_name: "A".to_string(),
            author_handle: "a".to_string(),
        }];
        let authors = vec![
            CatalogAuthor { name: "A".to_string(), handle: "a".to_string() },
            CatalogAuthor { name: "B".to_string(), handle: "b".to_string() },
        ];
        assert!(matches!(
            PassageCatalog::from_parts(entries, authors),
            Err(CatalogError::NotEnoughAuthors(2))
        ));
    }
}
