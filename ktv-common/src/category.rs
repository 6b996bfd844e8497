//! Content category
//!
//! The single closed set of categories the channel knows about. Every
//! spelling that ever appeared in catalog folders or settings files is
//! mapped onto it once, at ingestion time; nothing downstream compares
//! category strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Category of a content item
///
/// Declaration order is significant: it is the tie-break order when two
/// categories score equally during schedule generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Cartoon,
    EducationalClip,
    Commercial,
    Movie,
}

impl Category {
    /// All categories, in declaration (tie-break) order
    pub const ALL: [Category; 4] = [
        Category::Cartoon,
        Category::EducationalClip,
        Category::Commercial,
        Category::Movie,
    ];

    /// Canonical snake_case name, as used in config and catalog files
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cartoon => "cartoon",
            Category::EducationalClip => "educational_clip",
            Category::Commercial => "commercial",
            Category::Movie => "movie",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "cartoon" | "cartoons" | "show" | "shows" | "desenho" | "desenhos" => Ok(Category::Cartoon),
            "educational_clip" | "educational" | "edu" | "educacional" => Ok(Category::EducationalClip),
            "commercial" | "commercials" | "ad" | "ads" | "comercial" | "interstitial" => {
                Ok(Category::Commercial)
            }
            "movie" | "movies" | "filme" | "filmes" => Ok(Category::Movie),
            _ => Err(Error::InvalidInput(format!("Unknown category: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_map_to_one_variant() {
        assert_eq!("cartoon".parse::<Category>().unwrap(), Category::Cartoon);
        assert_eq!("show".parse::<Category>().unwrap(), Category::Cartoon);
        assert_eq!("educational".parse::<Category>().unwrap(), Category::EducationalClip);
        assert_eq!("Educational-Clip".parse::<Category>().unwrap(), Category::EducationalClip);
        assert_eq!("ad".parse::<Category>().unwrap(), Category::Commercial);
        assert_eq!("comercial".parse::<Category>().unwrap(), Category::Commercial);
        assert_eq!("filmes".parse::<Category>().unwrap(), Category::Movie);
        assert!("podcast".parse::<Category>().is_err());
    }

    #[test]
    fn test_declaration_order() {
        let mut shuffled = vec![Category::Movie, Category::Commercial, Category::Cartoon, Category::EducationalClip];
        shuffled.sort();
        assert_eq!(shuffled, Category::ALL.to_vec());
    }

    #[test]
    fn test_serde_uses_canonical_names() {
        let json = serde_json::to_string(&Category::EducationalClip).unwrap();
        assert_eq!(json, "\"educational_clip\"");
        for category in Category::ALL {
            assert_eq!(category.to_string().parse::<Category>().unwrap(), category);
        }
    }
}
